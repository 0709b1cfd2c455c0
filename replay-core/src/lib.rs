#![warn(missing_docs)]
//! Experience replay for off-policy reinforcement learning.
//!
//! [`ReplayBuffer`] is a bounded FIFO store of transitions
//! `(o_t, a_t, r_t, o_t+1, is_done_t)` with uniform random sampling of
//! minibatches. [`proxy`] hosts a buffer shared between producer threads and
//! a learner.
pub mod error;
pub mod proxy;
pub mod replay_buffer;

mod base;
pub use base::{ExperienceBufferBase, ReplayBufferBase};
pub use replay_buffer::{
    ReplayBuffer, ReplayBufferConfig, Transition, TransitionBatch, VecBatch,
};

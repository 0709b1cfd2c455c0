//! A fixed-capacity circular replay buffer.
mod base;
mod batch;
mod config;
mod transition;
pub use base::ReplayBuffer;
pub use batch::{TransitionBatch, VecBatch};
pub use config::ReplayBufferConfig;
pub use transition::Transition;

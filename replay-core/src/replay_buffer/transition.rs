//! A single transition `(o_t, a_t, r_t, o_t+1, is_done_t)`.
use crate::error::ReplayBufferError;

/// One environment step as stored in a replay buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Observation `o_t`.
    pub obs: Vec<f32>,

    /// Action `a_t`.
    pub act: Vec<f32>,

    /// Reward `r_t`.
    pub reward: f32,

    /// Next observation `o_t+1`.
    pub next_obs: Vec<f32>,

    /// Whether the episode ended at this step.
    pub is_done: bool,
}

impl Transition {
    /// Creates a transition.
    pub fn new(
        obs: Vec<f32>,
        act: Vec<f32>,
        reward: f32,
        next_obs: Vec<f32>,
        is_done: bool,
    ) -> Self {
        Self {
            obs,
            act,
            reward,
            next_obs,
            is_done,
        }
    }

    /// Checks the widths of the vectors in this transition.
    ///
    /// Fields are checked in the order `obs`, `next_obs`, `act` and the first
    /// mismatch is reported.
    pub fn check_dims(&self, obs_dim: usize, act_dim: usize) -> Result<(), ReplayBufferError> {
        check_dims(&self.obs, &self.act, &self.next_obs, obs_dim, act_dim)
    }
}

pub(crate) fn check_dims(
    obs: &[f32],
    act: &[f32],
    next_obs: &[f32],
    obs_dim: usize,
    act_dim: usize,
) -> Result<(), ReplayBufferError> {
    let fields = [
        ("obs", obs.len(), obs_dim),
        ("next_obs", next_obs.len(), obs_dim),
        ("act", act.len(), act_dim),
    ];
    for &(field, actual, expected) in fields.iter() {
        if actual != expected {
            return Err(ReplayBufferError::DimensionMismatch {
                field,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

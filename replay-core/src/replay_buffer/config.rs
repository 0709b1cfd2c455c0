//! Configuration of [`ReplayBuffer`](super::ReplayBuffer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ReplayBuffer`](super::ReplayBuffer).
///
/// ```rust
/// use replay_core::ReplayBufferConfig;
///
/// let config = ReplayBufferConfig::default()
///     .capacity(100_000)
///     .obs_dim(3)
///     .act_dim(1)
///     .seed(7);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayBufferConfig {
    /// Maximum number of transitions retained.
    /// When the buffer is full, new transitions replace the oldest ones.
    pub capacity: usize,

    /// Width of observation vectors.
    pub obs_dim: usize,

    /// Width of action vectors.
    pub act_dim: usize,

    /// Seed of the generator used for sampling.
    pub seed: u64,
}

impl Default for ReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            obs_dim: 1,
            act_dim: 1,
            seed: 42,
        }
    }
}

impl ReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the width of observation vectors.
    pub fn obs_dim(mut self, obs_dim: usize) -> Self {
        self.obs_dim = obs_dim;
        self
    }

    /// Sets the width of action vectors.
    pub fn act_dim(mut self, act_dim: usize) -> Self {
        self.act_dim = act_dim;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

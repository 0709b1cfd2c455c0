//! Fixed-capacity circular replay buffer.
use super::{
    transition::check_dims, ReplayBufferConfig, Transition, TransitionBatch, VecBatch,
};
use crate::{error::ReplayBufferError, ExperienceBufferBase, ReplayBufferBase};
use anyhow::Result;
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A FIFO experience replay buffer of fixed capacity.
///
/// Transitions are written into five preallocated parallel arrays at a
/// cursor that wraps around at `capacity`. Once the buffer is full, every
/// insertion silently overwrites the oldest transition. Batches are drawn
/// uniformly at random with replacement from the valid rows.
///
/// The buffer holds no lock. When producers and learners run on different
/// threads, guard it with a single mutex as done by
/// [`spawn_replay_buffer_thread`](crate::proxy::spawn_replay_buffer_thread).
///
/// ```rust
/// use replay_core::ReplayBuffer;
///
/// let mut buffer = ReplayBuffer::new(2, 1, 1000).unwrap();
/// buffer.store(&[0.0, 1.0], &[0.5], 1.0, &[1.0, 1.0], false).unwrap();
/// let batch = buffer.sample_batch(32).unwrap();
/// assert_eq!(batch.len(), 32);
/// ```
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    /// Maximum number of transitions that can be stored.
    capacity: usize,

    obs_dim: usize,

    act_dim: usize,

    /// Row where the next transition is written.
    i: usize,

    /// Number of valid rows.
    size: usize,

    obs: VecBatch,
    act: VecBatch,
    next_obs: VecBatch,
    reward: Vec<f32>,
    is_done: Vec<i8>,

    /// Random number generator for sampling.
    rng: StdRng,
}

impl ReplayBuffer {
    /// Creates an empty buffer, seeding its sampler from OS entropy.
    ///
    /// Fails with [`ReplayBufferError::InvalidArgument`] if any argument is zero.
    pub fn new(obs_dim: usize, act_dim: usize, capacity: usize) -> Result<Self, ReplayBufferError> {
        Self::with_rng(obs_dim, act_dim, capacity, StdRng::from_entropy())
    }

    /// Creates an empty buffer from a configuration, seeding its sampler with
    /// `config.seed`.
    pub fn from_config(config: &ReplayBufferConfig) -> Result<Self, ReplayBufferError> {
        Self::with_rng(
            config.obs_dim,
            config.act_dim,
            config.capacity,
            StdRng::seed_from_u64(config.seed),
        )
    }

    fn with_rng(
        obs_dim: usize,
        act_dim: usize,
        capacity: usize,
        rng: StdRng,
    ) -> Result<Self, ReplayBufferError> {
        if obs_dim == 0 {
            return Err(ReplayBufferError::InvalidArgument(
                "obs_dim must be positive".to_string(),
            ));
        }
        if act_dim == 0 {
            return Err(ReplayBufferError::InvalidArgument(
                "act_dim must be positive".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(ReplayBufferError::InvalidArgument(
                "capacity must be positive".to_string(),
            ));
        }

        info!(
            "Build replay buffer: capacity={}, obs_dim={}, act_dim={}",
            capacity, obs_dim, act_dim
        );

        Ok(Self {
            capacity,
            obs_dim,
            act_dim,
            i: 0,
            size: 0,
            obs: VecBatch::zeros(capacity, obs_dim),
            act: VecBatch::zeros(capacity, act_dim),
            next_obs: VecBatch::zeros(capacity, obs_dim),
            reward: vec![0.; capacity],
            is_done: vec![0; capacity],
            rng,
        })
    }

    /// Stores a transition at the cursor, overwriting the oldest one when full.
    ///
    /// All widths are checked before anything is written, so a
    /// [`ReplayBufferError::DimensionMismatch`] leaves the buffer untouched.
    pub fn store(
        &mut self,
        obs: &[f32],
        act: &[f32],
        reward: f32,
        next_obs: &[f32],
        is_done: bool,
    ) -> Result<(), ReplayBufferError> {
        check_dims(obs, act, next_obs, self.obs_dim, self.act_dim)?;

        self.obs.push(self.i, obs);
        self.act.push(self.i, act);
        self.next_obs.push(self.i, next_obs);
        self.reward[self.i] = reward;
        self.is_done[self.i] = is_done as i8;

        self.i = (self.i + 1) % self.capacity;
        if self.size < self.capacity {
            self.size += 1;
            if self.size == self.capacity {
                debug!(
                    "Replay buffer reached its capacity {}, overwriting from now on",
                    self.capacity
                );
            }
        }

        Ok(())
    }

    /// Samples `batch_size` transitions uniformly with replacement using the
    /// buffer's own generator.
    ///
    /// Fails with [`ReplayBufferError::EmptyBuffer`] if nothing has been
    /// stored, whatever `batch_size` is. A `batch_size` of zero on a non-empty
    /// buffer yields an empty batch. Stored data, cursor and size are left
    /// unchanged.
    pub fn sample_batch(&mut self, batch_size: usize) -> Result<TransitionBatch, ReplayBufferError> {
        let ixs = sample_ixs(self.size, batch_size, &mut self.rng)?;
        Ok(self.gather(ixs))
    }

    /// Same as [`ReplayBuffer::sample_batch`], drawing indices from `rng`.
    pub fn sample_batch_with<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<TransitionBatch, ReplayBufferError> {
        let ixs = sample_ixs(self.size, batch_size, rng)?;
        Ok(self.gather(ixs))
    }

    fn gather(&self, ixs: Vec<usize>) -> TransitionBatch {
        TransitionBatch {
            obs: self.obs.sample(&ixs),
            act: self.act.sample(&ixs),
            next_obs: self.next_obs.sample(&ixs),
            reward: ixs.iter().map(|&ix| self.reward[ix]).collect(),
            is_done: ixs.iter().map(|&ix| self.is_done[ix]).collect(),
            ix_sample: ixs,
        }
    }

    /// Returns the transition in row `ix`, or `None` if the row is not valid.
    pub fn get(&self, ix: usize) -> Option<Transition> {
        if ix >= self.size {
            return None;
        }
        Some(Transition {
            obs: self.obs.row(ix).to_vec(),
            act: self.act.row(ix).to_vec(),
            reward: self.reward[ix],
            next_obs: self.next_obs.row(ix).to_vec(),
            is_done: self.is_done[ix] == 1,
        })
    }

    /// Iterates over the stored transitions in insertion order, oldest first.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = Transition> + '_ {
        let start = (self.i + self.capacity - self.size) % self.capacity;
        (0..self.size).filter_map(move |k| self.get((start + k) % self.capacity))
    }

    /// Returns all valid action rows.
    ///
    /// This copies the whole action array, so use it with care on large buffers.
    pub fn whole_actions(&self) -> VecBatch {
        let ixs = (0..self.size).collect::<Vec<_>>();
        self.act.sample(&ixs)
    }

    /// Returns the number of stored transitions that ended an episode.
    pub fn num_done_flags(&self) -> usize {
        self.is_done[..self.size]
            .iter()
            .map(|&is_done| is_done as usize)
            .sum()
    }

    /// Returns the sum of the stored rewards.
    pub fn sum_rewards(&self) -> f32 {
        self.reward[..self.size].iter().sum()
    }

    /// Number of valid transitions.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns `true` once the buffer overwrites old transitions.
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// Maximum number of transitions retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Width of observation vectors.
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Width of action vectors.
    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    /// Row where the next transition will be written.
    pub fn cursor(&self) -> usize {
        self.i
    }
}

/// Draws `batch_size` indices from `0..size`, independently and with replacement.
fn sample_ixs<R: Rng + ?Sized>(
    size: usize,
    batch_size: usize,
    rng: &mut R,
) -> Result<Vec<usize>, ReplayBufferError> {
    if size == 0 {
        return Err(ReplayBufferError::EmptyBuffer);
    }
    Ok((0..batch_size).map(|_| rng.gen_range(0..size)).collect())
}

impl ExperienceBufferBase for ReplayBuffer {
    type Item = Transition;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.store(&tr.obs, &tr.act, tr.reward, &tr.next_obs, tr.is_done)?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.size
    }
}

impl ReplayBufferBase for ReplayBuffer {
    type Config = ReplayBufferConfig;
    type Batch = TransitionBatch;

    fn build(config: &Self::Config) -> Result<Self> {
        Ok(Self::from_config(config)?)
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        Ok(self.sample_batch(size)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn tr(x: f32, is_done: bool) -> Transition {
        Transition::new(vec![x], vec![10.0 * x], x, vec![x + 1.0], is_done)
    }

    fn buffer(capacity: usize) -> ReplayBuffer {
        let config = ReplayBufferConfig::default()
            .capacity(capacity)
            .obs_dim(1)
            .act_dim(1);
        ReplayBuffer::from_config(&config).unwrap()
    }

    /// Raw storage, including rows that are not yet valid.
    fn snapshot(b: &ReplayBuffer) -> (usize, usize, Vec<f32>, Vec<f32>, Vec<f32>, Vec<f32>, Vec<i8>) {
        (
            b.size,
            b.i,
            b.obs.as_slice().to_vec(),
            b.act.as_slice().to_vec(),
            b.next_obs.as_slice().to_vec(),
            b.reward.clone(),
            b.is_done.clone(),
        )
    }

    #[test]
    fn test_new_rejects_zero_arguments() {
        for &(o, a, c) in [(0, 1, 1), (1, 0, 1), (1, 1, 0)].iter() {
            match ReplayBuffer::new(o, a, c) {
                Err(ReplayBufferError::InvalidArgument(_)) => {}
                other => panic!("unexpected result: {:?}", other),
            }
        }
        assert!(ReplayBuffer::build(&ReplayBufferConfig::default().capacity(0)).is_err());
    }

    #[test]
    fn test_new_is_empty() {
        let b = ReplayBuffer::new(4, 2, 8).unwrap();
        assert_eq!(b.len(), 0);
        assert_eq!(b.cursor(), 0);
        assert_eq!(b.capacity(), 8);
        assert_eq!(b.obs_dim(), 4);
        assert_eq!(b.act_dim(), 2);
        assert!(b.is_empty());
        assert!(!b.is_full());
        assert!(b.get(0).is_none());
    }

    #[test]
    fn test_wraparound_scenario() {
        let mut b = ReplayBuffer::new(1, 1, 3).unwrap();
        b.store(&[1.0], &[10.0], 1.0, &[2.0], false).unwrap();
        b.store(&[2.0], &[20.0], 2.0, &[3.0], false).unwrap();
        b.store(&[3.0], &[30.0], 3.0, &[4.0], true).unwrap();
        b.store(&[4.0], &[40.0], 4.0, &[5.0], false).unwrap();

        assert_eq!(b.len(), 3);
        assert_eq!(b.cursor(), 1);
        assert_eq!(b.get(0), Some(tr(4.0, false)));
        assert_eq!(b.get(1), Some(tr(2.0, false)));
        assert_eq!(b.get(2), Some(tr(3.0, true)));

        let oldest_first = b.iter_oldest_first().collect::<Vec<_>>();
        assert_eq!(oldest_first, vec![tr(2.0, false), tr(3.0, true), tr(4.0, false)]);
    }

    #[test]
    fn test_fifo_eviction() {
        let capacity = 5;
        let mut b = buffer(capacity);
        for n in 1..=12 {
            b.push(tr(n as f32, false)).unwrap();
            assert_eq!(b.len(), n.min(capacity));
            assert_eq!(b.cursor(), n % capacity);

            let expected = ((n.saturating_sub(capacity) + 1)..=n)
                .map(|x| tr(x as f32, false))
                .collect::<Vec<_>>();
            assert_eq!(b.iter_oldest_first().collect::<Vec<_>>(), expected);
        }
        assert!(b.is_full());
    }

    #[test]
    fn test_store_keeps_values_exactly() {
        let mut b = ReplayBuffer::new(3, 2, 4).unwrap();
        let expected = Transition::new(
            vec![0.1, -2.5e-7, 3.4e38],
            vec![f32::MIN_POSITIVE, -1.0],
            -0.333,
            vec![1.0, 2.0, 3.0],
            true,
        );
        b.push(expected.clone()).unwrap();
        assert_eq!(b.get(0), Some(expected.clone()));

        let batch = b.sample_batch(3).unwrap();
        for k in 0..3 {
            assert_eq!(batch.transition(k), Some(expected.clone()));
        }
    }

    #[test]
    fn test_dimension_mismatch_leaves_buffer_untouched() {
        let mut b = ReplayBuffer::new(2, 1, 3).unwrap();
        b.store(&[1.0, 1.0], &[1.0], 1.0, &[2.0, 2.0], false).unwrap();
        let before = snapshot(&b);

        let err = b.store(&[1.0], &[1.0], 1.0, &[2.0, 2.0], false).unwrap_err();
        assert_eq!(
            err,
            ReplayBufferError::DimensionMismatch { field: "obs", expected: 2, actual: 1 }
        );
        let err = b.store(&[1.0, 1.0], &[1.0], 1.0, &[2.0, 2.0, 2.0], false).unwrap_err();
        assert_eq!(
            err,
            ReplayBufferError::DimensionMismatch { field: "next_obs", expected: 2, actual: 3 }
        );
        let err = b.store(&[1.0, 1.0], &[], 1.0, &[2.0, 2.0], false).unwrap_err();
        assert_eq!(
            err,
            ReplayBufferError::DimensionMismatch { field: "act", expected: 1, actual: 0 }
        );
        assert!(b.push(tr(1.0, false)).is_err());

        assert_eq!(snapshot(&b), before);
    }

    #[test]
    fn test_sample_empty_buffer_fails() {
        let mut b = buffer(4);
        for &k in [0, 1, 32].iter() {
            assert_eq!(b.sample_batch(k).unwrap_err(), ReplayBufferError::EmptyBuffer);
        }
        assert!(b.batch(1).is_err());
    }

    #[test]
    fn test_sample_zero_batch_size() {
        let mut b = buffer(4);
        b.push(tr(1.0, false)).unwrap();
        let batch = b.sample_batch(0).unwrap();
        assert!(batch.is_empty());
        assert!(batch.obs.is_empty());
        assert!(batch.act.is_empty());
        assert!(batch.next_obs.is_empty());
        assert!(batch.is_done.is_empty());
        assert!(batch.ix_sample.is_empty());
    }

    #[test]
    fn test_sample_rows_are_aligned() {
        let mut b = buffer(16);
        for n in 0..10 {
            b.push(tr(n as f32, n % 3 == 0)).unwrap();
        }
        let before = snapshot(&b);

        let batch = b.sample_batch(64).unwrap();
        assert_eq!(batch.len(), 64);
        assert_eq!(batch.obs.len(), 64);
        assert_eq!(batch.act.len(), 64);
        assert_eq!(batch.next_obs.len(), 64);
        assert_eq!(batch.is_done.len(), 64);
        assert_eq!(batch.ix_sample.len(), 64);

        for k in 0..batch.len() {
            let ix = batch.ix_sample[k];
            assert!(ix < 10);
            assert_eq!(batch.transition(k), b.get(ix));
        }

        // Sampling does not touch the stored data.
        assert_eq!(snapshot(&b), before);
    }

    #[test]
    fn test_sample_only_valid_rows() {
        let mut b = buffer(100);
        b.push(tr(7.0, false)).unwrap();
        b.push(tr(8.0, false)).unwrap();
        let batch = b.sample_batch(200).unwrap();
        assert!(batch.ix_sample.iter().all(|&ix| ix < 2));
    }

    #[test]
    fn test_sample_uniformity() {
        let m = 10;
        let n_draws = 20_000;
        let mut b = buffer(m);
        for n in 0..m {
            b.push(tr(n as f32, false)).unwrap();
        }

        let mut counts = vec![0usize; m];
        for _ in 0..n_draws {
            let batch = b.sample_batch(1).unwrap();
            counts[batch.ix_sample[0]] += 1;
        }

        let expected = n_draws / m;
        for &c in counts.iter() {
            assert!(
                (c as f64 - expected as f64).abs() < 0.1 * expected as f64,
                "counts = {:?}",
                counts
            );
        }
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let config = ReplayBufferConfig::default().capacity(32).seed(7);
        let mut b1 = ReplayBuffer::build(&config).unwrap();
        let mut b2 = ReplayBuffer::build(&config).unwrap();
        for n in 0..20 {
            b1.push(tr(n as f32, false)).unwrap();
            b2.push(tr(n as f32, false)).unwrap();
        }
        for _ in 0..5 {
            let x1 = b1.batch(16).unwrap();
            let x2 = b2.batch(16).unwrap();
            assert_eq!(x1.ix_sample, x2.ix_sample);
        }
    }

    #[test]
    fn test_repeated_calls_draw_again() {
        let mut b = buffer(1000);
        for n in 0..1000 {
            b.push(tr(n as f32, false)).unwrap();
        }
        let x1 = b.sample_batch(32).unwrap();
        let x2 = b.sample_batch(32).unwrap();
        assert_ne!(x1.ix_sample, x2.ix_sample);
    }

    #[test]
    fn test_sample_batch_with_external_rng() {
        let mut b = buffer(8);
        for n in 0..8 {
            b.push(tr(n as f32, false)).unwrap();
        }
        let mut rng1 = StdRng::seed_from_u64(3);
        let mut rng2 = StdRng::seed_from_u64(3);
        let x1 = b.sample_batch_with(10, &mut rng1).unwrap();
        let x2 = b.sample_batch_with(10, &mut rng2).unwrap();
        assert_eq!(x1, x2);
    }

    #[test]
    fn test_aggregates_cover_valid_rows() {
        let mut b = buffer(4);
        b.push(tr(1.0, true)).unwrap();
        b.push(tr(2.0, false)).unwrap();
        b.push(tr(3.0, true)).unwrap();
        assert_eq!(b.num_done_flags(), 2);
        assert_eq!(b.sum_rewards(), 6.0);
        assert_eq!(b.whole_actions().as_slice(), &[10.0, 20.0, 30.0]);

        b.push(tr(4.0, false)).unwrap();
        b.push(tr(5.0, false)).unwrap();
        assert_eq!(b.num_done_flags(), 1);
        assert_eq!(b.sum_rewards(), 14.0);
    }
}

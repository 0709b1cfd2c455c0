//! Row-major batches of vectors and the sampled transition batch.
use super::Transition;

/// A batch of fixed-width `f32` vectors stored row-major in one allocation.
///
/// The same type backs the storage arrays of
/// [`ReplayBuffer`](super::ReplayBuffer) and the sampled observations and
/// actions of a [`TransitionBatch`].
#[derive(Clone, Debug, PartialEq)]
pub struct VecBatch {
    dim: usize,
    data: Vec<f32>,
}

impl VecBatch {
    /// Creates a batch of `n_rows` zero vectors of width `dim`.
    pub fn zeros(n_rows: usize, dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; n_rows * dim],
        }
    }

    /// Creates an empty batch able to hold `capacity` rows without reallocating.
    pub fn with_capacity(capacity: usize, dim: usize) -> Self {
        Self {
            dim,
            data: Vec::with_capacity(capacity * dim),
        }
    }

    /// Overwrites row `ix` with `row`.
    ///
    /// Panics if `ix` is out of range or `row.len() != self.dim()`.
    pub fn push(&mut self, ix: usize, row: &[f32]) {
        let start = ix * self.dim;
        self.data[start..start + self.dim].copy_from_slice(row);
    }

    /// Gathers the rows at `ixs`, in the given order.
    pub fn sample(&self, ixs: &[usize]) -> Self {
        let mut batch = Self::with_capacity(ixs.len(), self.dim);
        for &ix in ixs {
            batch.data.extend_from_slice(self.row(ix));
        }
        batch
    }

    /// Returns row `ix`.
    pub fn row(&self, ix: usize) -> &[f32] {
        let start = ix * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Width of each row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Returns `true` if the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The underlying row-major data.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Iterates over rows.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dim)
    }
}

impl From<VecBatch> for Vec<f32> {
    fn from(batch: VecBatch) -> Self {
        batch.data
    }
}

/// A batch of transitions sampled from a replay buffer.
///
/// Row `k` of every field comes from the same stored transition, namely the
/// one in row `ix_sample[k]` of the buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionBatch {
    /// Observations.
    pub obs: VecBatch,

    /// Actions.
    pub act: VecBatch,

    /// Next observations.
    pub next_obs: VecBatch,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Done flags, 0 or 1.
    pub is_done: Vec<i8>,

    /// Buffer rows the samples were drawn from, in draw order.
    pub ix_sample: Vec<usize>,
}

impl TransitionBatch {
    /// Decomposes the batch into `(o_t, a_t, o_t+1, r_t, is_done_t, ix_sample)`.
    pub fn unpack(self) -> (VecBatch, VecBatch, VecBatch, Vec<f32>, Vec<i8>, Vec<usize>) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_done,
            self.ix_sample,
        )
    }

    /// Returns the number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch holds no transition.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Returns row `k` as an owned transition.
    pub fn transition(&self, k: usize) -> Option<Transition> {
        if k >= self.len() {
            return None;
        }
        Some(Transition {
            obs: self.obs.row(k).to_vec(),
            act: self.act.row(k).to_vec(),
            reward: self.reward[k],
            next_obs: self.next_obs.row(k).to_vec(),
            is_done: self.is_done[k] == 1,
        })
    }
}

//! Sharing a replay buffer between producer threads and a learner.
//!
//! [`ReplayBuffer`] has no lock of its own. Producers push transitions into a
//! [`ReplayBufferProxy`], which forwards them in chunks over a channel to the
//! thread started by [`spawn_replay_buffer_thread`]. That thread and the
//! learner access the buffer through the same `Arc<Mutex<ReplayBuffer>>`.
use crate::{
    error::ReplayBufferError, ExperienceBufferBase, ReplayBuffer, ReplayBufferConfig, Transition,
    TransitionBatch,
};
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
    sync::{Arc, Mutex},
    thread::JoinHandle,
};

/// Transitions sent from a [`ReplayBufferProxy`] to the replay buffer thread.
#[derive(Clone, Debug)]
pub struct PushedItemMessage {
    /// ID of the sending proxy.
    pub id: usize,

    /// Transitions in the order they were pushed.
    pub pushed_items: Vec<Transition>,
}

/// Configuration of [`ReplayBufferProxy`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReplayBufferProxyConfig {
    /// Number of transitions buffered until sent to the replay buffer thread.
    pub n_buffer: usize,
}

impl Default for ReplayBufferProxyConfig {
    fn default() -> Self {
        Self { n_buffer: 100 }
    }
}

impl ReplayBufferProxyConfig {
    /// Sets the number of transitions buffered before sending.
    pub fn n_buffer(mut self, n_buffer: usize) -> Self {
        self.n_buffer = n_buffer;
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

/// Producer-side handle of a replay buffer living in another thread.
///
/// Widths are checked on [`push`](ExperienceBufferBase::push), so a bad
/// transition is rejected at the producer instead of in the buffer thread.
/// Call [`flush`](ReplayBufferProxy::flush) before dropping the proxy;
/// transitions still queued at drop time are discarded.
pub struct ReplayBufferProxy {
    id: usize,

    /// Sender of [`PushedItemMessage`].
    sender: Sender<PushedItemMessage>,

    /// Number of transitions buffered until sent.
    n_buffer: usize,

    obs_dim: usize,

    act_dim: usize,

    /// Queued transitions.
    buffer: Vec<Transition>,
}

impl ReplayBufferProxy {
    /// Creates a proxy for a buffer built from `buffer_config`.
    pub fn build_with_sender(
        id: usize,
        config: &ReplayBufferProxyConfig,
        buffer_config: &ReplayBufferConfig,
        sender: Sender<PushedItemMessage>,
    ) -> Self {
        let n_buffer = config.n_buffer;
        Self {
            id,
            sender,
            n_buffer,
            obs_dim: buffer_config.obs_dim,
            act_dim: buffer_config.act_dim,
            buffer: Vec::with_capacity(n_buffer),
        }
    }

    /// ID of this proxy.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Sends all queued transitions.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut pushed_items = Vec::with_capacity(self.n_buffer);
        std::mem::swap(&mut self.buffer, &mut pushed_items);
        debug!(
            "Proxy {} sends {} transitions",
            self.id,
            pushed_items.len()
        );

        let msg = PushedItemMessage {
            id: self.id,
            pushed_items,
        };
        match self.sender.send(msg) {
            Ok(()) => Ok(()),
            Err(_e) => Err(ReplayBufferError::SendMsgForPush.into()),
        }
    }
}

impl ExperienceBufferBase for ReplayBufferProxy {
    type Item = Transition;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        tr.check_dims(self.obs_dim, self.act_dim)?;
        self.buffer.push(tr);
        if self.buffer.len() >= self.n_buffer {
            self.flush()?;
        }
        Ok(())
    }

    /// Number of transitions queued and not yet sent.
    fn len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Spawns the thread that stores transitions received from proxies.
///
/// ```mermaid
/// graph LR
///     P1[ReplayBufferProxy] -->|PushedItemMessage| T[replay buffer thread]
///     P2[ReplayBufferProxy] -->|PushedItemMessage| T
///     T -->|store| B["Arc&lt;Mutex&lt;ReplayBuffer&gt;&gt;"]
///     L[learner] -->|sample_batch_locked| B
/// ```
///
/// Every message is stored under a single acquisition of the lock. The thread
/// returns the number of stored transitions once every sender has been
/// dropped. It stops early with the error of the first failed store, or with
/// [`ReplayBufferError::LockPoisoned`].
pub fn spawn_replay_buffer_thread(
    buffer: Arc<Mutex<ReplayBuffer>>,
    receiver: Receiver<PushedItemMessage>,
) -> JoinHandle<Result<usize, ReplayBufferError>> {
    std::thread::spawn(move || -> Result<usize, ReplayBufferError> {
        let mut n_stored = 0;
        for msg in receiver.iter() {
            let mut buffer = buffer
                .lock()
                .map_err(|_| ReplayBufferError::LockPoisoned)?;
            for tr in msg.pushed_items.iter() {
                if let Err(e) = buffer.store(&tr.obs, &tr.act, tr.reward, &tr.next_obs, tr.is_done)
                {
                    warn!("Failed to store a transition from proxy {}: {}", msg.id, e);
                    return Err(e);
                }
                n_stored += 1;
            }
        }
        info!(
            "Replay buffer thread finished after storing {} transitions",
            n_stored
        );
        Ok(n_stored)
    })
}

/// Samples a batch from a shared buffer while holding its lock.
pub fn sample_batch_locked(
    buffer: &Mutex<ReplayBuffer>,
    batch_size: usize,
) -> Result<TransitionBatch, ReplayBufferError> {
    let mut buffer = buffer
        .lock()
        .map_err(|_| ReplayBufferError::LockPoisoned)?;
    buffer.sample_batch(batch_size)
}

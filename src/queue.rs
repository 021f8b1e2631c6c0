//! The single-producer/single-consumer queue linking two modules.
//!
//! Each subscription gets its own `IncrementalQueue`: the provider's worker
//! calls `put` once per subscriber (cloning the `UpdateMessage` — the IUs
//! inside are `Arc`s, so the clone is cheap and they stay shared), and the
//! consumer's worker polls its own queue with `get`. `get` never blocks
//! forever: it times out so a worker can re-check its running flag, which is
//! what makes `ModuleNode::stop` converge quickly instead of waiting on a
//! buffer that may never receive anything again.

use crate::error::QueueError;
use crate::update_message::UpdateMessage;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct IncrementalQueue {
    sender: Sender<UpdateMessage>,
    receiver: Receiver<UpdateMessage>,
    removed: AtomicBool,
}

impl IncrementalQueue {
    pub fn unbounded() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            removed: AtomicBool::new(false),
        }
    }

    /// A bounded queue applies backpressure: `put` blocks once `capacity`
    /// messages are outstanding, which is how a slow consumer throttles a
    /// fast provider instead of memory growing unbounded.
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            sender,
            receiver,
            removed: AtomicBool::new(false),
        }
    }

    pub fn put(&self, message: UpdateMessage) -> Result<(), QueueError> {
        if self.removed.load(Ordering::Acquire) {
            return Err(QueueError::AlreadyRemoved);
        }
        self.sender.send(message).map_err(|_| QueueError::AlreadyRemoved)
    }

    /// Block for up to `timeout` waiting for the next message. Returns
    /// `None` on timeout or once the queue has been removed and drained.
    pub fn get(&self, timeout: Duration) -> Option<UpdateMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Non-blocking poll, used by consumers that batch multiple buffers
    /// per cycle rather than dedicating a thread to each.
    pub fn try_get(&self) -> Option<UpdateMessage> {
        match self.receiver.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Mark the queue as removed. Idempotent: calling it twice is a no-op,
    /// it does not return an error — only `put`/`get` against an already
    /// removed queue report `AlreadyRemoved`.
    pub fn remove(&self) {
        self.removed.store(true, Ordering::Release);
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

//! Bounded, drop-on-full conduit between stages.
//!
//! Producers never wait: when the channel is full (or closed) the offered item is
//! discarded and counted. Consumers poll with `try_take`; after `close` they drain
//! whatever is left and then see `None` forever.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{ensure, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Default capacity of both pipeline channels.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

pub struct BoundedChannel<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl<T> BoundedChannel<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        ensure!(capacity >= 1, "channel capacity must be at least 1");
        let (tx, rx) = bounded(capacity);
        Ok(Self {
            tx,
            rx,
            capacity,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        })
    }

    /// Offer an item without blocking. Returns false (and drops the item) when the
    /// channel is full or closed.
    pub fn try_put(&self, item: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Oldest queued item, if any.
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting items. Returns true on the first call only.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items rejected by `try_put` so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped())
            .finish()
    }
}

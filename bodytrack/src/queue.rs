/// Closeable bounded FIFO shared between the tracker's callers and its workers
///
/// Built on two crossbeam channels:
/// - an item channel whose capacity is the queue bound
/// - a gate channel that never carries a message; `close()` drops its only
///   sender, which disconnects the gate and wakes every thread selecting on it
///
/// Closing only stops admissions. Items already queued stay poppable until
/// drained, after which `pop` reports `Closed` without blocking.
use crate::timeout::Timeout;
use crossbeam::channel::{bounded, Receiver, Select, Sender, TryRecvError, TrySendError};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::Instant;
use thiserror::Error;

/// Rejected push; the item is handed back to the caller
#[derive(Error, PartialEq, Eq, Clone, Copy)]
pub enum PushError<T> {
    #[error("timed out waiting for room in the queue")]
    Timeout(T),
    #[error("queue is closed")]
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Timeout(item) | Self::Closed(item) => item,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(_) => f.write_str("Timeout(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Failed pop
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum PopError {
    #[error("timed out waiting for an item")]
    Timeout,
    #[error("queue is closed and drained")]
    Closed,
}

pub struct BoundedQueue<T> {
    capacity: usize,
    items_tx: Sender<T>,
    items_rx: Receiver<T>,
    /// `Some` while open. Pushes hold the read side across their admission
    /// check, so once `close()` returns no further push can succeed.
    gate: RwLock<Option<Sender<()>>>,
    gate_rx: Receiver<()>,
}

impl<T> BoundedQueue<T> {
    /// Create an open queue holding at most `capacity` items
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");

        let (items_tx, items_rx) = bounded(capacity);
        let (gate_tx, gate_rx) = bounded(0);

        Self {
            capacity,
            items_tx,
            items_rx,
            gate: RwLock::new(Some(gate_tx)),
            gate_rx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items_rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items_rx.is_full()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.gate_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Append `item`, waiting up to `timeout` for room
    pub fn push(&self, item: T, timeout: Timeout) -> Result<(), PushError<T>> {
        let deadline = timeout.deadline_from(Instant::now());
        let mut item = item;

        loop {
            {
                let gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
                if gate.is_none() {
                    return Err(PushError::Closed(item));
                }
                match self.items_tx.try_send(item) {
                    Ok(()) => return Ok(()),
                    Err(TrySendError::Full(back)) => item = back,
                    // The queue keeps its own receiver alive
                    Err(TrySendError::Disconnected(back)) => return Err(PushError::Closed(back)),
                }
            }

            let mut sel = Select::new();
            sel.send(&self.items_tx);
            sel.recv(&self.gate_rx);
            if !wait_ready(&mut sel, deadline) {
                return Err(PushError::Timeout(item));
            }
        }
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive
    pub fn pop(&self, timeout: Timeout) -> Result<T, PopError> {
        let deadline = timeout.deadline_from(Instant::now());

        loop {
            match self.items_rx.try_recv() {
                Ok(item) => return Ok(item),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return Err(PopError::Closed),
            }

            if self.is_closed() {
                // Every push admitted before close() has landed by now
                return self.items_rx.try_recv().map_err(|_| PopError::Closed);
            }

            let mut sel = Select::new();
            sel.recv(&self.items_rx);
            sel.recv(&self.gate_rx);
            if !wait_ready(&mut sel, deadline) {
                return Err(PopError::Timeout);
            }
        }
    }

    /// Stop admissions and wake every blocked `push`/`pop`
    ///
    /// Returns `true` for the call that actually closed the queue.
    pub fn close(&self) -> bool {
        let gate_tx = self
            .gate
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Dropping the sender disconnects the gate for all selectors
        gate_tx.is_some()
    }

    /// Remove and return everything currently queued
    pub fn drain(&self) -> Vec<T> {
        self.items_rx.try_iter().collect()
    }
}

/// Block until one of the selected operations is ready; `false` on deadline
fn wait_ready(sel: &mut Select<'_>, deadline: Option<Instant>) -> bool {
    match deadline {
        None => {
            sel.ready();
            true
        }
        Some(deadline) => sel.ready_deadline(deadline).is_ok(),
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

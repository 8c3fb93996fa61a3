//! Interfaces: the queued, costed attachment points of a node.
//!
//! An [`Interface`] holds a pair of FIFO queues of serialized packets. The
//! owning node pops from `inbound` and pushes to `outbound`; the link layer
//! does the opposite. These queues are the only memory shared between
//! workers, so they are also the only synchronization points.
//!
//! # Example
//!
//! ```
//! use dvnet::interface::{Block, Interface};
//!
//! let iface = Interface::new(1, 1);
//! iface.enqueue_outbound(b"first".to_vec(), Block::No).unwrap();
//!
//! // A bounded, full queue drops instead of waiting
//! assert!(iface.enqueue_outbound(b"second".to_vec(), Block::No).is_err());
//! assert_eq!(iface.outbound_len(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::types::Cost;

/// How often a parked pusher re-checks its stop signal.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A bounded queue had no room for the entry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("queue is full ({capacity} entries)")]
pub struct QueueFull {
    /// Configured capacity of the queue
    pub capacity: usize,
}

/// Errors returned when enqueuing onto an interface.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    #[error(transparent)]
    Full(#[from] QueueFull),

    #[error("stop signal raised while waiting for queue space")]
    Cancelled,
}

/// Cooperative stop flag shared by a worker and its supervisor.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a new, lowered stop signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every worker holding this signal to finish its iteration and exit.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once the signal has been raised.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Whether an enqueue may wait for space.
#[derive(Clone, Copy, Debug)]
pub enum Block<'a> {
    /// Fail with [`QueueFull`] if the queue is full.
    No,
    /// Park until there is space, or until the stop signal is raised.
    Until(&'a StopSignal),
}

/// A FIFO of serialized packets. Capacity 0 means unbounded.
#[derive(Debug)]
pub struct Queue {
    entries: Mutex<VecDeque<Vec<u8>>>,
    space: Condvar,
    capacity: usize,
}

impl Queue {
    /// Creates a queue holding at most `capacity` entries (0 = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            space: Condvar::new(),
            capacity,
        }
    }

    /// Returns the configured capacity (0 = unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn is_full(&self, entries: &VecDeque<Vec<u8>>) -> bool {
        self.capacity > 0 && entries.len() >= self.capacity
    }

    /// Appends an entry, or fails without touching the queue if it is full.
    pub fn try_push(&self, entry: Vec<u8>) -> Result<(), QueueFull> {
        let mut entries = self.entries.lock();
        if self.is_full(&entries) {
            return Err(QueueFull {
                capacity: self.capacity,
            });
        }
        entries.push_back(entry);
        Ok(())
    }

    /// Appends an entry, parking the caller while the queue is full.
    ///
    /// Returns [`EnqueueError::Cancelled`] if `stop` is raised before space
    /// frees up; the entry is discarded in that case.
    pub fn push_until(&self, entry: Vec<u8>, stop: &StopSignal) -> Result<(), EnqueueError> {
        let mut entries = self.entries.lock();
        while self.is_full(&entries) {
            if stop.is_raised() {
                return Err(EnqueueError::Cancelled);
            }
            self.space.wait_for(&mut entries, STOP_POLL_INTERVAL);
        }
        entries.push_back(entry);
        Ok(())
    }

    /// Pops the oldest entry without blocking.
    pub fn pop(&self) -> Option<Vec<u8>> {
        let entry = self.entries.lock().pop_front();
        if entry.is_some() {
            self.space.notify_one();
        }
        entry
    }

    /// Removes and returns every pending entry in FIFO order.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        let drained: Vec<_> = self.entries.lock().drain(..).collect();
        if !drained.is_empty() {
            self.space.notify_all();
        }
        drained
    }
}

/// A duplex queue pair attached to one link endpoint.
#[derive(Debug)]
pub struct Interface {
    cost: Cost,
    inbound: Queue,
    outbound: Queue,
}

impl Interface {
    /// Creates an interface whose queues each hold at most `capacity` entries.
    pub fn new(cost: Cost, capacity: usize) -> Self {
        Self {
            cost,
            inbound: Queue::new(capacity),
            outbound: Queue::new(capacity),
        }
    }

    /// Creates an interface with unbounded queues.
    pub fn unbounded(cost: Cost) -> Self {
        Self::new(cost, 0)
    }

    /// Wraps the interface for sharing with the link layer.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Returns the configured link cost of this interface.
    pub fn cost(&self) -> Cost {
        self.cost
    }

    /// Returns the queue capacity (0 = unbounded).
    pub fn capacity(&self) -> usize {
        self.inbound.capacity()
    }

    /// Pops the next received packet, if any. Never blocks.
    pub fn try_receive(&self) -> Option<Vec<u8>> {
        self.inbound.pop()
    }

    /// Queues a serialized packet for transmission.
    pub fn enqueue_outbound(&self, packet: Vec<u8>, block: Block<'_>) -> Result<(), EnqueueError> {
        match block {
            Block::No => Ok(self.outbound.try_push(packet)?),
            Block::Until(stop) => self.outbound.push_until(packet, stop),
        }
    }

    /// Takes every packet waiting for transmission. Used by the link layer.
    pub fn take_outbound(&self) -> Vec<Vec<u8>> {
        self.outbound.drain()
    }

    /// Hands a packet that crossed the wire to this interface. Used by the link layer.
    pub fn deliver_inbound(&self, packet: Vec<u8>) -> Result<(), QueueFull> {
        self.inbound.try_push(packet)
    }

    /// Returns the number of received packets not yet processed.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Returns the number of packets waiting for transmission.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }
}

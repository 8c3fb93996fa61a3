//! Node definitions and the `Node` trait.
//!
//! A node is any addressable participant of the network. Hosts originate
//! and accept application data; routers forward it and run the
//! distance-vector protocol. Both are driven the same way: a scheduler
//! calls [`Node::activate`] repeatedly, either once per tick or in a
//! dedicated worker thread via [`Node::run`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interface::{EnqueueError, Interface, QueueFull, StopSignal};
use crate::nodes::{Host, Router};
use crate::packet::{CodecError, WireFormat};
use crate::stats::NodeStats;
use crate::types::{InterfaceIndex, NodeAddress};

/// Pause between worker iterations that found nothing to do.
const IDLE_BACKOFF: Duration = Duration::from_micros(200);

/// The role a node plays in the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Host,
    Router,
}

/// Lifecycle of a node. Moves forward only, one step at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Running,
    Stopping,
    Stopped,
}

/// Per-packet failures. None of them stops a node; the packet is dropped,
/// the failure reported, and processing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    QueueFull(#[from] QueueFull),

    #[error("malformed packet: {0}")]
    MalformedPacket(CodecError),

    #[error("no route to {destination}")]
    NoRoute { destination: NodeAddress },

    #[error("packet for {destination} would leave through its arrival interface {interface}")]
    RoutingLoop {
        destination: NodeAddress,
        interface: InterfaceIndex,
    },

    #[error("unknown protocol tag {0:#04x}")]
    UnknownProtocol(u8),

    #[error("stopped while waiting for queue space")]
    Cancelled,
}

impl From<CodecError> for DispatchError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnknownKind(tag) => DispatchError::UnknownProtocol(tag),
            other => DispatchError::MalformedPacket(other),
        }
    }
}

impl From<EnqueueError> for DispatchError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::Full(full) => DispatchError::QueueFull(full),
            EnqueueError::Cancelled => DispatchError::Cancelled,
        }
    }
}

/// What a node does when a forward must wait for queue space.
#[derive(Clone, Copy, Debug)]
pub enum WaitMode<'a> {
    /// Park the worker thread until space frees up or `stop` is raised.
    Park(&'a StopSignal),
    /// Keep the packet and retry on the next activation, reading no new
    /// input meanwhile. Used when the link layer runs on the same thread.
    Yield,
}

/// Summary of one activation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Activation {
    /// Packets popped from inbound queues (or retried from a stall)
    pub processed: usize,
    /// True if a forward is still waiting for queue space
    pub stalled: bool,
}

impl Activation {
    /// Returns true if the node had nothing to do.
    pub fn is_idle(&self) -> bool {
        self.processed == 0 && !self.stalled
    }
}

/// State shared by every kind of node.
#[derive(Debug)]
pub struct NodeCore {
    /// Address of the node
    pub address: NodeAddress,
    /// Interfaces, indexed by position
    pub interfaces: Vec<Arc<Interface>>,
    /// Header layout used to encode and decode packets
    pub wire: WireFormat,
    /// Counters
    pub stats: NodeStats,
    liveness: Liveness,
}

impl NodeCore {
    /// Creates the shared state of a running node.
    pub fn new(address: NodeAddress, interfaces: Vec<Arc<Interface>>, wire: WireFormat) -> Self {
        Self {
            address,
            interfaces,
            wire,
            stats: NodeStats::default(),
            liveness: Liveness::Running,
        }
    }

    /// Returns the lifecycle state.
    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    /// Moves the lifecycle one step forward. Returns false once stopped.
    pub fn advance_liveness(&mut self) -> bool {
        self.liveness = match self.liveness {
            Liveness::Running => Liveness::Stopping,
            Liveness::Stopping | Liveness::Stopped => Liveness::Stopped,
        };
        self.liveness != Liveness::Stopped
    }
}

/// The trait implemented by hosts and routers.
pub trait Node: Send {
    /// Returns the shared node state.
    fn core(&self) -> &NodeCore;

    /// Returns the shared node state mutably.
    fn core_mut(&mut self) -> &mut NodeCore;

    /// Returns the role of this node.
    fn kind(&self) -> NodeKind;

    /// Called once before the simulation starts.
    fn init(&mut self) {}

    /// Processes whatever input is pending, without ever blocking unless
    /// `wait` is [`WaitMode::Park`] and a forward meets a full queue.
    fn activate(&mut self, wait: WaitMode<'_>) -> Activation;

    /// Returns the node's address.
    fn address(&self) -> NodeAddress {
        self.core().address
    }

    /// Returns the node's interfaces.
    fn interfaces(&self) -> &[Arc<Interface>] {
        &self.core().interfaces
    }

    /// Returns the node's counters.
    fn stats(&self) -> &NodeStats {
        &self.core().stats
    }

    /// Returns the lifecycle state.
    fn liveness(&self) -> Liveness {
        self.core().liveness()
    }

    /// Downcasts to a host.
    fn as_host(&self) -> Option<&Host> {
        None
    }

    /// Downcasts to a host, mutably.
    fn as_host_mut(&mut self) -> Option<&mut Host> {
        None
    }

    /// Downcasts to a router.
    fn as_router(&self) -> Option<&Router> {
        None
    }

    /// Worker loop: activates the node until `stop` is raised.
    ///
    /// The stop signal is checked once per iteration; the iteration in
    /// progress always completes.
    fn run(&mut self, stop: &StopSignal) {
        tracing::debug!(node = self.address(), kind = ?self.kind(), "worker starting");
        while !stop.is_raised() {
            let activation = self.activate(WaitMode::Park(stop));
            if activation.is_idle() {
                thread::sleep(IDLE_BACKOFF);
            }
        }
        let core = self.core_mut();
        while core.advance_liveness() {}
        tracing::debug!(node = self.address(), "worker ending");
    }
}

//! Core type definitions for the network simulation.
//!
//! This module defines the fundamental types used throughout the crate.

/// Address of a node (host or router) in the simulated network.
///
/// Addresses are written on the wire as zero-padded decimal digits, so
/// they must fit in the configured field width.
pub type NodeAddress = u32;

/// Position of an interface within its node's interface list.
pub type InterfaceIndex = usize;

/// Link or path cost used by the distance-vector protocol.
pub type Cost = u64;

/// Simulation time in scheduler ticks.
///
/// One tick is one pass of the link layer followed by one activation of
/// every node.
pub type Tick = u64;

/// Destination of control packets.
///
/// Control packets are consumed by the router on the other end of the
/// link and never forwarded, so they carry this reserved address instead
/// of a real node address. No node may be configured with it.
pub const LINK_LOCAL: NodeAddress = 0;

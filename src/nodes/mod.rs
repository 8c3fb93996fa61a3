//! Built-in node implementations.
//!
//! # Available Nodes
//!
//! - [`Host`] - An end host with a single interface that sends and
//!   receives application data
//! - [`Router`] - A multi-interface router that forwards data and runs the
//!   distance-vector protocol

pub mod host;
pub mod router;

pub use host::{Host, ReceiveCallback};
pub use router::Router;

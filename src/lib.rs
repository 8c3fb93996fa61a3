//! # dvnet
//!
//! A discrete-event simulation of a small packet-switched network. Hosts
//! inject application data, routers forward it hop by hop, and routers
//! compute their forwarding state cooperatively with a distance-vector
//! protocol (push-based Bellman-Ford with split horizon).
//!
//! ## Design Principles
//!
//! - **Queues are the only shared state**: every node owns its
//!   [`Interface`]s; the [`LinkLayer`] is the sole consumer of outbound
//!   queues and the sole producer of inbound queues.
//! - **Lossy links, patient routers**: hosts and the link layer drop on a
//!   full queue, while routers wait for room before forwarding.
//! - **Two schedulers**:
//!   - **Tick-driven** ([`Simulation`]): deterministic, single-threaded
//!     (or rayon-parallel within a tick), runs until the network is quiet.
//!   - **Threaded** ([`ThreadedSimulation`]): one OS thread per node plus
//!     one for the link layer, stopped after a wall-clock horizon.
//!
//! ## Features
//!
//! - `parallel` - Activate nodes within a tick on the rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use dvnet::config::TopologyBuilder;
//! use dvnet::Simulation;
//!
//! // Two hosts joined through a line of three routers
//! let config = TopologyBuilder::new()
//!     .host(1)
//!     .host(3)
//!     .router(10, "A", vec![1, 1])
//!     .router(11, "B", vec![1, 1])
//!     .router(12, "D", vec![1, 1])
//!     .link((1, 0), (10, 0))
//!     .link((10, 1), (11, 0))
//!     .link((11, 1), (12, 0))
//!     .link((12, 1), (3, 0))
//!     .build()
//!     .unwrap();
//!
//! let mut sim = Simulation::build(&config).unwrap();
//! sim.run_until_quiescent(100).expect("routing converges");
//!
//! sim.host_mut(1).unwrap().send(3, "hello").unwrap();
//! sim.run_until_quiescent(100);
//!
//! let delivered = sim.host(3).unwrap().received();
//! assert_eq!(delivered[0].payload, b"hello");
//! println!("{}", sim.router(10).unwrap().render_routes());
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use dvnet::config::TopologyConfig;
//!
//! let config = TopologyConfig::from_file("topology.yaml")?;
//! dvnet::init_logging(&config.simulation.log_level);
//! let run = dvnet::ThreadedSimulation::build(&config)?.run();
//! println!("{}", run.stats.summary());
//! ```

pub mod types;
pub mod packet;
pub mod interface;
pub mod link;
pub mod routing;
pub mod node;
pub mod nodes;
pub mod config;
pub mod topology;
pub mod engine;
pub mod threaded;
pub mod stats;

// Re-export commonly used types
pub use types::{Cost, InterfaceIndex, NodeAddress, Tick, LINK_LOCAL};
pub use packet::{CodecError, Packet, PacketKind, WireFormat};
pub use interface::{Block, EnqueueError, Interface, QueueFull, StopSignal};
pub use link::{Endpoint, Link, LinkLayer, TransferReport};
pub use routing::{DistanceVector, ForwardingTable, Route, RoutingTable};
pub use node::{Activation, DispatchError, Liveness, Node, NodeKind, WaitMode};
pub use nodes::{Host, Router};
pub use config::{ConfigError, TopologyBuilder, TopologyConfig};
pub use topology::Topology;
pub use engine::{Simulation, TickReport};
pub use threaded::{ThreadedRun, ThreadedSimulation};
pub use stats::{NodeStats, SimulationStats, Timer};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// overrides `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// dvnet::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}

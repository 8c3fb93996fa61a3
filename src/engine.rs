//! Tick-driven simulation engine.
//!
//! The [`Simulation`] advances the whole network one tick at a time. A tick
//! is one link-layer transfer pass followed by one activation of every
//! node, in ascending address order. Nodes never block here: a forward
//! that meets a full queue is held by the router and retried on its next
//! activation ([`WaitMode::Yield`]), so a single thread can drive the whole
//! network deterministically.
//!
//! With the `parallel` feature, node activations within a tick run on the
//! rayon thread pool. Nodes share nothing but their own interface queues,
//! and the link layer only runs between activations, so the outcome of a
//! tick does not depend on the order activations complete.
//!
//! # Example
//!
//! ```
//! use dvnet::config::TopologyBuilder;
//! use dvnet::engine::Simulation;
//!
//! let config = TopologyBuilder::new()
//!     .host(1)
//!     .host(3)
//!     .router(10, "A", vec![1, 1])
//!     .link((1, 0), (10, 0))
//!     .link((10, 1), (3, 0))
//!     .build()
//!     .unwrap();
//!
//! let mut sim = Simulation::build(&config).unwrap();
//! sim.run_until_quiescent(100).unwrap();
//!
//! sim.host_mut(1).unwrap().send(3, "hello").unwrap();
//! sim.run_until_quiescent(100);
//! assert_eq!(sim.host(3).unwrap().received().len(), 1);
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::sync::Arc;

use crate::config::{ConfigResult, TopologyConfig};
use crate::interface::Interface;
use crate::link::{LinkLayer, TransferReport};
use crate::node::{Activation, Node, WaitMode};
use crate::nodes::{Host, Router};
use crate::stats::{NodeReport, SimulationStats, Timer};
use crate::topology::{NodeMap, Topology};
use crate::types::{InterfaceIndex, NodeAddress, Tick};

/// What happened during one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that just ran, counting from 1
    pub tick: Tick,
    /// Link-layer movement at the start of the tick
    pub transfer: TransferReport,
    /// Packets processed by all nodes
    pub processed: usize,
    /// Nodes holding a packet for lack of queue space
    pub stalled: usize,
}

impl TickReport {
    /// Returns true if nothing moved and no node did any work.
    pub fn is_quiescent(&self) -> bool {
        self.transfer.is_idle() && self.processed == 0 && self.stalled == 0
    }
}

/// The tick-driven scheduler.
pub struct Simulation {
    /// Nodes in ascending address order
    nodes: NodeMap,
    /// Every link of the topology
    links: LinkLayer,
    /// Ticks executed so far
    current_tick: Tick,
    /// Whether `init` has run on the nodes
    initialized: bool,
    /// Scheduler statistics
    stats: SimulationStats,
    /// Wall-clock time spent inside `step`
    wall_time_ms: f64,
}

impl Simulation {
    /// Creates a simulation from assembled nodes and links.
    pub fn new(nodes: NodeMap, links: LinkLayer) -> Self {
        let mut stats = SimulationStats::new();
        stats.metadata.scheduler = "tick".to_string();
        stats.engine.node_count = nodes.len();
        stats.engine.link_count = links.len();
        Self {
            nodes,
            links,
            current_tick: 0,
            initialized: false,
            stats,
            wall_time_ms: 0.0,
        }
    }

    /// Builds a simulation from a validated configuration.
    pub fn build(config: &TopologyConfig) -> ConfigResult<Self> {
        let (nodes, links) = Topology::build(config)?.into_parts();
        Ok(Self::new(nodes, links))
    }

    /// Calls `init` on every node. Runs automatically before the first tick.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        for node in self.nodes.values_mut() {
            node.init();
        }
        self.initialized = true;
        tracing::debug!(nodes = self.nodes.len(), "simulation initialized");
    }

    /// Runs one tick.
    pub fn step(&mut self) -> TickReport {
        self.init();
        let timer = Timer::start();

        let transfer = self.links.transfer();
        let (processed, stalled) = self.activate_all();
        self.current_tick += 1;

        self.stats.engine.ticks_executed = self.current_tick;
        self.stats.engine.packets_moved += transfer.moved as u64;
        self.stats.engine.packets_lost += transfer.dropped as u64;
        self.wall_time_ms += timer.elapsed_ms();

        let report = TickReport {
            tick: self.current_tick,
            transfer,
            processed,
            stalled,
        };
        tracing::trace!(?report, "tick complete");
        report
    }

    #[cfg(not(feature = "parallel"))]
    fn activate_all(&mut self) -> (usize, usize) {
        self.nodes
            .values_mut()
            .map(|node| node.activate(WaitMode::Yield))
            .fold((0, 0), accumulate)
    }

    #[cfg(feature = "parallel")]
    fn activate_all(&mut self) -> (usize, usize) {
        self.nodes
            .par_iter_mut()
            .map(|(_, node)| accumulate((0, 0), node.activate(WaitMode::Yield)))
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
    }

    /// Runs `ticks` ticks.
    pub fn run(&mut self, ticks: Tick) {
        for _ in 0..ticks {
            self.step();
        }
        tracing::info!(tick = self.current_tick, "simulation run finished");
    }

    /// Runs until a tick in which nothing happens, or `max_ticks` elapse.
    ///
    /// Returns the quiet tick, or `None` if the limit was reached first.
    pub fn run_until_quiescent(&mut self, max_ticks: Tick) -> Option<Tick> {
        for _ in 0..max_ticks {
            let report = self.step();
            if report.is_quiescent() {
                self.stats.engine.quiescent_at = Some(report.tick);
                tracing::info!(tick = report.tick, "network quiescent");
                return Some(report.tick);
            }
        }
        tracing::warn!(
            max_ticks,
            tick = self.current_tick,
            "network still busy at tick limit"
        );
        None
    }

    /// Returns the number of ticks executed.
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates over the nodes in ascending address order.
    pub fn nodes(&self) -> impl Iterator<Item = &dyn Node> + '_ {
        self.nodes.values().map(|n| n.as_ref())
    }

    /// Returns the node at `address`.
    pub fn node(&self, address: NodeAddress) -> Option<&dyn Node> {
        self.nodes.get(&address).map(|n| n.as_ref())
    }

    /// Returns the host at `address`.
    pub fn host(&self, address: NodeAddress) -> Option<&Host> {
        self.nodes.get(&address)?.as_host()
    }

    /// Returns the host at `address`, mutably.
    pub fn host_mut(&mut self, address: NodeAddress) -> Option<&mut Host> {
        self.nodes.get_mut(&address)?.as_host_mut()
    }

    /// Returns the router at `address`.
    pub fn router(&self, address: NodeAddress) -> Option<&Router> {
        self.nodes.get(&address)?.as_router()
    }

    /// Returns one interface of a node.
    pub fn interface(&self, address: NodeAddress, index: InterfaceIndex) -> Option<&Arc<Interface>> {
        self.nodes.get(&address)?.interfaces().get(index)
    }

    /// Returns the link layer.
    pub fn links(&self) -> &LinkLayer {
        &self.links
    }

    /// Moves every node through its remaining lifecycle states.
    pub fn shutdown(&mut self) {
        for node in self.nodes.values_mut() {
            let core = node.core_mut();
            while core.advance_liveness() {}
        }
        tracing::info!(tick = self.current_tick, "simulation stopped");
    }

    /// Collects engine and per-node statistics.
    pub fn stats(&self) -> SimulationStats {
        let mut stats = self.stats.clone();
        stats.nodes = self
            .nodes
            .iter()
            .map(|(&address, node)| {
                let report = NodeReport {
                    kind: node.kind(),
                    stats: node.stats().clone(),
                };
                (address, report)
            })
            .collect();
        stats.compute_timing(self.wall_time_ms);
        stats
    }
}

fn accumulate((processed, stalled): (usize, usize), activation: Activation) -> (usize, usize) {
    (
        processed + activation.processed,
        stalled + usize::from(activation.stalled),
    )
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("current_tick", &self.current_tick)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyBuilder;
    use crate::node::Liveness;

    fn pair() -> Simulation {
        let config = TopologyBuilder::new()
            .router(10, "A", vec![3])
            .router(11, "B", vec![3])
            .link((10, 0), (11, 0))
            .build()
            .unwrap();
        Simulation::build(&config).unwrap()
    }

    #[test]
    fn test_empty_simulation_is_quiescent() {
        let mut sim = Simulation::new(NodeMap::new(), LinkLayer::new());
        assert_eq!(sim.run_until_quiescent(10), Some(1));
        assert_eq!(sim.current_tick(), 1);
    }

    #[test]
    fn test_step_moves_bootstrap_adverts() {
        let mut sim = pair();
        let first = sim.step();
        assert_eq!(first.tick, 1);
        assert_eq!(first.transfer.moved, 2);
        assert_eq!(first.processed, 2);

        assert_eq!(sim.router(10).unwrap().forwarding_table().lookup(11), Some(0));
        assert_eq!(sim.router(11).unwrap().routing_table().get(10).map(|r| r.cost), Some(3));
    }

    #[test]
    fn test_run_counts_ticks() {
        let mut sim = pair();
        sim.run(5);
        assert_eq!(sim.current_tick(), 5);
        assert_eq!(sim.stats().engine.ticks_executed, 5);
    }

    #[test]
    fn test_quiescence_and_stats() {
        let mut sim = pair();
        let quiet = sim.run_until_quiescent(50).unwrap();
        assert!(quiet > 1);

        let stats = sim.stats();
        assert_eq!(stats.metadata.scheduler, "tick");
        assert_eq!(stats.engine.quiescent_at, Some(quiet));
        assert_eq!(stats.engine.node_count, 2);
        assert_eq!(stats.engine.link_count, 1);
        assert_eq!(stats.nodes.len(), 2);
        assert_eq!(stats.totals().updates_received, stats.engine.packets_moved);
    }

    #[test]
    fn test_accessors() {
        let sim = pair();
        assert_eq!(sim.node_count(), 2);
        assert!(sim.node(10).is_some());
        assert!(sim.host(10).is_none());
        assert!(sim.router(99).is_none());
        assert_eq!(sim.interface(11, 0).unwrap().cost(), 3);
        assert!(sim.interface(11, 1).is_none());
        assert_eq!(sim.nodes().count(), 2);
    }

    #[test]
    fn test_shutdown_stops_every_node() {
        let mut sim = pair();
        sim.run(2);
        sim.shutdown();
        assert!(sim.nodes().all(|n| n.liveness() == Liveness::Stopped));
    }
}

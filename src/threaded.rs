//! Thread-per-node simulation engine.
//!
//! [`ThreadedSimulation`] runs every node and the link layer as independent
//! workers on their own OS threads. Workers share nothing but interface
//! queues. Routers forwarding into a full queue park until the link layer
//! drains it ([`WaitMode::Park`](crate::node::WaitMode::Park)).
//!
//! The run is bounded by a wall-clock horizon: once it elapses, a shared
//! [`StopSignal`] is raised, every worker finishes its current iteration,
//! and all threads are joined before the nodes are handed back.

use std::thread;
use std::time::Duration;

use crate::config::{ConfigResult, TopologyConfig};
use crate::interface::StopSignal;
use crate::link::{LinkLayer, TransferReport};
use crate::nodes::{Host, Router};
use crate::stats::{NodeReport, SimulationStats, Timer};
use crate::topology::{NodeMap, Topology};
use crate::types::NodeAddress;

/// Horizon used when none is configured.
const DEFAULT_HORIZON: Duration = Duration::from_millis(500);

/// The threaded scheduler.
pub struct ThreadedSimulation {
    nodes: NodeMap,
    links: LinkLayer,
    horizon: Duration,
}

/// Everything left after a threaded run.
pub struct ThreadedRun {
    /// The stopped nodes, keyed by address
    pub nodes: NodeMap,
    /// Engine and per-node statistics
    pub stats: SimulationStats,
}

impl ThreadedSimulation {
    /// Creates a threaded simulation from assembled nodes and links.
    pub fn new(nodes: NodeMap, links: LinkLayer) -> Self {
        Self {
            nodes,
            links,
            horizon: DEFAULT_HORIZON,
        }
    }

    /// Builds a threaded simulation from a validated configuration.
    pub fn build(config: &TopologyConfig) -> ConfigResult<Self> {
        let (nodes, links) = Topology::build(config)?.into_parts();
        Ok(Self::new(nodes, links)
            .with_horizon(Duration::from_millis(config.simulation.horizon_ms)))
    }

    /// Sets how long the workers run before being stopped.
    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    /// Returns the configured horizon.
    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Returns the host at `address`, mutably, so data can be queued
    /// before the workers start.
    pub fn host_mut(&mut self, address: NodeAddress) -> Option<&mut Host> {
        self.nodes.get_mut(&address)?.as_host_mut()
    }

    /// Spawns all workers, waits for the horizon, stops and joins them.
    pub fn run(self) -> ThreadedRun {
        let Self {
            mut nodes,
            links,
            horizon,
        } = self;

        for node in nodes.values_mut() {
            node.init();
        }

        let stop = StopSignal::new();
        let timer = Timer::start();
        tracing::info!(
            nodes = nodes.len(),
            links = links.len(),
            horizon_ms = horizon.as_millis() as u64,
            "starting workers"
        );

        let transfer = thread::scope(|scope| {
            let link_worker = scope.spawn(|| links.run(&stop));

            let workers: Vec<_> = nodes
                .iter_mut()
                .map(|(&address, node)| {
                    let stop = &stop;
                    (address, scope.spawn(move || node.run(stop)))
                })
                .collect();

            thread::sleep(horizon);
            stop.raise();
            tracing::debug!("stop signal raised");

            for (address, worker) in workers {
                if worker.join().is_err() {
                    tracing::error!(node = address, "worker panicked");
                }
            }
            link_worker.join().unwrap_or_else(|_| {
                tracing::error!("link layer worker panicked");
                TransferReport::default()
            })
        });

        let wall_time_ms = timer.elapsed_ms();
        tracing::info!(
            moved = transfer.moved,
            lost = transfer.dropped,
            wall_time_ms,
            "workers joined"
        );

        let mut stats = SimulationStats::new();
        stats.metadata.scheduler = "threaded".to_string();
        stats.engine.packets_moved = transfer.moved as u64;
        stats.engine.packets_lost = transfer.dropped as u64;
        stats.engine.node_count = nodes.len();
        stats.engine.link_count = links.len();
        stats.nodes = nodes
            .iter()
            .map(|(&address, node)| {
                let report = NodeReport {
                    kind: node.kind(),
                    stats: node.stats().clone(),
                };
                (address, report)
            })
            .collect();
        stats.compute_timing(wall_time_ms);

        ThreadedRun { nodes, stats }
    }
}

impl ThreadedRun {
    /// Returns the host at `address`.
    pub fn host(&self, address: NodeAddress) -> Option<&Host> {
        self.nodes.get(&address)?.as_host()
    }

    /// Returns the router at `address`.
    pub fn router(&self, address: NodeAddress) -> Option<&Router> {
        self.nodes.get(&address)?.as_router()
    }
}

impl std::fmt::Debug for ThreadedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedRun")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish()
    }
}

impl std::fmt::Debug for ThreadedSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedSimulation")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("horizon", &self.horizon)
            .finish()
    }
}

//! Statistics collection and export.
//!
//! Every node keeps a [`NodeStats`] of counters. After a run the engine
//! gathers them into a [`SimulationStats`], which can be exported as JSON
//! or CSV or printed as a human-readable summary.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::node::{DispatchError, NodeKind};
use crate::types::{NodeAddress, Tick};

/// Counters kept by a single node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Data packets originated (hosts)
    pub packets_sent: u64,
    /// Data packets accepted (hosts)
    pub packets_received: u64,
    /// Data packets forwarded (routers)
    pub packets_forwarded: u64,
    /// Advertisements received (routers)
    pub updates_received: u64,
    /// Advertisements sent (routers)
    pub updates_sent: u64,
    /// Routing table rows created or lowered (routers)
    pub route_changes: u64,
    /// Drops because a bounded queue was full
    pub dropped_queue_full: u64,
    /// Drops because the packet could not be decoded
    pub dropped_malformed: u64,
    /// Drops because no route was known
    pub dropped_no_route: u64,
    /// Drops because the packet would have gone back out its arrival interface
    pub dropped_routing_loop: u64,
    /// Drops because of an unrecognized packet kind
    pub dropped_unknown_protocol: u64,
    /// Drops because the node was stopped while waiting
    pub dropped_cancelled: u64,
}

impl NodeStats {
    /// Counts a dropped packet under its reason.
    pub fn record_drop(&mut self, err: &DispatchError) {
        let counter = match err {
            DispatchError::QueueFull(_) => &mut self.dropped_queue_full,
            DispatchError::MalformedPacket(_) => &mut self.dropped_malformed,
            DispatchError::NoRoute { .. } => &mut self.dropped_no_route,
            DispatchError::RoutingLoop { .. } => &mut self.dropped_routing_loop,
            DispatchError::UnknownProtocol(_) => &mut self.dropped_unknown_protocol,
            DispatchError::Cancelled => &mut self.dropped_cancelled,
        };
        *counter += 1;
    }

    /// Total packets dropped for any reason.
    pub fn dropped(&self) -> u64 {
        self.dropped_queue_full
            + self.dropped_malformed
            + self.dropped_no_route
            + self.dropped_routing_loop
            + self.dropped_unknown_protocol
            + self.dropped_cancelled
    }
}

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Run metadata
    pub metadata: SimulationMetadata,

    /// Scheduler-level statistics
    pub engine: EngineStats,

    /// Per-node statistics, keyed by address
    pub nodes: BTreeMap<NodeAddress, NodeReport>,

    /// Wall-clock statistics
    pub timing: TimingStats,
}

/// Metadata about the run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Simulation name/description
    pub name: String,

    /// Which scheduler ran the simulation ("tick" or "threaded")
    pub scheduler: String,

    /// Crate version
    pub version: String,
}

/// Scheduler-level statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Ticks executed (tick scheduler only)
    pub ticks_executed: Tick,

    /// Tick at which the network went quiet, if it did
    pub quiescent_at: Option<Tick>,

    /// Packets moved across links
    pub packets_moved: u64,

    /// Packets lost on links because the peer queue was full
    pub packets_lost: u64,

    /// Number of nodes
    pub node_count: usize,

    /// Number of links
    pub link_count: usize,
}

/// Statistics of one node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeReport {
    /// Host or router
    pub kind: NodeKind,

    /// Counters
    pub stats: NodeStats,
}

/// Wall-clock statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Packets moved across links per wall-clock second
    pub packets_per_second: f64,
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Sets the simulation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Updates timing statistics from the wall-clock duration of the run.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;
        if wall_time_ms > 0.0 {
            self.timing.packets_per_second =
                self.engine.packets_moved as f64 / (wall_time_ms / 1000.0);
        }
    }

    /// Sums the counters of every node.
    pub fn totals(&self) -> NodeStats {
        let mut total = NodeStats::default();
        for report in self.nodes.values() {
            let s = &report.stats;
            total.packets_sent += s.packets_sent;
            total.packets_received += s.packets_received;
            total.packets_forwarded += s.packets_forwarded;
            total.updates_received += s.updates_received;
            total.updates_sent += s.updates_sent;
            total.route_changes += s.route_changes;
            total.dropped_queue_full += s.dropped_queue_full;
            total.dropped_malformed += s.dropped_malformed;
            total.dropped_no_route += s.dropped_no_route;
            total.dropped_routing_loop += s.dropped_routing_loop;
            total.dropped_unknown_protocol += s.dropped_unknown_protocol;
            total.dropped_cancelled += s.dropped_cancelled;
        }
        total
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let totals = self.totals();
        let mut csv = String::new();

        csv.push_str("metric,value\n");
        csv.push_str(&format!("ticks_executed,{}\n", self.engine.ticks_executed));
        csv.push_str(&format!(
            "quiescent_at,{}\n",
            self.engine.quiescent_at.map(|t| t.to_string()).unwrap_or_default()
        ));
        csv.push_str(&format!("packets_moved,{}\n", self.engine.packets_moved));
        csv.push_str(&format!("packets_lost,{}\n", self.engine.packets_lost));
        csv.push_str(&format!("packets_sent,{}\n", totals.packets_sent));
        csv.push_str(&format!("packets_received,{}\n", totals.packets_received));
        csv.push_str(&format!("packets_forwarded,{}\n", totals.packets_forwarded));
        csv.push_str(&format!("packets_dropped,{}\n", totals.dropped()));
        csv.push_str(&format!("route_changes,{}\n", totals.route_changes));
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));

        csv
    }

    /// Exports per-node statistics to CSV.
    pub fn nodes_to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("address,kind,sent,received,forwarded,updates_received,updates_sent,route_changes,dropped\n");
        for (address, report) in &self.nodes {
            let s = &report.stats;
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                address,
                match report.kind {
                    NodeKind::Host => "host",
                    NodeKind::Router => "router",
                },
                s.packets_sent,
                s.packets_received,
                s.packets_forwarded,
                s.updates_received,
                s.updates_sent,
                s.route_changes,
                s.dropped(),
            ));
        }

        csv
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if !self.metadata.scheduler.is_empty() {
            writeln!(w, "Scheduler: {}", self.metadata.scheduler)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Engine ---")?;
        writeln!(w, "Ticks executed: {}", self.engine.ticks_executed)?;
        if let Some(tick) = self.engine.quiescent_at {
            writeln!(w, "Quiescent at tick: {}", tick)?;
        }
        writeln!(w, "Packets moved: {}", self.engine.packets_moved)?;
        writeln!(w, "Packets lost on links: {}", self.engine.packets_lost)?;
        writeln!(w, "Nodes: {}, Links: {}", self.engine.node_count, self.engine.link_count)?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w)?;

        writeln!(w, "--- Nodes ---")?;
        for (address, report) in &self.nodes {
            let s = &report.stats;
            match report.kind {
                NodeKind::Host => writeln!(
                    w,
                    "Host {}: sent {}, received {}, dropped {}",
                    address,
                    s.packets_sent,
                    s.packets_received,
                    s.dropped()
                )?,
                NodeKind::Router => writeln!(
                    w,
                    "Router {}: forwarded {}, updates in/out {}/{}, route changes {}, dropped {}",
                    address,
                    s.packets_forwarded,
                    s.updates_received,
                    s.updates_sent,
                    s.route_changes,
                    s.dropped()
                )?,
            }
        }

        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

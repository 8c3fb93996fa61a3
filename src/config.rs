//! Topology configuration.
//!
//! A topology is described declaratively in YAML or JSON and validated
//! before any node is built.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   max_ticks: 200
//!   horizon_ms: 500
//!   queue_capacity: 0
//!   wire:
//!     destination_width: 5
//!     source_width: 5
//!
//! hosts:
//!   - address: 1
//!   - address: 3
//!
//! routers:
//!   - address: 10
//!     name: A
//!     interface_costs: [1, 1]
//!   - address: 11
//!     name: B
//!     interface_costs: [1, 1]
//!
//! links:
//!   - a: { node: 1, interface: 0 }
//!     b: { node: 10, interface: 0 }
//!   - a: { node: 10, interface: 1 }
//!     b: { node: 11, interface: 0 }
//!     capacity: 1
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::node::NodeKind;
use crate::packet::WireFormat;
use crate::types::{Cost, InterfaceIndex, NodeAddress, Tick, LINK_LOCAL};

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Tick limit for the tick-driven engine
    #[serde(default = "default_max_ticks")]
    pub max_ticks: Tick,

    /// Wall-clock horizon for the threaded engine, in milliseconds
    #[serde(default = "default_horizon_ms")]
    pub horizon_ms: u64,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Default queue capacity for every interface; 0 is unbounded
    #[serde(default)]
    pub queue_capacity: usize,

    /// Header field widths shared by every node
    #[serde(default)]
    pub wire: WireFormat,
}

fn default_max_ticks() -> Tick {
    1000
}

fn default_horizon_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host_cost() -> Cost {
    1
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            horizon_ms: default_horizon_ms(),
            log_level: default_log_level(),
            queue_capacity: 0,
            wire: WireFormat::default(),
        }
    }
}

/// Configuration for a host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Unique node address
    pub address: NodeAddress,

    /// Optional friendly name
    #[serde(default)]
    pub name: Option<String>,

    /// Cost of the host's single interface
    #[serde(default = "default_host_cost")]
    pub interface_cost: Cost,

    /// Queue capacity override for the host's interface
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

/// Configuration for a router.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Unique node address
    pub address: NodeAddress,

    /// Optional friendly name used in logs
    #[serde(default)]
    pub name: Option<String>,

    /// One entry per interface, in index order
    pub interface_costs: Vec<Cost>,

    /// Queue capacity override for all of this router's interfaces
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

/// One side of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Node address
    pub node: NodeAddress,

    /// Interface index on that node
    #[serde(default)]
    pub interface: InterfaceIndex,
}

impl EndpointConfig {
    /// Creates an endpoint reference.
    pub fn new(node: NodeAddress, interface: InterfaceIndex) -> Self {
        Self { node, interface }
    }
}

impl From<(NodeAddress, InterfaceIndex)> for EndpointConfig {
    fn from((node, interface): (NodeAddress, InterfaceIndex)) -> Self {
        Self::new(node, interface)
    }
}

/// Configuration for a link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// First endpoint
    pub a: EndpointConfig,

    /// Second endpoint
    pub b: EndpointConfig,

    /// Queue capacity for both endpoint interfaces, overriding node and
    /// simulation defaults
    #[serde(default)]
    pub capacity: Option<usize>,
}

/// Complete topology configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Host definitions
    #[serde(default)]
    pub hosts: Vec<HostConfig>,

    /// Router definitions
    #[serde(default)]
    pub routers: Vec<RouterConfig>,

    /// Link definitions
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

impl TopologyConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: TopologyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: TopologyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let wire = self.simulation.wire;
        if wire.destination_width == 0 || wire.source_width == 0 {
            return Err(ConfigError::Validation(
                "Wire field widths must be at least 1".to_string(),
            ));
        }

        // Addresses: unique, non-zero, representable on the wire
        let mut interfaces: BTreeMap<NodeAddress, usize> = BTreeMap::new();
        let nodes = self
            .hosts
            .iter()
            .map(|h| (h.address, 1))
            .chain(self.routers.iter().map(|r| (r.address, r.interface_costs.len())));
        for (address, count) in nodes {
            if address == LINK_LOCAL {
                return Err(ConfigError::Validation(format!(
                    "Address {} is reserved for control packets",
                    LINK_LOCAL
                )));
            }
            if !wire.fits(address) {
                return Err(ConfigError::Validation(format!(
                    "Address {} does not fit the wire format",
                    address
                )));
            }
            if interfaces.insert(address, count).is_some() {
                return Err(ConfigError::Validation(format!(
                    "Duplicate node address: {}",
                    address
                )));
            }
        }

        // Links reference existing interfaces, each at most once
        let mut used = HashSet::new();
        for link in &self.links {
            if link.a.node == link.b.node {
                return Err(ConfigError::Validation(format!(
                    "Link joins node {} to itself",
                    link.a.node
                )));
            }
            for end in [link.a, link.b] {
                let Some(&count) = interfaces.get(&end.node) else {
                    return Err(ConfigError::Validation(format!(
                        "Link references non-existent node: {}",
                        end.node
                    )));
                };
                if end.interface >= count {
                    return Err(ConfigError::Validation(format!(
                        "Node {} has no interface {}",
                        end.node, end.interface
                    )));
                }
                if !used.insert(end) {
                    return Err(ConfigError::Validation(format!(
                        "Interface {} of node {} is used by more than one link",
                        end.interface, end.node
                    )));
                }
            }
        }

        for router in &self.routers {
            if router.interface_costs.is_empty() {
                tracing::warn!("Router {} has no interfaces", router.address);
            }
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the number of hosts and routers.
    pub fn node_count(&self) -> usize {
        self.hosts.len() + self.routers.len()
    }

    /// Returns the number of links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Finds a host configuration by address.
    pub fn find_host(&self, address: NodeAddress) -> Option<&HostConfig> {
        self.hosts.iter().find(|h| h.address == address)
    }

    /// Finds a router configuration by address.
    pub fn find_router(&self, address: NodeAddress) -> Option<&RouterConfig> {
        self.routers.iter().find(|r| r.address == address)
    }

    /// Returns the role of the node at `address`.
    pub fn kind_of(&self, address: NodeAddress) -> Option<NodeKind> {
        if self.find_host(address).is_some() {
            Some(NodeKind::Host)
        } else if self.find_router(address).is_some() {
            Some(NodeKind::Router)
        } else {
            None
        }
    }

    /// Resolves the queue capacity of one interface.
    ///
    /// A link's capacity wins over the node's, which wins over the
    /// simulation default.
    pub fn queue_capacity(&self, endpoint: EndpointConfig) -> usize {
        let from_link = self
            .links
            .iter()
            .find(|l| l.a == endpoint || l.b == endpoint)
            .and_then(|l| l.capacity);
        let from_node = self
            .find_host(endpoint.node)
            .and_then(|h| h.queue_capacity)
            .or_else(|| self.find_router(endpoint.node).and_then(|r| r.queue_capacity));

        from_link
            .or(from_node)
            .unwrap_or(self.simulation.queue_capacity)
    }
}

/// Builder for creating a TopologyConfig programmatically.
#[derive(Default)]
pub struct TopologyBuilder {
    config: TopologyConfig,
}

impl TopologyBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick limit.
    pub fn max_ticks(mut self, ticks: Tick) -> Self {
        self.config.simulation.max_ticks = ticks;
        self
    }

    /// Sets the wall-clock horizon for threaded runs.
    pub fn horizon_ms(mut self, ms: u64) -> Self {
        self.config.simulation.horizon_ms = ms;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Sets the default queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.simulation.queue_capacity = capacity;
        self
    }

    /// Sets the wire format.
    pub fn wire(mut self, wire: WireFormat) -> Self {
        self.config.simulation.wire = wire;
        self
    }

    /// Adds a host.
    pub fn host(mut self, address: NodeAddress) -> Self {
        self.config.hosts.push(HostConfig {
            address,
            name: None,
            interface_cost: default_host_cost(),
            queue_capacity: None,
        });
        self
    }

    /// Adds a router with one interface per cost.
    pub fn router(
        mut self,
        address: NodeAddress,
        name: impl Into<String>,
        interface_costs: Vec<Cost>,
    ) -> Self {
        self.config.routers.push(RouterConfig {
            address,
            name: Some(name.into()),
            interface_costs,
            queue_capacity: None,
        });
        self
    }

    /// Adds a link using the default capacities.
    pub fn link(self, a: impl Into<EndpointConfig>, b: impl Into<EndpointConfig>) -> Self {
        self.push_link(a.into(), b.into(), None)
    }

    /// Adds a link whose endpoint queues hold at most `capacity` entries.
    pub fn link_with_capacity(
        self,
        a: impl Into<EndpointConfig>,
        b: impl Into<EndpointConfig>,
        capacity: usize,
    ) -> Self {
        self.push_link(a.into(), b.into(), Some(capacity))
    }

    fn push_link(mut self, a: EndpointConfig, b: EndpointConfig, capacity: Option<usize>) -> Self {
        self.config.links.push(LinkConfig { a, b, capacity });
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<TopologyConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

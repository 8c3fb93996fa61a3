//! Builds live nodes and links from a [`TopologyConfig`].
//!
//! Interfaces are created first, one per configured (node, index) pair,
//! so that a link's capacity can shape the queues on both of its ends.
//! The same [`Arc<Interface>`] is then handed to the owning node and to
//! the link layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{ConfigResult, EndpointConfig, TopologyConfig};
use crate::interface::Interface;
use crate::link::{Endpoint, LinkLayer};
use crate::node::Node;
use crate::nodes::{Host, Router};
use crate::types::NodeAddress;

/// Nodes keyed by address, in ascending order.
pub type NodeMap = BTreeMap<NodeAddress, Box<dyn Node>>;

/// A ready-to-run network.
pub struct Topology {
    nodes: NodeMap,
    links: LinkLayer,
}

impl Topology {
    /// Validates `config` and builds every node and link.
    pub fn build(config: &TopologyConfig) -> ConfigResult<Self> {
        config.validate()?;
        let wire = config.simulation.wire;

        let mut interfaces: BTreeMap<NodeAddress, Vec<Arc<Interface>>> = BTreeMap::new();
        for host in &config.hosts {
            let capacity = config.queue_capacity(EndpointConfig::new(host.address, 0));
            interfaces.insert(
                host.address,
                vec![Interface::new(host.interface_cost, capacity).shared()],
            );
        }
        for router in &config.routers {
            let ifaces = router
                .interface_costs
                .iter()
                .enumerate()
                .map(|(index, &cost)| {
                    let capacity = config.queue_capacity(EndpointConfig::new(router.address, index));
                    Interface::new(cost, capacity).shared()
                })
                .collect();
            interfaces.insert(router.address, ifaces);
        }

        let mut links = LinkLayer::new();
        for link in &config.links {
            // validate() guarantees both interfaces exist
            let (Some(a), Some(b)) = (
                lookup(&interfaces, link.a),
                lookup(&interfaces, link.b),
            ) else {
                continue;
            };
            links.connect(
                Endpoint::new(link.a.node, link.a.interface),
                a,
                Endpoint::new(link.b.node, link.b.interface),
                b,
            );
        }

        let mut nodes: NodeMap = BTreeMap::new();
        for host in &config.hosts {
            let Some(iface) = lookup(&interfaces, EndpointConfig::new(host.address, 0)) else {
                continue;
            };
            tracing::debug!(
                address = host.address,
                name = host.name.as_deref().unwrap_or(""),
                "building host"
            );
            nodes.insert(host.address, Box::new(Host::new(host.address, iface, wire)));
        }

        for spec in &config.routers {
            let ifaces = interfaces.remove(&spec.address).unwrap_or_default();
            let mut router = Router::new(spec.address, ifaces, wire);
            if let Some(name) = &spec.name {
                router = router.with_name(name.clone());
            }

            for index in 0..spec.interface_costs.len() {
                let end = EndpointConfig::new(spec.address, index);
                if !config.links.iter().any(|link| link.a == end || link.b == end) {
                    router.unlink(index);
                }
            }

            // Directly attached hosts are reachable before any advertisement
            for link in &config.links {
                for (near, far) in [(link.a, link.b), (link.b, link.a)] {
                    if near.node == spec.address && config.find_host(far.node).is_some() {
                        router.attach_host(far.node, near.interface);
                    }
                }
            }

            tracing::debug!(
                address = spec.address,
                name = router.name(),
                interfaces = spec.interface_costs.len(),
                "building router"
            );
            nodes.insert(spec.address, Box::new(router));
        }

        tracing::info!(
            nodes = nodes.len(),
            links = links.len(),
            "topology built"
        );
        Ok(Self { nodes, links })
    }

    /// Returns the nodes.
    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    /// Returns the link layer.
    pub fn links(&self) -> &LinkLayer {
        &self.links
    }

    /// Splits the topology into its nodes and link layer.
    pub fn into_parts(self) -> (NodeMap, LinkLayer) {
        (self.nodes, self.links)
    }
}

fn lookup(
    interfaces: &BTreeMap<NodeAddress, Vec<Arc<Interface>>>,
    end: EndpointConfig,
) -> Option<Arc<Interface>> {
    interfaces.get(&end.node)?.get(end.interface).cloned()
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("links", &self.links.len())
            .finish()
    }
}

//! Routing state and the distance-vector relaxation step.
//!
//! A router keeps one [`Route`] per known destination in its
//! [`RoutingTable`] and derives a [`ForwardingTable`] from it. Neighbors
//! exchange [`DistanceVector`]s; each received vector is folded into the
//! table with a Bellman-Ford relaxation:
//!
//! ```text
//! candidate = advertised[d] + cost(arrival interface)
//! if d is unknown or candidate < current[d]: route d via the arrival interface
//! ```
//!
//! Ties keep the existing route. Costs therefore only ever decrease, and a
//! vector that carries no improvement leaves the table untouched.
//!
//! # Example
//!
//! ```
//! use dvnet::routing::{DistanceVector, RoutingTable};
//!
//! let mut table = RoutingTable::for_node(2);
//! let heard: DistanceVector = [(1, 0), (5, 3)].into_iter().collect();
//!
//! // Interface 0 has cost 1
//! let changed = table.relax(0, 1, &heard);
//! assert_eq!(changed, vec![1, 5]);
//! assert_eq!(table.get(5).unwrap().cost, 4);
//!
//! // Hearing the same vector again is a no-op
//! assert!(table.relax(0, 1, &heard).is_empty());
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::packet::CodecError;
use crate::types::{Cost, InterfaceIndex, NodeAddress};

/// A mapping from destination to cost, as advertised to neighbors.
///
/// On the wire it is a compact JSON object keyed by decimal address, for
/// example `{"1":2,"3":0}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceVector(BTreeMap<NodeAddress, Cost>);

impl DistanceVector {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cost to a destination.
    pub fn insert(&mut self, destination: NodeAddress, cost: Cost) {
        self.0.insert(destination, cost);
    }

    /// Returns the advertised cost to a destination.
    pub fn get(&self, destination: NodeAddress) -> Option<Cost> {
        self.0.get(&destination).copied()
    }

    /// Iterates over `(destination, cost)` pairs in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeAddress, Cost)> + '_ {
        self.0.iter().map(|(&d, &c)| (d, c))
    }

    /// Returns the number of destinations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the vector advertises nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encodes the vector as a control packet payload.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::InvalidVector(e.to_string()))
    }

    /// Decodes a control packet payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::InvalidVector(e.to_string()))
    }
}

impl FromIterator<(NodeAddress, Cost)> for DistanceVector {
    fn from_iter<I: IntoIterator<Item = (NodeAddress, Cost)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Best known way to reach one destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Interface to send traffic for this destination out of
    pub next_hop: InterfaceIndex,
    /// Total path cost
    pub cost: Cost,
}

/// Per-destination best routes of one router.
///
/// Rows are only ever added or lowered; nothing is removed during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoutingTable {
    owner: NodeAddress,
    routes: BTreeMap<NodeAddress, Route>,
}

impl RoutingTable {
    /// Creates an empty table for the router at `owner`.
    ///
    /// The owner is never stored as a destination; it is advertised at
    /// cost 0 by [`RoutingTable::vector`].
    pub fn for_node(owner: NodeAddress) -> Self {
        Self {
            owner,
            routes: BTreeMap::new(),
        }
    }

    /// Returns the address of the router owning this table.
    pub fn owner(&self) -> NodeAddress {
        self.owner
    }

    /// Returns the route to a destination.
    pub fn get(&self, destination: NodeAddress) -> Option<&Route> {
        self.routes.get(&destination)
    }

    /// Iterates over routes in ascending destination order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeAddress, &Route)> + '_ {
        self.routes.iter().map(|(&d, r)| (d, r))
    }

    /// Returns the number of known destinations.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no destination is known.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Offers a route, keeping it only if it is strictly cheaper than the
    /// current one. Returns true if the table changed.
    pub fn offer(&mut self, destination: NodeAddress, route: Route) -> bool {
        if destination == self.owner {
            return false;
        }
        match self.routes.get(&destination) {
            Some(current) if route.cost >= current.cost => false,
            _ => {
                self.routes.insert(destination, route);
                true
            }
        }
    }

    /// Folds a neighbor's vector heard on `interface` into the table.
    ///
    /// Returns the destinations whose route changed, in ascending order.
    pub fn relax(
        &mut self,
        interface: InterfaceIndex,
        local_cost: Cost,
        advertised: &DistanceVector,
    ) -> Vec<NodeAddress> {
        let mut changed = Vec::new();
        for (destination, cost) in advertised.iter() {
            let route = Route {
                next_hop: interface,
                cost: cost.saturating_add(local_cost),
            };
            if self.offer(destination, route) {
                changed.push(destination);
            }
        }
        changed
    }

    /// Returns the vector this router advertises: itself at cost 0 plus
    /// every known destination.
    pub fn vector(&self) -> DistanceVector {
        std::iter::once((self.owner, 0))
            .chain(self.routes.iter().map(|(&d, r)| (d, r.cost)))
            .collect()
    }

    /// Renders the table as an interface-by-destination grid.
    ///
    /// Each row is an interface, each column a destination; a cell holds
    /// the route cost if that interface is the chosen next hop, `-`
    /// otherwise.
    pub fn render(&self, interface_count: usize) -> String {
        let destinations: Vec<NodeAddress> = self.routes.keys().copied().collect();
        let width = self
            .routes
            .iter()
            .flat_map(|(d, r)| [d.to_string().len(), r.cost.to_string().len()])
            .max()
            .unwrap_or(1);

        let mut out = String::new();
        let _ = writeln!(out, "Router {} routing table", self.owner);
        let _ = write!(out, "iface |");
        for d in &destinations {
            let _ = write!(out, " {:>width$}", d);
        }
        out.push('\n');
        let _ = writeln!(out, "------+{}", "-".repeat(destinations.len() * (width + 1)));

        for interface in 0..interface_count {
            let _ = write!(out, "{:>5} |", interface);
            for d in &destinations {
                match self.routes.get(d) {
                    Some(route) if route.next_hop == interface => {
                        let _ = write!(out, " {:>width$}", route.cost);
                    }
                    _ => {
                        let _ = write!(out, " {:>width$}", "-");
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Destination to outgoing interface, derived from a [`RoutingTable`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ForwardingTable {
    entries: BTreeMap<NodeAddress, InterfaceIndex>,
}

impl ForwardingTable {
    /// Derives the forwarding table from the current routes.
    pub fn from_routes(table: &RoutingTable) -> Self {
        Self {
            entries: table.iter().map(|(d, r)| (d, r.next_hop)).collect(),
        }
    }

    /// Looks up the outgoing interface for a destination.
    pub fn lookup(&self, destination: NodeAddress) -> Option<InterfaceIndex> {
        self.entries.get(&destination).copied()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(pairs: &[(NodeAddress, Cost)]) -> DistanceVector {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_vector_encoding() {
        let v = vector(&[(3, 0), (1, 2)]);
        let bytes = v.encode().unwrap();
        assert_eq!(&bytes[..], br#"{"1":2,"3":0}"#);
        assert_eq!(DistanceVector::decode(&bytes).unwrap(), v);
    }

    #[test]
    fn test_vector_decode_garbage() {
        assert!(matches!(
            DistanceVector::decode(b"1---"),
            Err(CodecError::InvalidVector(_))
        ));
        assert!(DistanceVector::decode(br#"{"1":-4}"#).is_err());
    }

    #[test]
    fn test_relax_learns_unknown() {
        let mut table = RoutingTable::for_node(10);
        let changed = table.relax(1, 3, &vector(&[(20, 0), (1, 1)]));

        assert_eq!(changed, vec![1, 20]);
        assert_eq!(table.get(20), Some(&Route { next_hop: 1, cost: 3 }));
        assert_eq!(table.get(1), Some(&Route { next_hop: 1, cost: 4 }));
    }

    #[test]
    fn test_relax_keeps_cheaper_and_ties() {
        let mut table = RoutingTable::for_node(10);
        table.relax(0, 1, &vector(&[(5, 2)]));

        // Equal cost through another interface: keep the existing route
        assert!(table.relax(1, 2, &vector(&[(5, 1)])).is_empty());
        assert_eq!(table.get(5).unwrap().next_hop, 0);

        // More expensive: ignored
        assert!(table.relax(1, 2, &vector(&[(5, 7)])).is_empty());
        assert_eq!(table.get(5).unwrap().cost, 3);

        // Cheaper: switch
        assert_eq!(table.relax(1, 1, &vector(&[(5, 0)])), vec![5]);
        assert_eq!(table.get(5), Some(&Route { next_hop: 1, cost: 1 }));
    }

    #[test]
    fn test_relax_ignores_owner() {
        let mut table = RoutingTable::for_node(10);
        assert!(table.relax(0, 1, &vector(&[(10, 1)])).is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_relax_saturates() {
        let mut table = RoutingTable::for_node(10);
        table.relax(0, 5, &vector(&[(1, Cost::MAX)]));
        assert_eq!(table.get(1).unwrap().cost, Cost::MAX);
    }

    #[test]
    fn test_vector_includes_owner() {
        let mut table = RoutingTable::for_node(10);
        table.offer(1, Route { next_hop: 0, cost: 2 });
        assert_eq!(table.vector(), vector(&[(1, 2), (10, 0)]));
    }

    #[test]
    fn test_forwarding_table() {
        let mut table = RoutingTable::for_node(10);
        table.offer(1, Route { next_hop: 0, cost: 2 });
        table.offer(3, Route { next_hop: 2, cost: 1 });

        let fwd = ForwardingTable::from_routes(&table);
        assert_eq!(fwd.len(), 2);
        assert_eq!(fwd.lookup(1), Some(0));
        assert_eq!(fwd.lookup(3), Some(2));
        assert_eq!(fwd.lookup(4), None);
    }

    #[test]
    fn test_render() {
        let mut table = RoutingTable::for_node(2);
        table.offer(1, Route { next_hop: 0, cost: 1 });
        table.offer(3, Route { next_hop: 1, cost: 2 });

        let expected = "\
Router 2 routing table
iface | 1 3
------+----
    0 | 1 -
    1 | - 2
";
        assert_eq!(table.render(2), expected);
    }
}

//! Routers: packet dispatch and distance-vector routing.
//!
//! On every activation a router scans its interfaces in ascending index
//! order and pops at most one packet from each:
//!
//! - **Data** is looked up in the forwarding table and queued on the
//!   resolved interface, waiting for space if needed.
//! - **Control** carries a neighbor's [`DistanceVector`], which is relaxed
//!   into the routing table.
//!
//! Routing changes collected during the scan are advertised once at the
//! end, on every linked interface except those the changes were learned
//! from (split horizon). A scan that learns nothing new sends nothing,
//! which is what makes the protocol settle.
//!
//! Advertisements wait for queue space under [`WaitMode::Park`], like
//! forwarded data. Under [`WaitMode::Yield`] they are dropped on a full
//! queue, since the same thread has to drain it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::interface::{Block, Interface};
use crate::node::{Activation, DispatchError, Node, NodeCore, NodeKind, WaitMode};
use crate::packet::{Packet, PacketKind, WireFormat};
use crate::routing::{DistanceVector, ForwardingTable, Route, RoutingTable};
use crate::types::{InterfaceIndex, NodeAddress};

/// A data packet waiting for room on its outgoing interface.
#[derive(Debug)]
struct Stalled {
    out: InterfaceIndex,
    packet: Packet,
}

enum Dispatched {
    Forwarded,
    Stalled(Stalled),
    Updated { changed: bool },
}

/// A multi-interface router.
pub struct Router {
    core: NodeCore,
    name: String,
    routes: RoutingTable,
    forwarding: ForwardingTable,
    linked: Vec<bool>,
    stalled: Option<Stalled>,
}

impl Router {
    /// Creates a router owning `interfaces`.
    ///
    /// Every interface counts as linked until [`Router::unlink`] says
    /// otherwise.
    pub fn new(address: NodeAddress, interfaces: Vec<Arc<Interface>>, wire: WireFormat) -> Self {
        let linked = vec![true; interfaces.len()];
        Self {
            core: NodeCore::new(address, interfaces, wire),
            name: address.to_string(),
            routes: RoutingTable::for_node(address),
            forwarding: ForwardingTable::default(),
            linked,
            stalled: None,
        }
    }

    /// Sets a friendly name used in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the router's friendly name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks `interface` as having no link, so nothing is advertised on it.
    pub fn unlink(&mut self, interface: InterfaceIndex) {
        if let Some(linked) = self.linked.get_mut(interface) {
            *linked = false;
        }
    }

    /// Returns true if a link drains `interface`.
    pub fn is_linked(&self, interface: InterfaceIndex) -> bool {
        self.linked.get(interface).copied().unwrap_or(false)
    }

    /// Records that `host` sits directly behind `interface`.
    ///
    /// The route costs the interface's link cost. Returns true if the
    /// routing table changed.
    pub fn attach_host(&mut self, host: NodeAddress, interface: InterfaceIndex) -> bool {
        let Some(iface) = self.core.interfaces.get(interface) else {
            return false;
        };
        let route = Route {
            next_hop: interface,
            cost: iface.cost(),
        };
        let changed = self.routes.offer(host, route);
        if changed {
            self.forwarding = ForwardingTable::from_routes(&self.routes);
        }
        changed
    }

    /// Returns the routing table.
    pub fn routing_table(&self) -> &RoutingTable {
        &self.routes
    }

    /// Returns the forwarding table.
    pub fn forwarding_table(&self) -> &ForwardingTable {
        &self.forwarding
    }

    /// Renders the routing table as an interface-by-destination grid.
    pub fn render_routes(&self) -> String {
        self.routes.render(self.core.interfaces.len())
    }

    /// Sends the current vector on every linked interface, without waiting.
    pub fn advertise(&mut self) {
        let targets: Vec<InterfaceIndex> = (0..self.core.interfaces.len())
            .filter(|&target| self.is_linked(target))
            .collect();
        self.send_vector(&targets, Block::No);
    }

    fn dispatch(
        &mut self,
        arrival: InterfaceIndex,
        bytes: &[u8],
        wait: WaitMode<'_>,
    ) -> Result<Dispatched, DispatchError> {
        let packet = self.core.wire.decode(bytes)?;
        match packet.kind {
            PacketKind::Data => self.forward(packet, arrival, wait),
            PacketKind::Control => {
                let changed = self.update_routes(&packet, arrival)?;
                Ok(Dispatched::Updated { changed })
            }
        }
    }

    fn forward(
        &mut self,
        packet: Packet,
        arrival: InterfaceIndex,
        wait: WaitMode<'_>,
    ) -> Result<Dispatched, DispatchError> {
        let destination = packet.destination;
        let out = self
            .forwarding
            .lookup(destination)
            .ok_or(DispatchError::NoRoute { destination })?;
        if out == arrival {
            return Err(DispatchError::RoutingLoop {
                destination,
                interface: arrival,
            });
        }

        let bytes = self.core.wire.encode(&packet);
        let iface = &self.core.interfaces[out];
        match wait {
            WaitMode::Park(stop) => iface.enqueue_outbound(bytes, Block::Until(stop))?,
            WaitMode::Yield => {
                if iface.enqueue_outbound(bytes, Block::No).is_err() {
                    tracing::debug!(router = %self.name, interface = out, "outbound queue full, holding packet");
                    return Ok(Dispatched::Stalled(Stalled { out, packet }));
                }
            }
        }

        self.core.stats.packets_forwarded += 1;
        tracing::info!(
            router = %self.name,
            from = arrival,
            to = out,
            "forwarding packet {}",
            packet
        );
        Ok(Dispatched::Forwarded)
    }

    fn update_routes(
        &mut self,
        packet: &Packet,
        arrival: InterfaceIndex,
    ) -> Result<bool, DispatchError> {
        let vector = DistanceVector::decode(&packet.payload)?;
        self.core.stats.updates_received += 1;
        tracing::debug!(
            router = %self.name,
            interface = arrival,
            neighbor = packet.source,
            "received routing update {:?}",
            vector
        );

        let local_cost = self.core.interfaces[arrival].cost();
        let changed = self.routes.relax(arrival, local_cost, &vector);
        if changed.is_empty() {
            return Ok(false);
        }

        self.core.stats.route_changes += changed.len() as u64;
        self.forwarding = ForwardingTable::from_routes(&self.routes);
        for destination in changed {
            if let Some(route) = self.routes.get(destination) {
                tracing::info!(
                    router = %self.name,
                    destination,
                    interface = route.next_hop,
                    cost = route.cost,
                    "route updated"
                );
            }
        }
        Ok(true)
    }

    /// Retries a held packet. Returns it back if there is still no room.
    fn retry(&mut self, stalled: Stalled) -> Option<Stalled> {
        let bytes = self.core.wire.encode(&stalled.packet);
        if self.core.interfaces[stalled.out]
            .enqueue_outbound(bytes, Block::No)
            .is_err()
        {
            return Some(stalled);
        }
        self.core.stats.packets_forwarded += 1;
        tracing::info!(
            router = %self.name,
            to = stalled.out,
            "forwarding held packet {}",
            stalled.packet
        );
        None
    }

    /// Advertises to every linked interface that did not supply all of the
    /// changes.
    fn propagate(&mut self, sources: &BTreeSet<InterfaceIndex>, wait: WaitMode<'_>) {
        if sources.is_empty() {
            return;
        }
        let targets: Vec<InterfaceIndex> = (0..self.core.interfaces.len())
            .filter(|&target| self.is_linked(target))
            .filter(|target| sources.iter().any(|source| source != target))
            .collect();
        let block = match wait {
            WaitMode::Park(stop) => Block::Until(stop),
            WaitMode::Yield => Block::No,
        };
        self.send_vector(&targets, block);
    }

    fn send_vector(&mut self, targets: &[InterfaceIndex], block: Block<'_>) {
        let vector = self.routes.vector();
        let payload = match vector.encode() {
            Ok(payload) => payload,
            Err(err) => {
                self.report(None, err.into());
                return;
            }
        };
        let bytes = self
            .core
            .wire
            .encode(&Packet::control(self.core.address, payload));

        for &target in targets {
            match self.core.interfaces[target].enqueue_outbound(bytes.clone(), block) {
                Ok(()) => {
                    self.core.stats.updates_sent += 1;
                    tracing::debug!(
                        router = %self.name,
                        interface = target,
                        "sending routing update {:?}",
                        vector
                    );
                }
                Err(err) => self.report(Some(target), err.into()),
            }
        }
    }

    fn report(&mut self, interface: Option<InterfaceIndex>, err: DispatchError) {
        self.core.stats.record_drop(&err);
        match err {
            DispatchError::UnknownProtocol(_) | DispatchError::RoutingLoop { .. } => {
                tracing::error!(router = %self.name, ?interface, error = %err, "dropping packet");
            }
            _ => {
                tracing::warn!(router = %self.name, ?interface, error = %err, "dropping packet");
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("address", &self.core.address)
            .field("name", &self.name)
            .field("routes", &self.routes.len())
            .field("linked", &self.linked)
            .field("stalled", &self.stalled.is_some())
            .finish()
    }
}

impl Node for Router {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Router
    }

    /// Announces the initial routes to every neighbor.
    fn init(&mut self) {
        self.advertise();
    }

    fn activate(&mut self, wait: WaitMode<'_>) -> Activation {
        let mut activation = Activation::default();

        // A held packet blocks all new input until it is sent
        if let Some(stalled) = self.stalled.take() {
            activation.processed += 1;
            if let Some(stalled) = self.retry(stalled) {
                self.stalled = Some(stalled);
                activation.stalled = true;
                return activation;
            }
        }

        let mut sources = BTreeSet::new();
        for arrival in 0..self.core.interfaces.len() {
            let Some(bytes) = self.core.interfaces[arrival].try_receive() else {
                continue;
            };
            activation.processed += 1;

            match self.dispatch(arrival, &bytes, wait) {
                Ok(Dispatched::Forwarded) | Ok(Dispatched::Updated { changed: false }) => {}
                Ok(Dispatched::Updated { changed: true }) => {
                    sources.insert(arrival);
                }
                Ok(Dispatched::Stalled(stalled)) => {
                    self.stalled = Some(stalled);
                    activation.stalled = true;
                    break;
                }
                Err(err) => self.report(Some(arrival), err),
            }
        }

        self.propagate(&sources, wait);
        activation
    }

    fn as_router(&self) -> Option<&Router> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::StopSignal;
    use std::thread;

    fn router(costs: &[u64], capacity: usize) -> Router {
        let interfaces = costs
            .iter()
            .map(|&c| Interface::new(c, capacity).shared())
            .collect();
        Router::new(2, interfaces, WireFormat::default())
    }

    fn deliver(router: &Router, interface: InterfaceIndex, packet: &Packet) {
        let bytes = WireFormat::default().encode(packet);
        router.interfaces()[interface].deliver_inbound(bytes).unwrap();
    }

    fn advert(source: NodeAddress, pairs: &[(NodeAddress, u64)]) -> Packet {
        let vector: DistanceVector = pairs.iter().copied().collect();
        Packet::control(source, vector.encode().unwrap())
    }

    fn sent(router: &Router, interface: InterfaceIndex) -> Vec<Packet> {
        let wire = WireFormat::default();
        router.interfaces()[interface]
            .take_outbound()
            .iter()
            .map(|b| wire.decode(b).unwrap())
            .collect()
    }

    #[test]
    fn test_init_advertises_everywhere() {
        let mut router = router(&[1, 1, 1], 0);
        router.attach_host(1, 0);
        router.init();

        for interface in 0..3 {
            let packets = sent(&router, interface);
            assert_eq!(packets.len(), 1);
            assert_eq!(packets[0].kind, PacketKind::Control);
            let vector = DistanceVector::decode(&packets[0].payload).unwrap();
            assert_eq!(vector.get(2), Some(0));
            assert_eq!(vector.get(1), Some(1));
        }
        assert_eq!(router.stats().updates_sent, 3);
    }

    #[test]
    fn test_forward_data() {
        let mut router = router(&[1, 1], 0);
        router.attach_host(3, 1);
        deliver(&router, 0, &Packet::data(3, 1, "hello"));

        let activation = router.activate(WaitMode::Yield);
        assert_eq!(activation.processed, 1);

        let out = sent(&router, 1);
        assert_eq!(out, vec![Packet::data(3, 1, "hello")]);
        assert_eq!(router.stats().packets_forwarded, 1);
    }

    #[test]
    fn test_no_route() {
        let mut router = router(&[1, 1], 0);
        deliver(&router, 0, &Packet::data(9, 1, "lost"));

        router.activate(WaitMode::Yield);
        assert_eq!(router.stats().dropped_no_route, 1);
        assert!(sent(&router, 1).is_empty());
    }

    #[test]
    fn test_routing_loop() {
        let mut router = router(&[1, 1], 0);
        router.attach_host(3, 0);
        deliver(&router, 0, &Packet::data(3, 1, "back"));

        router.activate(WaitMode::Yield);
        assert_eq!(router.stats().dropped_routing_loop, 1);
        assert!(sent(&router, 0).is_empty());
    }

    #[test]
    fn test_malformed_and_unknown_protocol() {
        let mut router = router(&[1, 1], 0);
        router.interfaces()[0].deliver_inbound(b"0000".to_vec()).unwrap();
        router.interfaces()[1]
            .deliver_inbound(b"00003700001x".to_vec())
            .unwrap();

        let activation = router.activate(WaitMode::Yield);
        assert_eq!(activation.processed, 2);
        assert_eq!(router.stats().dropped_malformed, 1);
        assert_eq!(router.stats().dropped_unknown_protocol, 1);
    }

    #[test]
    fn test_bad_vector_is_malformed() {
        let mut router = router(&[1, 1], 0);
        deliver(&router, 0, &Packet::control(4, "1---"));
        router.activate(WaitMode::Yield);
        assert_eq!(router.stats().dropped_malformed, 1);
        assert!(router.routing_table().is_empty());
    }

    #[test]
    fn test_update_relaxes_and_propagates_with_split_horizon() {
        let mut router = router(&[1, 2, 5], 0);
        deliver(&router, 1, &advert(4, &[(4, 0), (3, 1)]));

        router.activate(WaitMode::Yield);

        let table = router.routing_table();
        assert_eq!(table.get(4), Some(&Route { next_hop: 1, cost: 2 }));
        assert_eq!(table.get(3), Some(&Route { next_hop: 1, cost: 3 }));
        assert_eq!(router.forwarding_table().lookup(3), Some(1));

        assert!(sent(&router, 1).is_empty());
        for interface in [0, 2] {
            let packets = sent(&router, interface);
            assert_eq!(packets.len(), 1);
            let vector = DistanceVector::decode(&packets[0].payload).unwrap();
            assert_eq!(vector.get(3), Some(3));
        }
    }

    #[test]
    fn test_stale_update_is_silent() {
        let mut router = router(&[1, 1], 0);
        deliver(&router, 0, &advert(4, &[(4, 0)]));
        router.activate(WaitMode::Yield);
        sent(&router, 1);

        deliver(&router, 0, &advert(4, &[(4, 0)]));
        router.activate(WaitMode::Yield);
        assert!(sent(&router, 0).is_empty());
        assert!(sent(&router, 1).is_empty());
        assert_eq!(router.stats().updates_received, 2);
        assert_eq!(router.stats().route_changes, 1);
    }

    #[test]
    fn test_coalesced_propagation() {
        let mut router = router(&[1, 1, 1], 0);
        deliver(&router, 0, &advert(4, &[(4, 0)]));
        deliver(&router, 1, &advert(5, &[(5, 0)]));

        router.activate(WaitMode::Yield);

        // Each interface gets one advertisement even though two changes arrived
        for interface in 0..3 {
            assert_eq!(sent(&router, interface).len(), 1);
        }
    }

    #[test]
    fn test_yield_holds_packet_until_room() {
        let mut router = router(&[1, 1], 1);
        router.attach_host(3, 1);
        router.interfaces()[1]
            .enqueue_outbound(b"occupied".to_vec(), Block::No)
            .unwrap();

        deliver(&router, 0, &Packet::data(3, 1, "held"));
        let activation = router.activate(WaitMode::Yield);
        assert!(activation.stalled);

        // Still full: the packet stays held and no new input is read
        deliver(&router, 0, &Packet::data(3, 1, "next"));
        assert!(router.activate(WaitMode::Yield).stalled);
        assert_eq!(router.interfaces()[0].inbound_len(), 1);

        // Room frees up: the held packet goes out and the next one waits behind it
        assert_eq!(router.interfaces()[1].take_outbound().len(), 1);
        assert!(router.activate(WaitMode::Yield).stalled);
        assert_eq!(sent(&router, 1), vec![Packet::data(3, 1, "held")]);
        assert_eq!(router.stats().packets_forwarded, 1);

        let activation = router.activate(WaitMode::Yield);
        assert!(!activation.stalled);
        assert_eq!(sent(&router, 1), vec![Packet::data(3, 1, "next")]);
        assert_eq!(router.stats().packets_forwarded, 2);
    }

    #[test]
    fn test_park_cancelled_by_stop() {
        let mut router = router(&[1, 1], 1);
        router.attach_host(3, 1);
        router.interfaces()[1]
            .enqueue_outbound(b"occupied".to_vec(), Block::No)
            .unwrap();
        deliver(&router, 0, &Packet::data(3, 1, "blocked"));

        let stop = StopSignal::new();
        stop.raise();
        router.activate(WaitMode::Park(&stop));
        assert_eq!(router.stats().dropped_cancelled, 1);
    }

    #[test]
    fn test_unlinked_interfaces_stay_silent() {
        let mut router = router(&[1, 1, 1], 0);
        router.unlink(2);
        assert!(!router.is_linked(2));

        router.init();
        deliver(&router, 0, &advert(4, &[(4, 0)]));
        router.activate(WaitMode::Yield);

        assert_eq!(router.interfaces()[2].outbound_len(), 0);
        assert_eq!(sent(&router, 1).len(), 2);
        assert_eq!(router.stats().updates_sent, 3);
    }

    #[test]
    fn test_yield_drops_update_on_full_queue() {
        let mut router = router(&[1, 1], 1);
        router.interfaces()[1]
            .enqueue_outbound(b"occupied".to_vec(), Block::No)
            .unwrap();
        deliver(&router, 0, &advert(4, &[(4, 0)]));

        router.activate(WaitMode::Yield);
        assert_eq!(router.stats().dropped_queue_full, 1);
        assert_eq!(router.stats().updates_sent, 0);
    }

    #[test]
    fn test_park_waits_to_send_update() {
        let mut router = router(&[1, 1], 1);
        let toward = Arc::clone(&router.interfaces()[1]);
        toward.enqueue_outbound(b"occupied".to_vec(), Block::No).unwrap();
        deliver(&router, 0, &advert(4, &[(4, 0)]));

        let stop = StopSignal::new();
        let drained = thread::scope(|s| {
            let worker = s.spawn(|| router.activate(WaitMode::Park(&stop)));
            let mut drained = Vec::new();
            while drained.len() < 2 {
                drained.extend(toward.take_outbound());
                thread::yield_now();
            }
            worker.join().unwrap();
            drained
        });

        assert_eq!(drained[0], b"occupied".to_vec());
        let update = WireFormat::default().decode(&drained[1]).unwrap();
        assert_eq!(update.kind, PacketKind::Control);
        assert_eq!(router.stats().updates_sent, 1);
        assert_eq!(router.stats().dropped_queue_full, 0);
    }

    #[test]
    fn test_render_routes() {
        let mut router = router(&[1, 3], 0);
        router.attach_host(1, 0);
        let grid = router.render_routes();
        assert!(grid.contains("Router 2 routing table"));
        assert!(grid.contains("    0 | 1"));
        assert!(grid.contains("    1 | -"));
    }
}

//! Links and the link layer.
//!
//! A [`Link`] joins two interfaces on two nodes. It owns no queues of its
//! own: the [`LinkLayer`] moves entries from each endpoint's outbound queue
//! to the peer's inbound queue, once per pass, in both directions. It never
//! looks inside the packets it moves.
//!
//! Entries that meet a full peer queue are dropped, which makes every link
//! lossy under load.

use std::ops::AddAssign;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::interface::{Interface, StopSignal};
use crate::types::{InterfaceIndex, NodeAddress};

/// Pause between link-layer passes that moved nothing.
const IDLE_BACKOFF: Duration = Duration::from_micros(200);

/// One side of a link: an interface on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// Address of the node owning the interface
    pub node: NodeAddress,
    /// Index of the interface on that node
    pub interface: InterfaceIndex,
}

impl Endpoint {
    /// Creates a new endpoint.
    pub fn new(node: NodeAddress, interface: InterfaceIndex) -> Self {
        Self { node, interface }
    }
}

/// An undirected link between two endpoints.
///
/// The endpoints are stored in ascending order, so `Link::new(x, y)` and
/// `Link::new(y, x)` compare equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Link {
    a: Endpoint,
    b: Endpoint,
}

impl Link {
    /// Creates a link between two endpoints.
    pub fn new(x: Endpoint, y: Endpoint) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    /// Returns both endpoints, lowest first.
    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        (self.a, self.b)
    }

    /// Returns the endpoint on the other side of `end`, if `end` is on this link.
    pub fn peer_of(&self, end: Endpoint) -> Option<Endpoint> {
        if end == self.a {
            Some(self.b)
        } else if end == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Outcome of one or more link-layer passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Entries delivered to a peer inbound queue
    pub moved: usize,
    /// Entries dropped because the peer inbound queue was full
    pub dropped: usize,
}

impl TransferReport {
    /// Returns true if nothing crossed any wire.
    pub fn is_idle(&self) -> bool {
        self.moved == 0 && self.dropped == 0
    }
}

impl AddAssign for TransferReport {
    fn add_assign(&mut self, other: Self) {
        self.moved += other.moved;
        self.dropped += other.dropped;
    }
}

#[derive(Debug)]
struct Wire {
    link: Link,
    a: Arc<Interface>,
    b: Arc<Interface>,
}

/// Owns every link of a topology and moves packets across them.
#[derive(Debug, Default)]
pub struct LinkLayer {
    wires: Vec<Wire>,
}

impl LinkLayer {
    /// Creates an empty link layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins two interfaces with a link.
    pub fn connect(
        &mut self,
        x: Endpoint,
        x_iface: Arc<Interface>,
        y: Endpoint,
        y_iface: Arc<Interface>,
    ) -> Link {
        let link = Link::new(x, y);
        let (a, b) = if link.a == x {
            (x_iface, y_iface)
        } else {
            (y_iface, x_iface)
        };
        self.wires.push(Wire { link, a, b });
        link
    }

    /// Returns the links in the order they were added.
    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.wires.iter().map(|w| &w.link)
    }

    /// Returns the number of links.
    pub fn len(&self) -> usize {
        self.wires.len()
    }

    /// Returns true if there are no links.
    pub fn is_empty(&self) -> bool {
        self.wires.is_empty()
    }

    /// Moves every pending outbound entry across its link, both directions.
    pub fn transfer(&self) -> TransferReport {
        let mut report = TransferReport::default();
        for wire in &self.wires {
            let (a, b) = wire.link.endpoints();
            report += cross(a, &wire.a, b, &wire.b);
            report += cross(b, &wire.b, a, &wire.a);
        }
        report
    }

    /// Runs transfer passes until `stop` is raised. Returns the totals.
    pub fn run(&self, stop: &StopSignal) -> TransferReport {
        let mut total = TransferReport::default();
        while !stop.is_raised() {
            let pass = self.transfer();
            if pass.is_idle() {
                thread::sleep(IDLE_BACKOFF);
            }
            total += pass;
        }
        total
    }
}

fn cross(from: Endpoint, src: &Interface, to: Endpoint, dst: &Interface) -> TransferReport {
    let mut report = TransferReport::default();
    for entry in src.take_outbound() {
        match dst.deliver_inbound(entry) {
            Ok(()) => report.moved += 1,
            Err(err) => {
                report.dropped += 1;
                tracing::debug!(
                    from = ?from,
                    to = ?to,
                    "packet lost on link: {}",
                    err
                );
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::Block;

    fn pair(capacity: usize) -> (LinkLayer, Arc<Interface>, Arc<Interface>) {
        let x = Interface::new(1, capacity).shared();
        let y = Interface::new(1, capacity).shared();
        let mut layer = LinkLayer::new();
        layer.connect(
            Endpoint::new(2, 0),
            Arc::clone(&x),
            Endpoint::new(1, 0),
            Arc::clone(&y),
        );
        (layer, x, y)
    }

    #[test]
    fn test_link_is_unordered() {
        let x = Endpoint::new(1, 0);
        let y = Endpoint::new(2, 1);
        assert_eq!(Link::new(x, y), Link::new(y, x));
        assert_eq!(Link::new(y, x).endpoints(), (x, y));
    }

    #[test]
    fn test_peer_of() {
        let x = Endpoint::new(1, 0);
        let y = Endpoint::new(2, 1);
        let link = Link::new(x, y);
        assert_eq!(link.peer_of(x), Some(y));
        assert_eq!(link.peer_of(y), Some(x));
        assert_eq!(link.peer_of(Endpoint::new(3, 0)), None);
    }

    #[test]
    fn test_transfer_both_directions() {
        let (layer, x, y) = pair(0);
        x.enqueue_outbound(b"x1".to_vec(), Block::No).unwrap();
        x.enqueue_outbound(b"x2".to_vec(), Block::No).unwrap();
        y.enqueue_outbound(b"y1".to_vec(), Block::No).unwrap();

        let report = layer.transfer();
        assert_eq!(report, TransferReport { moved: 3, dropped: 0 });

        assert_eq!(y.try_receive().as_deref(), Some(&b"x1"[..]));
        assert_eq!(y.try_receive().as_deref(), Some(&b"x2"[..]));
        assert_eq!(x.try_receive().as_deref(), Some(&b"y1"[..]));
    }

    #[test]
    fn test_transfer_drops_on_full_peer() {
        let (layer, x, y) = pair(1);
        y.deliver_inbound(b"waiting".to_vec()).unwrap();
        x.enqueue_outbound(b"lost".to_vec(), Block::No).unwrap();

        let report = layer.transfer();
        assert_eq!(report, TransferReport { moved: 0, dropped: 1 });
        assert_eq!(x.outbound_len(), 0);
        assert_eq!(y.try_receive().as_deref(), Some(&b"waiting"[..]));
    }

    #[test]
    fn test_idle_transfer() {
        let (layer, _, _) = pair(0);
        assert!(layer.transfer().is_idle());
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_run_stops() {
        let (layer, x, y) = pair(0);
        x.enqueue_outbound(b"x".to_vec(), Block::No).unwrap();
        let stop = StopSignal::new();

        let total = thread::scope(|s| {
            let handle = s.spawn(|| layer.run(&stop));
            while y.inbound_len() == 0 {
                thread::yield_now();
            }
            stop.raise();
            handle.join().unwrap()
        });
        assert_eq!(total.moved, 1);
    }
}

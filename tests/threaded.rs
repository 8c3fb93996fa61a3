//! Tests for the thread-per-node engine.
//!
//! Each test runs real worker threads for a short wall-clock horizon, so
//! assertions only cover outcomes that are certain once the horizon ends.

use std::time::Duration;

use dvnet::config::TopologyBuilder;
use dvnet::{Liveness, Node, ThreadedSimulation};

#[test]
fn test_line_converges_under_threads() {
    let config = TopologyBuilder::new()
        .host(1)
        .host(3)
        .router(10, "A", vec![1, 1])
        .router(11, "B", vec![1, 1])
        .router(12, "D", vec![1, 1])
        .link((1, 0), (10, 0))
        .link((10, 1), (11, 0))
        .link((11, 1), (12, 0))
        .link((12, 1), (3, 0))
        .horizon_ms(300)
        .build()
        .unwrap();

    let run = ThreadedSimulation::build(&config).unwrap().run();

    let a = run.router(10).unwrap();
    assert_eq!(a.forwarding_table().lookup(3), Some(1));
    assert_eq!(a.routing_table().get(3).map(|r| r.cost), Some(3));

    let d = run.router(12).unwrap();
    assert_eq!(d.forwarding_table().lookup(1), Some(0));
    assert_eq!(d.routing_table().get(1).map(|r| r.cost), Some(3));

    assert!(run.nodes.values().all(|n| n.liveness() == Liveness::Stopped));
    assert_eq!(run.stats.engine.node_count, 5);
    assert_eq!(run.stats.engine.packets_lost, 0);
}

#[test]
fn test_bounded_line_converges_under_threads() {
    // On a line every route is learned once, so an interface carries at
    // most one update per router: the bootstrap plus one per change.
    // Queues of that size never overflow, and parked senders lose nothing.
    const ROUTERS: u32 = 6;
    let mut builder = TopologyBuilder::new()
        .queue_capacity(ROUTERS as usize)
        .horizon_ms(500);
    for i in 0..ROUTERS {
        let costs = if i == 0 || i == ROUTERS - 1 { vec![1] } else { vec![1, 1] };
        builder = builder.router(10 + i, format!("R{}", i), costs);
    }
    for i in 0..ROUTERS - 1 {
        let near = if i == 0 { 0 } else { 1 };
        builder = builder.link((10 + i, near), (11 + i, 0));
    }
    let config = builder.build().unwrap();

    let run = ThreadedSimulation::build(&config).unwrap().run();

    for i in 0..ROUTERS {
        let router = run.router(10 + i).unwrap();
        assert!(router.interfaces().iter().all(|iface| iface.capacity() == ROUTERS as usize));
        for j in (0..ROUTERS).filter(|&j| j != i) {
            let route = router
                .routing_table()
                .get(10 + j)
                .unwrap_or_else(|| panic!("R{} has no route to R{}", i, j));
            assert_eq!(route.cost, u64::from(i.abs_diff(j)), "R{} to R{}", i, j);
        }
    }
    assert_eq!(run.stats.engine.packets_lost, 0);
    assert_eq!(run.stats.totals().dropped_queue_full, 0);
}

#[test]
fn test_queued_data_is_delivered() {
    // Both hosts hang off the same router, so the route exists from the start
    let config = TopologyBuilder::new()
        .host(1)
        .host(3)
        .router(10, "A", vec![1, 1])
        .link((1, 0), (10, 0))
        .link((10, 1), (3, 0))
        .build()
        .unwrap();

    let mut sim = ThreadedSimulation::build(&config)
        .unwrap()
        .with_horizon(Duration::from_millis(200));
    sim.host_mut(1).unwrap().send(3, "hello").unwrap();
    sim.host_mut(1).unwrap().send(3, "again").unwrap();

    let run = sim.run();
    let received = run.host(3).unwrap().received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].payload, b"hello");
    assert_eq!(received[1].payload, b"again");
    assert_eq!(run.router(10).unwrap().stats().packets_forwarded, 2);
}

#[test]
fn test_parked_router_is_released_on_stop() {
    // The narrow link toward host 3 makes A park on backpressure during the burst
    let config = TopologyBuilder::new()
        .host(1)
        .host(3)
        .router(10, "A", vec![1, 1])
        .link((1, 0), (10, 0))
        .link_with_capacity((10, 1), (3, 0), 1)
        .build()
        .unwrap();

    let mut sim = ThreadedSimulation::build(&config)
        .unwrap()
        .with_horizon(Duration::from_millis(100));
    for _ in 0..50 {
        sim.host_mut(1).unwrap().send(3, "burst").unwrap();
    }

    // Joining at all shows no worker stayed parked past the stop signal
    let run = sim.run();
    assert!(run.nodes.values().all(|n| n.liveness() == Liveness::Stopped));
    assert!(!run.host(3).unwrap().received().is_empty());
}

//! Runs the A-B-D line topology on both engines.
//!
//! Usage: `cargo run --example line [topology.yaml]`

use std::error::Error;
use std::path::PathBuf;

use dvnet::config::TopologyConfig;
use dvnet::{Simulation, ThreadedSimulation};

fn main() -> Result<(), Box<dyn Error>> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/line.yaml"));

    let config = TopologyConfig::from_file(&path)?;
    dvnet::init_logging(&config.simulation.log_level);

    // Tick-driven: converge, then send one packet end to end
    let mut sim = Simulation::build(&config)?;
    match sim.run_until_quiescent(config.simulation.max_ticks) {
        Some(tick) => println!("Routing converged after {} ticks", tick),
        None => println!("Routing still busy after {} ticks", config.simulation.max_ticks),
    }

    for spec in &config.routers {
        if let Some(router) = sim.router(spec.address) {
            println!("{}", router.render_routes());
        }
    }

    if let Some(host) = sim.host_mut(1) {
        host.send(3, "hello")?;
    }
    sim.run_until_quiescent(config.simulation.max_ticks);
    if let Some(host) = sim.host(3) {
        for packet in host.received() {
            println!("Host 3 received: {}", packet);
        }
    }

    let stats = sim.stats().with_name(path.display().to_string());
    println!("{}", stats.summary());
    println!("{}", stats.nodes_to_csv());

    // Threaded: the same topology with one worker per node
    let run = ThreadedSimulation::build(&config)?.run();
    println!("{}", run.stats.summary());

    Ok(())
}

//! Run a cognitive-radio scenario and print its report
//!
//! Run with: cargo run --example run_scenario -p cogradio-sim [-- path/to/cogradio.yaml]
//!
//! Without an argument the configuration search path is used
//! (`COGRADIO_CONFIG`, `./cogradio.yaml`, user and system config dirs).
//! When nothing is found the built-in example configuration runs instead.

use std::path::PathBuf;

use cogradio_core::config::{CognitiveConfig, ConfigError};
use cogradio_core::observe::init_logging;
use cogradio_sim::Scenario;

fn main() {
    let path = std::env::args().nth(1).map(PathBuf::from);

    let (config, base_dir) = match &path {
        Some(p) => (
            CognitiveConfig::load_from(p).expect("load config"),
            p.parent().map(|d| d.to_path_buf()),
        ),
        None => match CognitiveConfig::load() {
            Ok(config) => (config, None),
            Err(ConfigError::NotFound(_)) => {
                println!("No configuration found, running the built-in example.\n");
                let config = CognitiveConfig::parse(&CognitiveConfig::example_yaml())
                    .expect("example config");
                (config, None)
            }
            Err(e) => panic!("{}", e),
        },
    };

    init_logging(&config.logging);

    let mut scenario =
        Scenario::from_config_in(&config, base_dir.as_deref()).expect("build scenario");
    let report = scenario.run().expect("run scenario");

    println!("{}", report.to_yaml().expect("serialize report"));

    let totals = report.totals();
    println!(
        "{} nodes: {} transmissions, {} handoffs, {} collisions, {} prolonged",
        report.nodes.len(),
        totals.transmissions,
        totals.handoffs,
        totals.collisions,
        totals.prolonged_unavailability
    );
}

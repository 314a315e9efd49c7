//! # AXON Node Binary
//!
//! Field-bus node runtime: owns the broadcast bus shared by motor
//! controllers and sensors, gates actuator commands behind the
//! vehicle-wide arming state, and fans inbound sensor data to the
//! control stack.
//!
//! This binary is a thin adapter around the node runtime library: it
//! translates command-line verbs into calls on the lifecycle and
//! diagnostic interfaces and wires up signal handling.
//!
//! # Usage
//!
//! ```bash
//! # Run with the simulation driver
//! axon_node --simulate --node-id 42
//!
//! # Run from a config file with verbose logging
//! axon_node --config /etc/axon/node.toml -v
//!
//! # JSON logs
//! axon_node --config node.toml --json
//! ```

#![deny(warnings)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use axon_bus::DriverRegistry;
use axon_common::config::NodeConfig;
use axon_node::{BridgeRegistry, ControlHub, Node, watch};

/// AXON field-bus node runtime
#[derive(Parser, Debug)]
#[command(name = "axon_node")]
#[command(version)]
#[command(about = "Field-bus node runtime: arming-gated actuator control and sensor fan-in")]
#[command(long_about = None)]
struct Args {
    /// Path to node configuration file (node.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Force the simulation bus driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Override the configured bus node id
    #[arg(long)]
    node_id: Option<u8>,

    /// Override the configured bus bitrate [bit/s]
    #[arg(long)]
    bitrate: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Node startup failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("AXON node v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(node_id) = args.node_id {
        config.node_id = node_id;
    }
    if let Some(bitrate) = args.bitrate {
        config.bitrate = bitrate;
    }
    if args.simulate {
        config.driver = "sim".to_string();
    }
    config.validate()?;

    let registry = DriverRegistry::with_builtin();
    let driver = registry.create_driver(&config.driver)?;

    // External feeds: control setpoints per group, vehicle arming state.
    let controls = ControlHub::new();
    let (_arming_tx, arming_rx) = watch()?;

    // Sensor bridges are registered here as they become available for
    // the target vehicle; none are built in.
    let bridges = BridgeRegistry::new();

    let node = Node::start(&config, driver, bridges, controls, arming_rx)?;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running_handler.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    node.teardown()?;
    info!("Final node state:\n{}", node.info());
    info!("AXON node shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

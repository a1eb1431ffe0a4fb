//! baudprobe
//!
//! Finds the maximum stable baud rate of a serial link between two machines.
//!
//! # Usage
//!
//! ```bash
//! # On the far end: answer the tester at whatever baud it picks
//! baudprobe slave --port /dev/ttyTHS0
//!
//! # On the near end: run the test
//! baudprobe master --port /dev/ttyACM0 --baud-list 921600,1500000,2000000
//!
//! # Without hardware: both ends over a simulated, degrading link
//! baudprobe simulate --clean-up-to 921600 --corrupt-rate 0.001
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use baudprobe_core::prelude::*;
use baudprobe_core::protocol::list_ports;

/// baudprobe command line
#[derive(Parser, Debug)]
#[command(name = "baudprobe")]
#[command(author, version, about = "Serial link maximum stable baud rate tester", long_about = None)]
struct Cli {
    /// Logging verbosity level (overridden by RUST_LOG)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the test and report the best baud
    Master {
        /// JSON configuration file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Serial port
        #[arg(long)]
        port: Option<String>,

        /// Comma separated candidate bauds, tested in order
        #[arg(long)]
        baud_list: Option<String>,

        /// Payload size per DATA frame
        #[arg(long)]
        payload_bytes: Option<usize>,

        /// DATA frames sent per baud
        #[arg(long)]
        num_packets: Option<u32>,

        /// Maximum acceptable loss in percent
        #[arg(long)]
        loss_threshold: Option<f64>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer a master; runs until interrupted
    Slave {
        /// JSON configuration file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Serial port
        #[arg(long)]
        port: Option<String>,

        /// Comma separated bauds to scan
        #[arg(long)]
        baud_list: Option<String>,

        /// Scan dwell per baud in milliseconds
        #[arg(long)]
        scan_dwell_ms: Option<u64>,

        /// Seconds without frames before scanning again
        #[arg(long)]
        idle_timeout: Option<f64>,
    },

    /// Run master and slave against each other over an in-memory link
    Simulate {
        /// Comma separated candidate bauds
        #[arg(long, default_value = "115200,230400,460800,921600,1500000,2000000")]
        baud_list: String,

        /// Highest baud at which the link is fault free
        #[arg(long, default_value = "921600")]
        clean_up_to: u32,

        /// Probability of losing a whole write above the clean ceiling
        #[arg(long, default_value = "0.0")]
        drop_rate: f64,

        /// Probability of corrupting each byte above the clean ceiling
        #[arg(long, default_value = "0.001")]
        corrupt_rate: f64,

        /// Fault generator seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// DATA frames sent per baud
        #[arg(long, default_value = "500")]
        num_packets: u32,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports
    Ports,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("baudprobe_core={0},baudprobe={0}", cli.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Master {
            config,
            port,
            baud_list,
            payload_bytes,
            num_packets,
            loss_threshold,
            json,
        } => {
            let mut config = match config {
                Some(path) => MasterConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => MasterConfig::default(),
            };
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(list) = baud_list {
                config.baud_list = parse_baud_list(&list)?;
            }
            if let Some(n) = payload_bytes {
                config.payload_bytes = n;
            }
            if let Some(n) = num_packets {
                config.num_packets = n;
            }
            if let Some(t) = loss_threshold {
                config.loss_threshold = t;
            }
            run_master(config, json)
        }
        Commands::Slave {
            config,
            port,
            baud_list,
            scan_dwell_ms,
            idle_timeout,
        } => {
            let mut config = match config {
                Some(path) => SlaveConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SlaveConfig::default(),
            };
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(list) = baud_list {
                config.baud_list = parse_baud_list(&list)?;
            }
            if let Some(ms) = scan_dwell_ms {
                config.scan_dwell_ms = ms;
            }
            if let Some(secs) = idle_timeout {
                anyhow::ensure!(
                    secs.is_finite() && secs > 0.0,
                    "idle timeout must be a positive number of seconds"
                );
                config.idle_timeout_ms = (secs * 1000.0).round() as u64;
            }
            run_slave(config)
        }
        Commands::Simulate {
            baud_list,
            clean_up_to,
            drop_rate,
            corrupt_rate,
            seed,
            num_packets,
            json,
        } => {
            anyhow::ensure!(
                (0.0..=1.0).contains(&drop_rate) && (0.0..=1.0).contains(&corrupt_rate),
                "fault rates must be probabilities between 0 and 1"
            );
            let faults = SimFaults {
                drop_rate,
                corrupt_rate,
                clean_up_to,
                seed,
            };
            run_simulation(parse_baud_list(&baud_list)?, faults, num_packets, json)
        }
        Commands::Ports => {
            let ports = list_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                let kind = port.kind().label();
                match (port.vid, port.pid) {
                    (Some(vid), Some(pid)) => println!(
                        "{:<16} {:<10} [{:04x}:{:04x}] {}",
                        port.name,
                        kind,
                        vid,
                        pid,
                        port.product.unwrap_or_default()
                    ),
                    _ => println!("{:<16} {}", port.name, kind),
                }
            }
            Ok(())
        }
    }
}

fn run_master(config: MasterConfig, json: bool) -> anyhow::Result<()> {
    config.validate()?;
    let initial = config.baud_list[0];
    let port = SerialTransport::open(&config.port, initial)
        .with_context(|| format!("opening {}", config.port))?;
    info!(port = %config.port, "master started");

    let report = MasterOrchestrator::new(port, config)?
        .run()
        .context("check wiring, ground and RS485 direction control")?;
    print_report(&report, json)
}

fn run_slave(config: SlaveConfig) -> anyhow::Result<()> {
    config.validate()?;
    let port = SerialTransport::open(&config.port, config.baud_list[0])
        .with_context(|| format!("opening {}", config.port))?;
    info!(port = %config.port, bauds = ?config.baud_list, "slave started");

    SlaveResponder::new(port, config)?.run();
    Ok(())
}

fn run_simulation(
    bauds: Vec<u32>,
    faults: SimFaults,
    num_packets: u32,
    json: bool,
) -> anyhow::Result<()> {
    let master_config = MasterConfig {
        port: "sim".into(),
        baud_list: bauds.clone(),
        num_packets,
        ..Default::default()
    };
    master_config.validate()?;

    // The slave has to visit every baud within one master HELLO dwell.
    let dwell = master_config.timing.hello_dwell_ms / (bauds.len() as u64 + 1);
    let slave_config = SlaveConfig {
        port: "sim".into(),
        baud_list: bauds.clone(),
        scan_dwell_ms: dwell.max(10),
        ..Default::default()
    };

    let (master_port, slave_port) = SimLink::pair_with_faults(bauds[0], faults);
    let mut slave = SlaveResponder::new(slave_port, slave_config)?;
    let stop = Arc::new(AtomicBool::new(false));
    let responder = {
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || slave.run_until(|| stop.load(Ordering::Relaxed)))
    };

    let result = MasterOrchestrator::new(master_port, master_config)?.run();
    stop.store(true, Ordering::Relaxed);
    if responder.join().is_err() {
        anyhow::bail!("simulated slave panicked");
    }

    print_report(&result?, json)
}

fn print_report(report: &TestReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("\n[RESULT] {}", report.summary());
    }
    Ok(())
}

//! relay-gate device daemon.
//!
//! ```text
//!     Client ──▶ net (listener + bounded queue) ──▶ http (parser)
//!                                                     │
//!                                                     ▼
//!                     security (rate limit, session, CSRF, Basic)
//!                                                     │
//!                                                     ▼
//!                          routing ──▶ handlers ──▶ relay controller ──▶ GPIO
//!                                                     │                   │
//!     Client ◀──────────────────── response ◀─────────┘     timers ───────┘
//! ```
//!
//! `--self-test <secs>` cycles the relay once and exits without serving.
//!
//! Startup order: config, logging, metrics, relay (forces the initial
//! state), listener, signal handler. On SIGINT/SIGTERM the loop stops, the
//! relay is forced OFF and statistics are written.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use relay_gate::config::schema::{PinDriver, RelayConfig};
use relay_gate::config::loader;
use relay_gate::lifecycle::{signals, Shutdown};
use relay_gate::observability::{logging, metrics};
use relay_gate::relay::pin::{MockPin, PinError, RelayPin, SysfsPin};
use relay_gate::relay::stats::StatsStore;
use relay_gate::{HttpServer, RelaySafetyController};

#[derive(Parser)]
#[command(name = "relay-gate")]
#[command(about = "Serve a hardware relay over HTTP", long_about = None)]
struct Cli {
    /// Configuration file. Missing means defaults.
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Override `web_server.port`.
    #[arg(short, long)]
    port: Option<u16>,

    /// Switch the relay on for SECS seconds, switch it off and exit.
    #[arg(long, value_name = "SECS")]
    self_test: Option<u64>,
}

fn open_pin(config: &RelayConfig) -> Result<Box<dyn RelayPin>, PinError> {
    match config.driver {
        PinDriver::Mock => Ok(Box::new(MockPin::new(config.pin))),
        PinDriver::Sysfs => Ok(Box::new(SysfsPin::open(&config.gpio_root, config.pin)?)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_found = cli.config.exists();
    let mut config = loader::load_or_default(&cli.config)?;
    if let Some(port) = cli.port {
        config.web_server.port = port;
    }

    logging::init(&config.system, &config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %config.system.device_name,
        config = %cli.config.display(),
        defaults = !config_found,
        "relay-gate starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pin = open_pin(&config.relay)?;
    let store = StatsStore::from_config_path(&config.relay.stats_path);
    let relay = RelaySafetyController::new(&config.relay, pin, store)?;
    tracing::info!(
        pin = config.relay.pin,
        driver = ?config.relay.driver,
        active_low = config.relay.active_low,
        safety_timeout = config.relay.safety_timeout,
        max_on_time = config.relay.max_on_time,
        "Relay ready"
    );

    if let Some(secs) = cli.self_test {
        let outcome = relay.self_test(Duration::from_secs(secs)).await;
        relay.shutdown();
        outcome?;
        return Ok(());
    }

    let server = HttpServer::bind(config, relay.clone()).await?;

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    signals::spawn_signal_listener(shutdown.clone());

    server.run(stop).await;

    relay.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}

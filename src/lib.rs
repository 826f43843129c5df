// Public modules
pub mod bus;
pub mod classifier;
pub mod config;
pub mod drivers;
pub mod errors;
pub mod hub;
pub mod messages;
pub mod mux;
pub mod polling;
pub mod report;
pub mod sim;
pub mod topology;

// Re-export commonly used types
pub use bus::{I2cTransport, TransportError};
pub use config::{load_hub_config, HubConfig};
pub use errors::{HubError, HubResult};
pub use hub::SpectroHub;
pub use messages::SpectralReading;
pub use polling::PollSummary;
pub use topology::{BulbMask, SensorVariant, TopologyEntry, TopologyTable};

use bus::i2c::LinuxI2cBus;
use bus::serial::SerialLink;
use config::ReportOutput;
use report::{ReportSink, WriterSink};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

fn open_sink(config: &HubConfig) -> HubResult<Box<dyn ReportSink>> {
    let format = config.report.format;
    match config.report.output {
        ReportOutput::Stdout => Ok(Box::new(WriterSink::new(tokio::io::stdout(), format))),
        ReportOutput::Serial => {
            let link = SerialLink::new_with_baud(&config.report.serial_path, config.report.baud)?;
            info!("[report] serial link open on {}", link.path());
            Ok(Box::new(WriterSink::new(link.into_stream(), format)))
        }
    }
}

/// Run the hub with `hub.toml` from the given configuration directory until Ctrl-C
pub async fn run_hub(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("[SpectroSensorHub] starting up...");

    let hub_config_path = format!("{}/hub.toml", config_path);
    let config = load_hub_config(&hub_config_path)?;
    info!(
        "[config] loaded {}, {} channel override(s)",
        hub_config_path,
        config.channels.len()
    );

    let bus = LinuxI2cBus::new(&config.bus.path)?;
    info!("[bus] opened {}", config.bus.path);

    let sink = open_sink(&config)?;
    let mut hub = SpectroHub::from_config(bus, &config, sink);

    if !hub.begin().await {
        warn!("[main] no sensors found, polling anyway");
    }
    hub.apply_overrides(&config.channels)?;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.polling.interval_ms));
    info!("[main] polling every {}ms", config.polling.interval_ms);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = hub.poll().await;
                if summary.select_failures > 0 {
                    warn!("[poll] {} port(s) could not be selected", summary.select_failures);
                }
            }
            _ = &mut shutdown => {
                info!("[main] shutting down");
                break;
            }
        }
    }

    if hub.use_mux() {
        hub.release_ports().await;
    }
    Ok(())
}

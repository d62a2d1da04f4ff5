use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use athena_monitor::config::{self, Config};
use athena_monitor::connection::Endpoint;
use athena_monitor::health::{Description, Observation};
use athena_monitor::metrics::metrics;
use athena_monitor::{Monitor, MonitorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let (endpoint, monitor_config) = load_target()?;
    let monitor = Monitor::start(endpoint, monitor_config)?;
    let (mut mailbox, unsubscribe) = monitor.subscribe()?;

    loop {
        tokio::select! {
            desc = mailbox.recv() => match desc {
                Some(desc) => log_description(&desc),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, stopping monitor");
                break;
            }
        }
    }

    unsubscribe.unsubscribe();
    monitor.shutdown().await;
    print!("{}", metrics().gather());
    Ok(())
}

/// Endpoint from the first argument ("host:port"), otherwise a config file
/// (first argument or the default path)
fn load_target() -> anyhow::Result<(Endpoint, MonitorConfig)> {
    let arg = std::env::args().nth(1);

    if let Some(endpoint) = arg.as_deref().and_then(|a| a.parse::<Endpoint>().ok()) {
        info!(endpoint = %endpoint, "Using default configuration");
        return Ok((endpoint, MonitorConfig::default()));
    }

    let path = arg.unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let config: Config = config::load_config(&path)
        .with_context(|| format!("failed to load configuration from {}", path))?;
    info!(path = %path, "Loaded configuration");

    let monitor_config = MonitorConfig::from(&config);
    Ok((config.endpoint, monitor_config))
}

fn log_description(desc: &Arc<Description>) {
    match &desc.observation {
        Observation::Unchecked => {
            info!(endpoint = %desc.endpoint, "Waiting for first heartbeat");
        }
        Observation::Reachable(info) => {
            info!(
                endpoint = %desc.endpoint,
                kind = ?info.kind,
                version = %info.version.desc,
                set_name = ?info.set_name,
                average_rtt_ms = info.average_rtt.as_secs_f64() * 1000.0,
                "Server reachable"
            );
        }
        Observation::Unreachable(error) => {
            warn!(endpoint = %desc.endpoint, error = %error, "Server unreachable");
        }
    }
}

use serde::Deserialize;

use crate::connection::Endpoint;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server to monitor
    pub endpoint: Endpoint,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub dial: DialSection,
}

// ============================================================================
// Monitor Configuration
// ============================================================================

/// Heartbeat scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    /// Interval between scheduled heartbeats (milliseconds)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

// ============================================================================
// Dial Configuration
// ============================================================================

/// Connection timeouts for the heartbeat connection
#[derive(Debug, Clone, Deserialize)]
pub struct DialSection {
    /// Timeout for establishing a connection (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Timeout for one handshake exchange (milliseconds)
    #[serde(default = "default_exchange_timeout_ms")]
    pub exchange_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_exchange_timeout_ms() -> u64 {
    10_000
}

impl Default for DialSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            exchange_timeout_ms: default_exchange_timeout_ms(),
        }
    }
}

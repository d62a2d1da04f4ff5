//! Server health monitoring
//!
//! This module provides:
//! - Periodic heartbeats against a single server endpoint
//! - Retry with reconnect inside each heartbeat
//! - Smoothed round-trip time tracking
//! - Latest-value-wins delivery of server descriptions to subscribers

mod description;
mod heartbeat;
mod monitor;
mod registry;
mod rtt;

pub use description::{
    Description, Observation, ServerInfo, ServerKind, ServerVersion, WireVersionRange,
};
pub use heartbeat::{HeartbeatExecutor, MAX_ATTEMPTS};
pub use monitor::{
    Monitor, MonitorConfig, MonitorError, MonitorState, DEFAULT_HEARTBEAT_INTERVAL,
    MIN_HEARTBEAT_INTERVAL,
};
pub use registry::{Mailbox, SubscribeError, SubscriberRegistry, TryRecvError, Unsubscribe};
pub use rtt::{RttEstimator, RTT_ALPHA};

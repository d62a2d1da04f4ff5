//! Heartbeat monitor for a single database server endpoint
//!
//! A [`Monitor`] runs a background task that periodically performs a
//! handshake against the endpoint and publishes a [`Description`] of what it
//! found to any number of subscribers.

pub mod config;
pub mod connection;
pub mod health;
pub mod metrics;
pub mod protocol;

pub use connection::{ConnectionError, DialOptions, Dialer, Endpoint};
pub use health::{Description, Mailbox, Monitor, MonitorConfig, MonitorError, ServerKind, Unsubscribe};

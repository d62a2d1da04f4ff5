//! Connection contracts consumed by the monitor
//!
//! The monitor never talks to sockets directly. It dials through a
//! [`Dialer`] and runs the handshake batch through a [`Connection`], so
//! transports can be swapped (TCP in production, [`mock`] in tests).

pub mod mock;
mod tcp;

pub use tcp::{TcpConnection, TcpDialer};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::protocol::{Command, Document};

/// Network identity of a monitored server (`host:port`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ConnectionError;

    /// Parse "host:port" into components
    fn from_str(addr: &str) -> Result<Self, Self::Err> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ConnectionError::InvalidAddr(addr.to_string()))?;
        if host.is_empty() {
            return Err(ConnectionError::InvalidAddr(addr.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ConnectionError::InvalidAddr(addr.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Options applied when dialing and exchanging with an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialOptions {
    /// Upper bound on establishing the connection
    pub connect_timeout: Duration,
    /// Upper bound on one batched command exchange
    pub exchange_timeout: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            exchange_timeout: Duration::from_secs(10),
        }
    }
}

/// An open connection to an endpoint
#[async_trait]
pub trait Connection: Send {
    /// Execute a batch of commands as one round trip, returning one reply
    /// per command in order
    async fn execute(&mut self, commands: &[Command]) -> Result<Vec<Document>, ConnectionError>;

    /// Close the connection. Safe to call on an already failed or closed
    /// connection.
    async fn close(&mut self);
}

/// Opens connections to endpoints
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        endpoint: &Endpoint,
        options: &DialOptions,
    ) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// Connection errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command failed ({code}): {message}")]
    Command { code: i32, message: String },

    #[error("Invalid address: {0}")]
    InvalidAddr(String),

    #[error("Connection disconnected")]
    Disconnected,
}

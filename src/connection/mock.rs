//! Scriptable dialer for testing.
//!
//! Dial and exchange outcomes are queued up front; once a queue runs dry the
//! configured default is used. Every dial, exchange and close is recorded so
//! tests can assert on reconnect behavior and heartbeat spacing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;

use crate::protocol::{Command, Document};

use super::{Connection, ConnectionError, DialOptions, Dialer, Endpoint};

/// Scripted outcome of one command exchange
#[derive(Debug, Clone)]
pub struct MockExchange {
    /// Simulated round-trip time
    pub latency: Duration,
    pub outcome: Result<Vec<Document>, ConnectionError>,
}

impl MockExchange {
    pub fn reply(replies: Vec<Document>) -> Self {
        Self {
            latency: Duration::ZERO,
            outcome: Ok(replies),
        }
    }

    /// A replica set primary running 3.6.2
    pub fn primary() -> Self {
        Self::reply(vec![
            json!({
                "ok": 1,
                "ismaster": true,
                "secondary": false,
                "setName": "rs0",
                "hosts": ["localhost:27017", "localhost:27018"],
                "minWireVersion": 0,
                "maxWireVersion": 6
            }),
            build_info_reply("3.6.2", &[3, 6, 2, 0]),
        ])
    }

    /// A replica set secondary running 3.6.2
    pub fn secondary() -> Self {
        Self::reply(vec![
            json!({
                "ok": 1,
                "ismaster": false,
                "secondary": true,
                "setName": "rs0",
                "primary": "localhost:27018",
                "hosts": ["localhost:27017", "localhost:27018"],
                "maxWireVersion": 6
            }),
            build_info_reply("3.6.2", &[3, 6, 2, 0]),
        ])
    }

    /// A standalone server running 3.4.10
    pub fn standalone() -> Self {
        Self::reply(vec![
            json!({"ok": 1, "ismaster": true, "maxWireVersion": 5}),
            build_info_reply("3.4.10", &[3, 4, 10, 0]),
        ])
    }

    pub fn error(error: ConnectionError) -> Self {
        Self {
            latency: Duration::ZERO,
            outcome: Err(error),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

fn build_info_reply(version: &str, parts: &[i32]) -> Document {
    json!({"ok": 1, "version": version, "versionArray": parts})
}

/// One recorded exchange
#[derive(Debug, Clone, Copy)]
pub struct ExchangeRecord {
    /// Which dialed connection carried the exchange (1-based dial order)
    pub connection_id: usize,
    /// When the exchange started
    pub started_at: Instant,
}

#[derive(Debug)]
struct MockState {
    dial_script: VecDeque<Result<(), ConnectionError>>,
    default_dial: Result<(), ConnectionError>,
    exchange_script: VecDeque<MockExchange>,
    default_exchange: MockExchange,
    dials: usize,
    closes: usize,
    exchanges: Vec<ExchangeRecord>,
}

/// A test-double dialer with scripted outcomes
#[derive(Debug, Clone)]
pub struct MockDialer {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDialer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDialer {
    /// Dials succeed and every exchange answers as a standalone server
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                dial_script: VecDeque::new(),
                default_dial: Ok(()),
                exchange_script: VecDeque::new(),
                default_exchange: MockExchange::standalone(),
                dials: 0,
                closes: 0,
                exchanges: Vec::new(),
            })),
        }
    }

    /// A dialer whose every dial fails
    pub fn unreachable() -> Self {
        let dialer = Self::new();
        dialer.set_default_dial(Err(ConnectionError::Connect(
            "connection refused".to_string(),
        )));
        dialer
    }

    pub fn set_default_dial(&self, outcome: Result<(), ConnectionError>) {
        self.state.lock().default_dial = outcome;
    }

    pub fn set_default_exchange(&self, exchange: MockExchange) {
        self.state.lock().default_exchange = exchange;
    }

    /// Queue the outcome of the next unscripted dial
    pub fn push_dial(&self, outcome: Result<(), ConnectionError>) {
        self.state.lock().dial_script.push_back(outcome);
    }

    /// Queue the outcome of the next unscripted exchange
    pub fn push_exchange(&self, exchange: MockExchange) {
        self.state.lock().exchange_script.push_back(exchange);
    }

    /// Number of dial attempts, successful or not
    pub fn dial_count(&self) -> usize {
        self.state.lock().dials
    }

    /// Number of connections closed by the caller
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    pub fn exchanges(&self) -> Vec<ExchangeRecord> {
        self.state.lock().exchanges.clone()
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(
        &self,
        _endpoint: &Endpoint,
        _options: &DialOptions,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let mut state = self.state.lock();
        state.dials += 1;
        let outcome = match state.dial_script.pop_front() {
            Some(outcome) => outcome,
            None => state.default_dial.clone(),
        };
        outcome?;

        Ok(Box::new(MockConnection {
            id: state.dials,
            state: self.state.clone(),
            closed: false,
        }))
    }
}

/// Connection handed out by [`MockDialer`]
struct MockConnection {
    id: usize,
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, _commands: &[Command]) -> Result<Vec<Document>, ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Disconnected);
        }

        let exchange = {
            let mut state = self.state.lock();
            let exchange = match state.exchange_script.pop_front() {
                Some(exchange) => exchange,
                None => state.default_exchange.clone(),
            };
            state.exchanges.push(ExchangeRecord {
                connection_id: self.id,
                started_at: Instant::now(),
            });
            exchange
        };

        if !exchange.latency.is_zero() {
            tokio::time::sleep(exchange.latency).await;
        }
        exchange.outcome
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().closes += 1;
        }
    }
}

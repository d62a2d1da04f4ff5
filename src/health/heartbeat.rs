//! Heartbeat executor
//!
//! Runs one handshake round against the endpoint: dial if no connection is
//! held, send the handshake batch, time it, and turn the replies into a
//! [`Description`]. A failed attempt discards the connection and the next
//! attempt redials. The first success ends the round.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionError, DialOptions, Dialer, Endpoint};
use crate::metrics::metrics;
use crate::protocol::{decode_handshake, handshake_commands, BuildInfoReply, HelloReply};

use super::description::Description;
use super::rtt::RttEstimator;

/// Attempts per heartbeat before the endpoint is reported unreachable
pub const MAX_ATTEMPTS: usize = 2;

/// Which step of an attempt failed
#[derive(Debug)]
enum AttemptError {
    Dial(ConnectionError),
    Exchange(ConnectionError),
}

impl AttemptError {
    fn stage(&self) -> &'static str {
        match self {
            AttemptError::Dial(_) => "dial",
            AttemptError::Exchange(_) => "exchange",
        }
    }

    fn into_inner(self) -> ConnectionError {
        match self {
            AttemptError::Dial(e) | AttemptError::Exchange(e) => e,
        }
    }
}

/// Replies and raw round-trip time of one successful exchange
struct Handshake {
    hello: HelloReply,
    build_info: BuildInfoReply,
    rtt: Duration,
}

/// Performs heartbeats for one endpoint
///
/// Owns the persistent heartbeat connection and the RTT average. Only the
/// monitor's background task holds one, so neither needs a lock.
pub struct HeartbeatExecutor {
    endpoint: Endpoint,
    dialer: Arc<dyn Dialer>,
    options: DialOptions,
    heartbeat_interval: Duration,
    conn: Option<Box<dyn Connection>>,
    rtt: RttEstimator,
}

impl HeartbeatExecutor {
    pub fn new(
        endpoint: Endpoint,
        dialer: Arc<dyn Dialer>,
        options: DialOptions,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            endpoint,
            dialer,
            options,
            heartbeat_interval,
            conn: None,
            rtt: RttEstimator::new(),
        }
    }

    /// Whether a connection is currently held for the next heartbeat
    pub fn has_connection(&self) -> bool {
        self.conn.is_some()
    }

    /// Run one heartbeat and describe the endpoint
    ///
    /// Never fails: when every attempt fails the description carries the
    /// last error and nothing else.
    pub async fn check(&mut self) -> Description {
        let mut last_error = ConnectionError::Disconnected;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt().await {
                Ok(handshake) => {
                    let average_rtt = self.rtt.update(handshake.rtt);
                    metrics().record_heartbeat_success(handshake.rtt.as_secs_f64());
                    debug!(
                        endpoint = %self.endpoint,
                        attempt = attempt,
                        rtt_us = handshake.rtt.as_micros() as u64,
                        average_rtt_us = average_rtt.as_micros() as u64,
                        "Heartbeat succeeded"
                    );
                    return Description::from_handshake(
                        self.endpoint.clone(),
                        handshake.hello,
                        handshake.build_info,
                        average_rtt,
                        self.heartbeat_interval,
                    );
                }
                Err(e) => {
                    metrics().record_attempt_failure(e.stage());
                    debug!(
                        endpoint = %self.endpoint,
                        attempt = attempt,
                        stage = e.stage(),
                        error = ?e,
                        "Heartbeat attempt failed"
                    );
                    last_error = e.into_inner();
                }
            }
        }

        metrics().record_heartbeat_failure();
        warn!(
            endpoint = %self.endpoint,
            attempts = MAX_ATTEMPTS,
            error = %last_error,
            "Heartbeat failed, endpoint unreachable"
        );
        Description::unreachable(self.endpoint.clone(), last_error)
    }

    /// One attempt: reuse or dial a connection, then exchange
    async fn attempt(&mut self) -> Result<Handshake, AttemptError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => self
                .dialer
                .dial(&self.endpoint, &self.options)
                .await
                .map_err(AttemptError::Dial)?,
        };

        let commands = handshake_commands();
        let started = Instant::now();
        let result = conn.execute(&commands).await.and_then(decode_handshake);
        let rtt = started.elapsed();

        match result {
            Ok((hello, build_info)) => {
                self.conn = Some(conn);
                Ok(Handshake {
                    hello,
                    build_info,
                    rtt,
                })
            }
            Err(e) => {
                // The stream may be mid-reply; never reuse it
                conn.close().await;
                Err(AttemptError::Exchange(e))
            }
        }
    }

    /// Close the held connection, if any
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
    }
}

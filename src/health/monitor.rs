//! Server monitor
//!
//! One background task per monitored endpoint. It waits for the heartbeat
//! timer or an immediate-check request, honors the minimum spacing between
//! heartbeats, runs the heartbeat executor and publishes the resulting
//! description to subscribers. It exits only when the monitor is stopped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::{DialOptions, Dialer, Endpoint, TcpDialer};

use super::description::Description;
use super::heartbeat::HeartbeatExecutor;
use super::registry::{Mailbox, SubscribeError, SubscriberRegistry, Unsubscribe};

/// Minimum time between the starts of two heartbeats
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// Default polling period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Deadline used when an interval does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Monitor configuration
#[derive(Clone)]
pub struct MonitorConfig {
    /// Time between scheduled heartbeats
    pub heartbeat_interval: Duration,
    pub dial: DialOptions,
    pub dialer: Arc<dyn Dialer>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            dial: DialOptions::default(),
            dialer: Arc::new(TcpDialer),
        }
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("dial", &self.dial)
            .finish_non_exhaustive()
    }
}

impl MonitorConfig {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_dial_options(mut self, dial: DialOptions) -> Self {
        self.dial = dial;
        self
    }

    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }
}

impl From<&Config> for MonitorConfig {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(config.monitor.heartbeat_interval_ms),
            dial: DialOptions {
                connect_timeout: Duration::from_millis(config.dial.connect_timeout_ms),
                exchange_timeout: Duration::from_millis(config.dial.exchange_timeout_ms),
            },
            dialer: Arc::new(TcpDialer),
        }
    }
}

/// Error starting a monitor
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(String),

    #[error("Monitor must be started inside a tokio runtime")]
    NoRuntime,
}

/// Lifecycle of the background task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Waiting for the next timer or request
    Idle,
    /// A heartbeat is in flight
    Checking,
    /// Terminal; no further heartbeats
    Stopped,
}

/// State shared between the handle and the background task
struct Shared {
    endpoint: Endpoint,
    description: RwLock<Arc<Description>>,
    subscribers: Arc<SubscriberRegistry>,
    state: Mutex<MonitorState>,
    check_now: Notify,
    done: CancellationToken,
    /// Cancelled when the background task has exited
    exited: CancellationToken,
}

impl Shared {
    fn set_state(&self, state: MonitorState) {
        *self.state.lock() = state;
    }
}

/// Handle to a running server monitor
///
/// Dropping the handle stops the background task.
pub struct Monitor {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Start monitoring an endpoint
    ///
    /// The first heartbeat is scheduled immediately but not awaited. Must be
    /// called from within a tokio runtime.
    pub fn start(endpoint: Endpoint, config: MonitorConfig) -> Result<Self, MonitorError> {
        if config.heartbeat_interval.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "heartbeat interval must be greater than zero".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        let shared = Arc::new(Shared {
            endpoint: endpoint.clone(),
            description: RwLock::new(Arc::new(Description::unchecked(endpoint.clone()))),
            subscribers: Arc::new(SubscriberRegistry::new()),
            state: Mutex::new(MonitorState::Idle),
            check_now: Notify::new(),
            done: CancellationToken::new(),
            exited: CancellationToken::new(),
        });

        let executor = HeartbeatExecutor::new(
            endpoint.clone(),
            config.dialer.clone(),
            config.dial.clone(),
            config.heartbeat_interval,
        );

        let task = runtime.spawn(run(shared.clone(), executor, config.heartbeat_interval));

        info!(
            endpoint = %endpoint,
            heartbeat_interval_ms = config.heartbeat_interval.as_millis() as u64,
            "Monitor started"
        );

        Ok(Self {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Current description snapshot
    pub fn description(&self) -> Arc<Description> {
        self.shared.description.read().clone()
    }

    pub fn state(&self) -> MonitorState {
        *self.shared.state.lock()
    }

    /// Subscribe to description updates
    ///
    /// The mailbox's first value is the current description. Fails once the
    /// monitor has stopped.
    pub fn subscribe(&self) -> Result<(Mailbox, Unsubscribe), SubscribeError> {
        self.shared.subscribers.subscribe(&self.shared.description)
    }

    /// Ask for a heartbeat now instead of at the next scheduled time
    ///
    /// Never blocks. Requests made while one is already pending are merged,
    /// and heartbeats still respect [`MIN_HEARTBEAT_INTERVAL`].
    pub fn request_immediate_check(&self) {
        self.shared.check_now.notify_one();
    }

    /// Signal the background task to stop. Idempotent.
    ///
    /// A heartbeat already in flight finishes and is published first.
    pub fn stop(&self) {
        self.shared.done.cancel();
    }

    /// Stop and wait until the background task has exited
    ///
    /// On return every mailbox is closed, for every concurrent caller.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(endpoint = %self.shared.endpoint, error = %e, "Monitor task ended abnormally");
            }
        }
        self.shared.exited.cancelled().await;
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shared.done.cancel();
    }
}

/// `now + interval`, saturating to a far-future deadline
fn deadline_after(interval: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(interval).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Background task body
///
/// Both timers live here and nowhere else. The heartbeat timer is rearmed
/// after every heartbeat, so an immediate check also pushes back the next
/// scheduled one. The rate-limit timer is rearmed as soon as it lets a
/// heartbeat through. A stop is observed only while waiting, never
/// between a heartbeat and its publish.
async fn run(shared: Arc<Shared>, mut executor: HeartbeatExecutor, heartbeat_interval: Duration) {
    let _exited = shared.exited.clone().drop_guard();
    let heartbeat_timer = sleep(Duration::ZERO);
    let rate_limit_timer = sleep(Duration::ZERO);
    tokio::pin!(heartbeat_timer, rate_limit_timer);

    loop {
        let trigger = tokio::select! {
            biased;
            _ = shared.done.cancelled() => break,
            _ = &mut heartbeat_timer => "scheduled",
            _ = shared.check_now.notified() => "requested",
        };

        tokio::select! {
            biased;
            _ = shared.done.cancelled() => break,
            _ = &mut rate_limit_timer => {}
        }
        rate_limit_timer
            .as_mut()
            .reset(deadline_after(MIN_HEARTBEAT_INTERVAL));

        shared.set_state(MonitorState::Checking);
        debug!(endpoint = %shared.endpoint, trigger = trigger, "Starting heartbeat");
        let desc = Arc::new(executor.check().await);

        let previous = shared.description.read().kind();
        if previous != desc.kind() {
            info!(
                endpoint = %shared.endpoint,
                from = ?previous,
                to = ?desc.kind(),
                "Server kind changed"
            );
        }

        shared.subscribers.publish(desc, &shared.description);
        shared.set_state(MonitorState::Idle);

        heartbeat_timer
            .as_mut()
            .reset(deadline_after(heartbeat_interval));
    }

    executor.close().await;
    shared.set_state(MonitorState::Stopped);
    let closed = shared.subscribers.shutdown();
    info!(endpoint = %shared.endpoint, closed_subscribers = closed, "Monitor stopped");
}

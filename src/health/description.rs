//! Server descriptions
//!
//! A [`Description`] is an immutable snapshot of what one heartbeat learned
//! about an endpoint. Each heartbeat produces a fresh value; consumers hold
//! it behind an `Arc` and never see it change.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use crate::connection::{ConnectionError, Endpoint};
use crate::protocol::{BuildInfoReply, HelloReply};

/// Role of a server as reported by the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServerKind {
    /// Not yet checked, or unreachable
    #[default]
    Unknown,
    Standalone,
    Mongos,
    RsPrimary,
    RsSecondary,
    RsArbiter,
    /// Replica set member that is neither primary, secondary nor arbiter
    RsMember,
    /// Replica set member that has not been initialized
    RsGhost,
}

impl ServerKind {
    /// Derive the role from a role-query reply
    pub fn from_hello(hello: &HelloReply) -> Self {
        if hello.arbiter_only {
            ServerKind::RsArbiter
        } else if hello.is_replica_set {
            ServerKind::RsGhost
        } else if hello.set_name.as_deref().is_some_and(|s| !s.is_empty()) {
            if hello.is_master {
                ServerKind::RsPrimary
            } else if hello.secondary {
                ServerKind::RsSecondary
            } else {
                ServerKind::RsMember
            }
        } else if hello.msg.as_deref() == Some("isdbgrid") {
            ServerKind::Mongos
        } else {
            ServerKind::Standalone
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(
            self,
            ServerKind::Standalone | ServerKind::Mongos | ServerKind::RsPrimary
        )
    }
}

/// Server version from the build-info query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerVersion {
    pub desc: String,
    pub parts: Vec<i32>,
    pub git_version: Option<String>,
}

impl ServerVersion {
    /// Compare against a version prefix, e.g. `&[3, 6]`
    pub fn at_least(&self, other: &[i32]) -> bool {
        for (i, want) in other.iter().enumerate() {
            let have = self.parts.get(i).copied().unwrap_or(0);
            if have != *want {
                return have > *want;
            }
        }
        true
    }
}

/// Range of wire protocol versions the server speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireVersionRange {
    pub min: i32,
    pub max: i32,
}

impl WireVersionRange {
    pub fn includes(&self, version: i32) -> bool {
        self.min <= version && version <= self.max
    }
}

/// Everything a successful heartbeat learned
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub kind: ServerKind,
    pub version: ServerVersion,
    pub wire_version: WireVersionRange,
    pub set_name: Option<String>,
    pub set_version: Option<u32>,
    pub primary: Option<String>,
    pub canonical_address: Option<String>,
    pub hosts: Vec<String>,
    pub passives: Vec<String>,
    pub arbiters: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub max_document_size: Option<u32>,
    pub max_message_size: Option<u32>,
    pub max_batch_count: Option<u32>,
    /// Smoothed round-trip time including this heartbeat
    pub average_rtt: Duration,
    /// Configured polling period of the monitor that produced this
    pub heartbeat_interval: Duration,
}

/// Outcome of the most recent heartbeat
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// No heartbeat has completed yet
    Unchecked,
    Reachable(ServerInfo),
    /// Every attempt of the last heartbeat failed
    Unreachable(ConnectionError),
}

/// Snapshot of a server's observed state at one heartbeat
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub endpoint: Endpoint,
    pub observation: Observation,
    /// When this snapshot was produced
    pub last_update: SystemTime,
}

impl Description {
    /// The description a monitor starts with: endpoint only
    pub fn unchecked(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            observation: Observation::Unchecked,
            last_update: SystemTime::now(),
        }
    }

    /// A heartbeat that exhausted its attempts
    pub fn unreachable(endpoint: Endpoint, error: ConnectionError) -> Self {
        Self {
            endpoint,
            observation: Observation::Unreachable(error),
            last_update: SystemTime::now(),
        }
    }

    /// Build from the two handshake replies
    pub fn from_handshake(
        endpoint: Endpoint,
        hello: HelloReply,
        build_info: BuildInfoReply,
        average_rtt: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        let kind = ServerKind::from_hello(&hello);
        let info = ServerInfo {
            kind,
            version: ServerVersion {
                desc: build_info.version,
                parts: build_info.version_array,
                git_version: build_info.git_version,
            },
            wire_version: WireVersionRange {
                min: hello.min_wire_version,
                max: hello.max_wire_version,
            },
            set_name: hello.set_name.filter(|s| !s.is_empty()),
            set_version: hello.set_version,
            primary: hello.primary,
            canonical_address: hello.me,
            hosts: hello.hosts,
            passives: hello.passives,
            arbiters: hello.arbiters,
            tags: hello.tags,
            max_document_size: hello.max_bson_object_size,
            max_message_size: hello.max_message_size_bytes,
            max_batch_count: hello.max_write_batch_size,
            average_rtt,
            heartbeat_interval,
        };

        Self {
            endpoint,
            observation: Observation::Reachable(info),
            last_update: SystemTime::now(),
        }
    }

    pub fn info(&self) -> Option<&ServerInfo> {
        match &self.observation {
            Observation::Reachable(info) => Some(info),
            _ => None,
        }
    }

    /// Set only when the most recent heartbeat failed after all retries
    pub fn last_error(&self) -> Option<&ConnectionError> {
        match &self.observation {
            Observation::Unreachable(error) => Some(error),
            _ => None,
        }
    }

    pub fn kind(&self) -> ServerKind {
        self.info().map(|i| i.kind).unwrap_or_default()
    }

    pub fn average_rtt(&self) -> Option<Duration> {
        self.info().map(|i| i.average_rtt)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.info().map(|i| i.heartbeat_interval)
    }
}

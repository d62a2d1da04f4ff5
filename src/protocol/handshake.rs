//! Heartbeat handshake: the role query and the build-info query
//!
//! Both commands are sent as one batch; the replies are decoded into typed
//! structs. Unknown reply fields are ignored.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::connection::ConnectionError;

use super::command::{Command, Document};

/// Database the handshake commands are addressed to
pub const ADMIN_DATABASE: &str = "admin";

/// Reply to the role/capability query
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelloReply {
    #[serde(rename = "ismaster")]
    pub is_master: bool,
    pub secondary: bool,
    pub arbiter_only: bool,
    pub hidden: bool,
    #[serde(rename = "isreplicaset")]
    pub is_replica_set: bool,
    pub msg: Option<String>,
    pub set_name: Option<String>,
    pub set_version: Option<u32>,
    pub primary: Option<String>,
    pub me: Option<String>,
    pub hosts: Vec<String>,
    pub passives: Vec<String>,
    pub arbiters: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub min_wire_version: i32,
    pub max_wire_version: i32,
    pub max_bson_object_size: Option<u32>,
    pub max_message_size_bytes: Option<u32>,
    pub max_write_batch_size: Option<u32>,
}

/// Reply to the build/version query
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildInfoReply {
    pub version: String,
    pub version_array: Vec<i32>,
    pub git_version: Option<String>,
}

/// The two commands that make up one heartbeat exchange
pub fn handshake_commands() -> [Command; 2] {
    [
        Command::new("isMaster", ADMIN_DATABASE),
        Command::new("buildInfo", ADMIN_DATABASE),
    ]
}

/// Decode the replies to [`handshake_commands`], in order
pub fn decode_handshake(
    replies: Vec<Document>,
) -> Result<(HelloReply, BuildInfoReply), ConnectionError> {
    let [hello, build_info]: [Document; 2] = replies.try_into().map_err(|r: Vec<Document>| {
        ConnectionError::Protocol(format!("Expected 2 handshake replies, got {}", r.len()))
    })?;

    let hello: HelloReply = serde_json::from_value(hello)
        .map_err(|e| ConnectionError::Protocol(format!("Invalid isMaster reply: {}", e)))?;
    let build_info: BuildInfoReply = serde_json::from_value(build_info)
        .map_err(|e| ConnectionError::Protocol(format!("Invalid buildInfo reply: {}", e)))?;

    Ok((hello, build_info))
}

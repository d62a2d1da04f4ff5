use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::{Map, Value};

use crate::connection::ConnectionError;

use super::packet::Frame;

/// Document shape used for both commands and replies
pub type Document = Value;

/// Process-wide request id counter
static REQUEST_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate the next request id for an outgoing command
pub fn next_request_id() -> u32 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// A named command addressed to a database
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub database: String,
    /// Extra fields appended after the command name
    pub arguments: Map<String, Value>,
}

impl Command {
    pub fn new(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            arguments: Map::new(),
        }
    }

    /// Add an argument field to the command document
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Build the request document: `{ <name>: 1, $db: <database>, ...arguments }`
    pub fn to_document(&self) -> Document {
        let mut doc = Map::with_capacity(self.arguments.len() + 2);
        doc.insert(self.name.clone(), Value::from(1));
        doc.insert("$db".to_string(), Value::from(self.database.clone()));
        for (k, v) in &self.arguments {
            doc.insert(k.clone(), v.clone());
        }
        Value::Object(doc)
    }

    /// Encode the command into a frame with the given request id
    pub fn encode(&self, request_id: u32) -> Result<Frame, ConnectionError> {
        let payload = serde_json::to_vec(&self.to_document())
            .map_err(|e| ConnectionError::Protocol(e.to_string()))?;
        Ok(Frame::new(request_id, payload))
    }

    /// Decode a reply frame into a document
    ///
    /// Fails with [`ConnectionError::Command`] when the server answered with
    /// `ok: 0`.
    pub fn decode_reply(frame: &Frame) -> Result<Document, ConnectionError> {
        let doc: Document = serde_json::from_slice(&frame.payload)
            .map_err(|e| ConnectionError::Protocol(format!("Malformed reply: {}", e)))?;

        if !doc.is_object() {
            return Err(ConnectionError::Protocol("Reply is not a document".into()));
        }

        if !is_ok(&doc) {
            let code = doc.get("code").and_then(Value::as_i64).unwrap_or(0) as i32;
            let message = doc
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or("command failed")
                .to_string();
            return Err(ConnectionError::Command { code, message });
        }

        Ok(doc)
    }
}

/// `ok` may be sent as a number or a boolean
fn is_ok(doc: &Document) -> bool {
    match doc.get("ok") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        _ => false,
    }
}

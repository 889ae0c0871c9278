//! Inbound envelope — the parsed unit of every frame from the server.
//!
//! The server sends UTF-8 JSON text shaped as
//! `{"type": "...", "data": ..., "user_id": 7}`. Only `type` is required;
//! `data` is kept as an opaque [`Value`] and handed to listeners untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message types the backend emits for task and notebook changes.
pub mod kinds {
    pub const TASK_UPDATE: &str = "task_update";
    pub const TASK_CREATE: &str = "task_create";
    pub const TASK_DELETE: &str = "task_delete";
    pub const NOTEBOOK_UPDATE: &str = "notebook_update";
    pub const NOTEBOOK_CREATE: &str = "notebook_create";
    pub const NOTEBOOK_DELETE: &str = "notebook_delete";

    /// Every type the backend is known to send.
    pub const ALL: [&str; 6] = [
        TASK_UPDATE,
        TASK_CREATE,
        TASK_DELETE,
        NOTEBOOK_UPDATE,
        NOTEBOOK_CREATE,
        NOTEBOOK_DELETE,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing key.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { kind: kind.into(), data, user_id: None }
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

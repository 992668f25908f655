use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A value carried in an [`Event`]'s application properties. The source SDK
/// may hand back either a UTF-8 string or a raw byte payload; both are kept
/// until serialization, where bytes are lossily decoded to UTF-8 (§3 "bytes
/// purity").
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    /// Lossily converts to UTF-8, replacing invalid sequences, per the
    /// "bytes purity" invariant: no row field may retain type `bytes`.
    pub fn into_lossy_string(self) -> String {
        match self {
            PropertyValue::Text(s) => s,
            PropertyValue::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
        }
    }
}

/// An event read from one partition of the source. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Event {
    pub body: Vec<u8>,
    pub properties: HashMap<String, PropertyValue>,
    pub system_properties: HashMap<String, serde_json::Value>,
    pub partition_id: String,
    pub sequence_number: i64,
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(partition_id: impl Into<String>, sequence_number: i64, body: Vec<u8>) -> Self {
        Self {
            body,
            properties: HashMap::new(),
            system_properties: HashMap::new(),
            partition_id: partition_id.into(),
            sequence_number,
            enqueued_at: None,
        }
    }
}

use crate::event::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The serialized, warehouse-bound form of an [`Event`] (§3).
///
/// `serialize` is a pure function of its inputs save for `ingestion_timestamp`,
/// which the caller supplies explicitly so the function stays deterministic
/// and testable (§8 "row determinism").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub event_body: String,
    pub partition_id: String,
    pub sequence_number: i64,
    pub enqueued_time: Option<DateTime<Utc>>,
    pub properties: Option<String>,
    pub system_properties: Option<String>,
    pub ingestion_timestamp: DateTime<Utc>,
}

/// `"{partition_id}_{sequence_number}"`, the idempotency key the sink
/// deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowId(String);

impl RowId {
    pub fn for_event(partition_id: &str, sequence_number: i64) -> Self {
        RowId(format!("{partition_id}_{sequence_number}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Row {
    pub fn row_id(&self) -> RowId {
        RowId::for_event(&self.partition_id, self.sequence_number)
    }
}

/// Serializes an [`Event`] into its warehouse [`Row`] form. Bytes fields are
/// lossily decoded to UTF-8 (§3 "bytes purity"); identical `(event,
/// ingestion_timestamp)` pairs always produce byte-identical rows.
pub fn serialize(event: &Event, ingestion_timestamp: DateTime<Utc>) -> Row {
    let event_body = String::from_utf8_lossy(&event.body).into_owned();

    let properties = if event.properties.is_empty() {
        None
    } else {
        let mut map = serde_json::Map::new();
        for (k, v) in &event.properties {
            map.insert(k.clone(), serde_json::Value::String(v.clone().into_lossy_string()));
        }
        Some(serde_json::Value::Object(map).to_string())
    };

    let system_properties = if event.system_properties.is_empty() {
        None
    } else {
        serde_json::to_string(&event.system_properties).ok()
    };

    Row {
        event_body,
        partition_id: event.partition_id.clone(),
        sequence_number: event.sequence_number,
        enqueued_time: event.enqueued_at,
        properties,
        system_properties,
        ingestion_timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_event() -> Event {
        let mut e = Event::new("0", 10, b"hello".to_vec());
        e.properties
            .insert("k".to_string(), crate::event::PropertyValue::Text("v".into()));
        e.system_properties = HashMap::from([(
            "offset".to_string(),
            serde_json::Value::Number(42.into()),
        )]);
        e
    }

    #[test]
    fn row_id_matches_spec_format() {
        let id = RowId::for_event("0", 10);
        assert_eq!(id.as_str(), "0_10");
    }

    #[test]
    fn serialize_is_pure_given_fixed_timestamp() {
        let e = sample_event();
        let ts = Utc::now();
        let r1 = serialize(&e, ts);
        let r2 = serialize(&e, ts);
        assert_eq!(r1, r2);
        assert_eq!(r1.event_body, "hello");
        assert_eq!(r1.row_id().as_str(), "0_10");
    }

    #[test]
    fn lossy_bytes_never_reach_rows() {
        let mut e = Event::new("0", 1, vec![0xff, 0xfe, b'x']);
        e.properties.insert(
            "raw".to_string(),
            crate::event::PropertyValue::Bytes(vec![0xff, b'y']),
        );
        let row = serialize(&e, Utc::now());
        assert!(row.event_body.contains('x'));
        assert!(row.properties.unwrap().contains('y'));
    }
}

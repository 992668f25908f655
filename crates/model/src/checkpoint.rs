use chrono::{DateTime, Utc};

/// Composite primary key of a checkpoint row in the control table (§3, §6).
///
/// Identifies one (namespace, name, warehouse location, partition) tuple.
/// All six fields participate in the control table's primary key; the store
/// validates each as a safe SQL identifier before first use (§6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub source_namespace: String,
    pub source_name: String,
    pub target_db: String,
    pub target_schema: String,
    pub target_table: String,
    pub partition_id: String,
}

impl CheckpointKey {
    pub fn new(
        source_namespace: impl Into<String>,
        source_name: impl Into<String>,
        target_db: impl Into<String>,
        target_schema: impl Into<String>,
        target_table: impl Into<String>,
        partition_id: impl Into<String>,
    ) -> Self {
        Self {
            source_namespace: source_namespace.into(),
            source_name: source_name.into(),
            target_db: target_db.into(),
            target_schema: target_schema.into(),
            target_table: target_table.into(),
            partition_id: partition_id.into(),
        }
    }
}

/// A persisted watermark: the highest sequence number known committed to the
/// sink for one [`CheckpointKey`] (§3 "waterlevel").
///
/// `metadata_json` carries free-form diagnostic context (e.g. the row count
/// of the batch that produced this watermark); it is opaque to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub key: CheckpointKey,
    pub waterlevel: i64,
    pub metadata_json: Option<String>,
    pub inserted_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(key: CheckpointKey, waterlevel: i64, inserted_at: DateTime<Utc>) -> Self {
        Self {
            key,
            waterlevel,
            metadata_json: None,
            inserted_at,
        }
    }

    /// True if `self` would be a regression relative to `current`, i.e.
    /// writing it would violate checkpoint monotonicity (§8).
    pub fn regresses(&self, current: &Checkpoint) -> bool {
        debug_assert_eq!(self.key, current.key);
        self.waterlevel < current.waterlevel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CheckpointKey {
        CheckpointKey::new("ns", "name", "db", "schema", "table", "0")
    }

    #[test]
    fn lower_waterlevel_regresses() {
        let now = Utc::now();
        let current = Checkpoint::new(key(), 100, now);
        let attempted = Checkpoint::new(key(), 50, now);
        assert!(attempted.regresses(&current));
        assert!(!current.regresses(&attempted));
    }

    #[test]
    fn equal_waterlevel_does_not_regress() {
        let now = Utc::now();
        let current = Checkpoint::new(key(), 100, now);
        let same = Checkpoint::new(key(), 100, now);
        assert!(!same.regresses(&current));
    }
}

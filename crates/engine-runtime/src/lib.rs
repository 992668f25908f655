pub mod error;
pub mod orchestrator;
pub mod shutdown;

#[cfg(test)]
mod tests {
    use super::orchestrator::Orchestrator;
    use super::shutdown::ShutdownCoordinator;
    use async_trait::async_trait;
    use connectors::error::SnowflakeError;
    use connectors::snowflake::checkpoint_store::CheckpointStore;
    use engine_processing::identity::MappingIdentity;
    use engine_processing::mapping::{Mapping, MappingHandle};
    use model::checkpoint::{Checkpoint, CheckpointKey};
    use model::row::{Row, RowId};
    use model::sink::{ChannelClient, ChannelName};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use thiserror::Error;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Error)]
    #[error("fake sink error")]
    struct FakeSinkError;

    #[derive(Default)]
    struct FakeSink {
        open: Mutex<HashMap<ChannelName, Option<RowId>>>,
        ingested: Mutex<Vec<(RowId, Row)>>,
    }

    #[async_trait]
    impl ChannelClient for FakeSink {
        type Error = FakeSinkError;

        fn channel_name_for(&self, table: &str, partition_id: &str) -> Result<ChannelName, Self::Error> {
            Ok(ChannelName::new(format!("{table}_partition_{partition_id}_fake")))
        }

        async fn open_channel(&self, name: &ChannelName) -> Result<Option<RowId>, Self::Error> {
            let mut open = self.open.lock();
            let last = open.get(name).cloned().flatten();
            open.insert(name.clone(), last.clone());
            Ok(last)
        }

        async fn ingest_batch(&self, name: &ChannelName, rows: &[(RowId, Row)]) -> Result<bool, Self::Error> {
            if rows.is_empty() {
                return Ok(true);
            }
            let mut open = self.open.lock();
            let last_row = rows.last().map(|(id, _)| id.clone());
            open.insert(name.clone(), last_row);
            drop(open);
            self.ingested.lock().extend(rows.iter().cloned());
            Ok(true)
        }

        async fn close_channel(&self, name: &ChannelName) -> Result<(), Self::Error> {
            self.open.lock().remove(name);
            Ok(())
        }

        async fn close_client(&self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCheckpointStore {
        checkpoints: Mutex<HashMap<CheckpointKey, Checkpoint>>,
    }

    #[async_trait]
    impl CheckpointStore for FakeCheckpointStore {
        async fn save(&self, checkpoint: &Checkpoint) -> Result<(), SnowflakeError> {
            self.checkpoints.lock().insert(checkpoint.key.clone(), checkpoint.clone());
            Ok(())
        }

        async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, SnowflakeError> {
            Ok(self.checkpoints.lock().get(key).cloned())
        }

        async fn load_all_partitions(
            &self,
            namespace: &str,
            name: &str,
            target_db: &str,
            target_schema: &str,
            target_table: &str,
        ) -> Result<Vec<Checkpoint>, SnowflakeError> {
            Ok(self
                .checkpoints
                .lock()
                .values()
                .filter(|c| {
                    c.key.source_namespace == namespace
                        && c.key.source_name == name
                        && c.key.target_db == target_db
                        && c.key.target_schema == target_schema
                        && c.key.target_table == target_table
                })
                .cloned()
                .collect())
        }
    }

    fn identity() -> MappingIdentity {
        MappingIdentity {
            source_namespace: "ns".to_string(),
            source_name: "hub".to_string(),
            target_db: "db".to_string(),
            target_schema: "schema".to_string(),
            target_table: "table".to_string(),
        }
    }

    fn fast_retry() -> engine_core::retry::RetryPolicy {
        engine_core::retry::RetryPolicy::fixed(3, std::time::Duration::from_millis(0), std::time::Duration::from_millis(0))
    }

    fn test_mapping(name: &str) -> Box<dyn MappingHandle> {
        Box::new(Mapping::new(
            name.to_string(),
            identity(),
            Arc::new(FakeSink::default()),
            Arc::new(FakeCheckpointStore::default()),
            connectors::eventhub::mock::MockEventSource::new,
            100,
            std::time::Duration::from_secs(3600),
            fast_retry(),
            fast_retry(),
            engine_core::metrics::Metrics::new(),
        ))
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_after_init() {
        let cancel = CancellationToken::new();
        let mut orchestrator = Orchestrator::new(cancel.clone());

        orchestrator
            .init(vec![test_mapping("a"), test_mapping("b")])
            .await
            .unwrap();

        assert!(orchestrator.health().running);
        assert_eq!(orchestrator.stats().mapping_count, 2);

        orchestrator.shutdown().await;
        assert!(!orchestrator.health().running);

        // Second shutdown call must be a no-op, not a panic or a hang.
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_coordinator_tracks_requested_state() {
        let cancel = CancellationToken::new();
        let coordinator = ShutdownCoordinator::new(cancel.clone());
        assert!(!coordinator.is_shutdown_requested());
        coordinator.cancel_token().cancel();
        assert!(cancel.is_cancelled());
    }
}

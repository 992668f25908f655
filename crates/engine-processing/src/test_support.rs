//! In-memory test doubles for [`ChannelClient`] and
//! [`connectors::snowflake::checkpoint_store::CheckpointStore`], used by this
//! crate's own tests to exercise the flush protocol (§4.5, §8 S1-S5) without
//! a live Snowflake account.

use async_trait::async_trait;
use connectors::error::SnowflakeError;
use connectors::snowflake::checkpoint_store::CheckpointStore;
use model::checkpoint::{Checkpoint, CheckpointKey};
use model::row::{Row, RowId};
use model::sink::{ChannelClient, ChannelName};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FakeSinkError {
    #[error("simulated transport failure")]
    Transport,
    #[error("unauthorized")]
    Unauthorized,
    #[error("channel `{0}` is not open")]
    ChannelClosed(String),
}

/// Records every ingested row and can be told to fail the next N calls, to
/// simulate S3 (transient sink failure followed by recovery).
#[derive(Default)]
pub struct FakeSink {
    inner: Mutex<FakeSinkState>,
}

#[derive(Default)]
struct FakeSinkState {
    open_channels: HashMap<ChannelName, Option<RowId>>,
    ingested: Vec<(RowId, Row)>,
    fail_next_n_calls: usize,
    always_unauthorized: bool,
    ingest_call_count: usize,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_calls(&self, n: usize) {
        self.inner.lock().fail_next_n_calls = n;
    }

    pub fn set_always_unauthorized(&self, value: bool) {
        self.inner.lock().always_unauthorized = value;
    }

    pub fn ingested_rows(&self) -> Vec<(RowId, Row)> {
        self.inner.lock().ingested.clone()
    }

    pub fn ingest_call_count(&self) -> usize {
        self.inner.lock().ingest_call_count
    }
}

#[async_trait]
impl ChannelClient for FakeSink {
    type Error = FakeSinkError;

    fn channel_name_for(&self, table: &str, partition_id: &str) -> Result<ChannelName, Self::Error> {
        Ok(ChannelName::new(format!("{table}_partition_{partition_id}_fake")))
    }

    async fn open_channel(&self, name: &ChannelName) -> Result<Option<RowId>, Self::Error> {
        let mut state = self.inner.lock();
        let last = state.open_channels.get(name).cloned().flatten();
        state.open_channels.insert(name.clone(), last.clone());
        Ok(last)
    }

    async fn ingest_batch(&self, name: &ChannelName, rows: &[(RowId, Row)]) -> Result<bool, Self::Error> {
        if rows.is_empty() {
            return Ok(true);
        }

        let mut state = self.inner.lock();
        state.ingest_call_count += 1;

        if state.always_unauthorized {
            return Err(FakeSinkError::Unauthorized);
        }

        if !state.open_channels.contains_key(name) {
            return Err(FakeSinkError::ChannelClosed(name.to_string()));
        }

        if state.fail_next_n_calls > 0 {
            state.fail_next_n_calls -= 1;
            return Err(FakeSinkError::Transport);
        }

        let last_row = rows.last().map(|(id, _)| id.clone());
        state.open_channels.insert(name.clone(), last_row);
        state.ingested.extend(rows.iter().cloned());
        Ok(true)
    }

    async fn close_channel(&self, name: &ChannelName) -> Result<(), Self::Error> {
        self.inner.lock().open_channels.remove(name);
        Ok(())
    }

    async fn close_client(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// An in-memory checkpoint store keyed the same way the real control table
/// is, so tests can assert monotonic watermark progression (§8).
#[derive(Default)]
pub struct FakeCheckpointStore {
    checkpoints: Mutex<HashMap<CheckpointKey, Checkpoint>>,
    fail_next_n_saves: Mutex<usize>,
}

impl FakeCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_saves(&self, n: usize) {
        *self.fail_next_n_saves.lock() = n;
    }

    pub fn get(&self, key: &CheckpointKey) -> Option<Checkpoint> {
        self.checkpoints.lock().get(key).cloned()
    }
}

#[async_trait]
impl CheckpointStore for FakeCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), SnowflakeError> {
        let mut fail_count = self.fail_next_n_saves.lock();
        if *fail_count > 0 {
            *fail_count -= 1;
            return Err(SnowflakeError::CheckpointStore("simulated failure".to_string()));
        }
        drop(fail_count);

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

pub fn shared_sink() -> Arc<FakeSink> {
    Arc::new(FakeSink::new())
}

pub fn shared_checkpoint_store() -> Arc<FakeCheckpointStore> {
    Arc::new(FakeCheckpointStore::new())
}

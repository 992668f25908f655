use crate::consumer::{PartitionConsumer, assignment_from_checkpoint};
use crate::error::MappingError;
use crate::identity::MappingIdentity;
use async_trait::async_trait;
use connectors::snowflake::checkpoint_store::CheckpointStore;
use model::sink::{ChannelClient, ChannelName};
use model::source::PartitionEventSource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct MappingStats {
    pub messages_processed: u64,
    pub rows_appended: u64,
    pub batches_processed: u64,
    pub checkpoint_writes: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MappingHealth {
    pub running: bool,
    pub has_consumer: bool,
    pub latest_error: Option<String>,
}

/// Object-safe facade over [`Mapping`] so the orchestrator can hold
/// heterogeneous mappings (different source/sink/store type parameters) in
/// one collection (§4.7).
#[async_trait]
pub trait MappingHandle: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&mut self) -> Result<(), MappingError>;
    async fn run(&mut self, cancel: &CancellationToken);
    async fn stop(&mut self);
    fn stats(&self) -> MappingStats;
    fn health(&self) -> MappingHealth;
}

/// C6, the Mapping (§4.6). A thin composite over one consumer and the sink
/// and checkpoint store it shares with it.
pub struct Mapping<Source, Sink, Store>
where
    Source: PartitionEventSource,
    Sink: ChannelClient,
    Store: CheckpointStore,
{
    name: String,
    identity: MappingIdentity,
    /// One channel per partition, populated during `start()` once the
    /// source's actual partition set is known (§3, §4.3, §6).
    channels: HashMap<String, ChannelName>,
    sink: Arc<Sink>,
    checkpoint_store: Arc<Store>,
    consumer: Option<PartitionConsumer<Source, Sink, Store>>,
    source_factory: Option<Box<dyn FnOnce() -> Source + Send>>,
    consumer_builder: ConsumerBuilderState<Source, Sink, Store>,
    metrics: engine_core::metrics::Metrics,
    last_errors: Vec<String>,
    started: bool,
    stopped: bool,
}

/// Parameters retained until [`Mapping::start`] constructs the consumer —
/// building it earlier would mean opening network resources before the
/// orchestrator has committed to starting this mapping.
struct ConsumerBuilderState<Source, Sink, Store>
where
    Source: PartitionEventSource,
    Sink: ChannelClient,
    Store: CheckpointStore,
{
    max_batch_size: usize,
    max_batch_wait: std::time::Duration,
    sink_retry: engine_core::retry::RetryPolicy,
    checkpoint_retry: engine_core::retry::RetryPolicy,
    metrics: engine_core::metrics::Metrics,
    _marker: std::marker::PhantomData<(Source, Sink, Store)>,
}

impl<Source, Sink, Store> Mapping<Source, Sink, Store>
where
    Source: PartitionEventSource + Send + 'static,
    Sink: ChannelClient + Send + Sync + 'static,
    Store: CheckpointStore + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        identity: MappingIdentity,
        sink: Arc<Sink>,
        checkpoint_store: Arc<Store>,
        source_factory: impl FnOnce() -> Source + Send + 'static,
        max_batch_size: usize,
        max_batch_wait: std::time::Duration,
        sink_retry: engine_core::retry::RetryPolicy,
        checkpoint_retry: engine_core::retry::RetryPolicy,
        metrics: engine_core::metrics::Metrics,
    ) -> Self {
        Self {
            name: name.into(),
            identity,
            channels: HashMap::new(),
            sink,
            checkpoint_store,
            consumer: None,
            source_factory: Some(Box::new(source_factory)),
            consumer_builder: ConsumerBuilderState {
                max_batch_size,
                max_batch_wait,
                sink_retry,
                checkpoint_retry,
                metrics: metrics.clone(),
                _marker: std::marker::PhantomData,
            },
            metrics,
            last_errors: Vec::new(),
            started: false,
            stopped: false,
        }
    }
}

#[async_trait]
impl<Source, Sink, Store> MappingHandle for Mapping<Source, Sink, Store>
where
    Source: PartitionEventSource + Send + 'static,
    Sink: ChannelClient + Send + Sync + 'static,
    Store: CheckpointStore + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    /// Start the source, discover its real partition set, open one channel
    /// per partition, build the consumer, then assign every partition to it
    /// in a single call (§4.6, §6 "assign(partition_ids)").
    async fn start(&mut self) -> Result<(), MappingError> {
        if self.started {
            return Ok(());
        }

        let build = self
            .source_factory
            .take()
            .expect("Mapping::start called more than once without a source factory");
        let mut source = build();
        source
            .start()
            .await
            .map_err(|e| MappingError::StartFailed(self.name.clone(), e.to_string()))?;

        let partition_ids = source
            .partition_ids()
            .await
            .map_err(|e| MappingError::StartFailed(self.name.clone(), e.to_string()))?;

        let mut channels = HashMap::new();
        for partition_id in &partition_ids {
            let channel_name = self
                .sink
                .channel_name_for(&self.identity.target_table, partition_id)
                .map_err(|e| MappingError::StartFailed(self.name.clone(), e.to_string()))?;

            self.sink
                .open_channel(&channel_name)
                .await
                .map_err(|e| MappingError::StartFailed(self.name.clone(), e.to_string()))?;

            channels.insert(partition_id.clone(), channel_name);
        }
        self.channels = channels.clone();

        let mut consumer = PartitionConsumer::new(
            source,
            self.sink.clone(),
            self.checkpoint_store.clone(),
            channels,
            self.identity.clone(),
            self.consumer_builder.max_batch_size,
            self.consumer_builder.max_batch_wait,
            self.consumer_builder.sink_retry.clone(),
            self.consumer_builder.checkpoint_retry.clone(),
            self.consumer_builder.metrics.clone(),
        );

        let mut assignments = Vec::with_capacity(partition_ids.len());
        for partition_id in &partition_ids {
            let checkpoint = self
                .checkpoint_store
                .load(&model::checkpoint::CheckpointKey::new(
                    self.identity.source_namespace.clone(),
                    self.identity.source_name.clone(),
                    self.identity.target_db.clone(),
                    self.identity.target_schema.clone(),
                    self.identity.target_table.clone(),
                    partition_id.clone(),
                ))
                .await
                .map_err(|e| MappingError::StartFailed(self.name.clone(), e.to_string()))?;

            let resume_from = checkpoint.map(|c| c.waterlevel);
            assignments.push(assignment_from_checkpoint(partition_id.clone(), resume_from));
        }

        consumer
            .resume(assignments)
            .await
            .map_err(|e| MappingError::StartFailed(self.name.clone(), e.to_string()))?;

        self.consumer = Some(consumer);
        self.started = true;
        info!(mapping = %self.name, partitions = partition_ids.len(), "mapping started");
        Ok(())
    }

    async fn run(&mut self, cancel: &CancellationToken) {
        if let Some(consumer) = self.consumer.as_mut() {
            consumer.run(cancel).await;
        }
    }

    /// Stop consumer first so it can flush, then stop the sink. Idempotent:
    /// repeated calls after the first are a no-op (§4.6, §8 "shutdown
    /// idempotence").
    async fn stop(&mut self) {
        if self.stopped || !self.started {
            return;
        }

        if let Some(consumer) = self.consumer.take() {
            // The consumer's own `run` loop already performs the final
            // drain-and-flush on cancellation; dropping it here releases
            // its source handle. Its error log is kept for reporting after
            // stop, since the consumer itself is gone.
            self.last_errors = consumer.errors();
        }

        for channel_name in self.channels.values() {
            if let Err(e) = self.sink.close_channel(channel_name).await {
                tracing::warn!(mapping = %self.name, error = %e, "error closing channel during stop");
            }
        }

        self.stopped = true;
        info!(mapping = %self.name, "mapping stopped");
    }

    fn stats(&self) -> MappingStats {
        let snapshot = self.metrics.snapshot();
        let errors = self.consumer.as_ref().map(|c| c.errors()).unwrap_or_else(|| self.last_errors.clone());
        MappingStats {
            messages_processed: snapshot.events_consumed,
            rows_appended: snapshot.rows_appended,
            batches_processed: snapshot.batches_flushed,
            checkpoint_writes: snapshot.checkpoint_writes,
            errors,
        }
    }

    fn health(&self) -> MappingHealth {
        let errors = self.consumer.as_ref().map(|c| c.errors()).unwrap_or_else(|| self.last_errors.clone());
        MappingHealth {
            running: self.started && !self.stopped,
            has_consumer: self.consumer.is_some(),
            latest_error: errors.last().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{shared_checkpoint_store, shared_sink};
    use connectors::eventhub::mock::MockEventSource;
    use engine_core::retry::RetryPolicy;
    use model::event::Event;

    fn identity() -> MappingIdentity {
        MappingIdentity {
            source_namespace: "ns".to_string(),
            source_name: "hub".to_string(),
            target_db: "db".to_string(),
            target_schema: "schema".to_string(),
            target_table: "table".to_string(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::fixed(3, std::time::Duration::from_millis(0), std::time::Duration::from_millis(0))
    }

    #[tokio::test]
    async fn start_run_stop_flushes_and_stop_is_idempotent() {
        let sink = shared_sink();
        let store = shared_checkpoint_store();

        let mut mapping = Mapping::new(
            "hub-to-table",
            identity(),
            sink.clone(),
            store.clone(),
            || {
                let mut source = MockEventSource::new();
                source.push(Event::new("0", 1, b"a".to_vec()));
                source.push(Event::new("0", 2, b"b".to_vec()));
                source
            },
            100,
            std::time::Duration::from_secs(3600),
            fast_retry(),
            fast_retry(),
            engine_core::metrics::Metrics::new(),
        );

        mapping.start().await.unwrap();
        assert!(mapping.health().running);

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let run_fut = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
        };
        let (_, _) = tokio::join!(mapping.run(&cancel_clone), run_fut);

        mapping.stop().await;
        assert!(!mapping.health().running);

        let stats_after_first_stop = mapping.stats();
        assert_eq!(stats_after_first_stop.rows_appended, 2);
        mapping.stop().await;
        let stats_after_second_stop = mapping.stats();
        assert_eq!(stats_after_first_stop.rows_appended, stats_after_second_stop.rows_appended);
        assert_eq!(sink.ingested_rows().len(), 2);
    }
}

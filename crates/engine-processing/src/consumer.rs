use crate::identity::MappingIdentity;
use chrono::Utc;
use engine_core::accumulator::BatchAccumulator;
use engine_core::metrics::Metrics;
use engine_core::retry::{RetryDisposition, RetryPolicy};
use model::checkpoint::{Checkpoint, CheckpointKey};
use model::row::{Row, RowId};
use model::sink::{ChannelClient, ChannelName};
use model::source::{PartitionAssignment, PartitionEventSource};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const TIME_SEAL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Classifies a sink/checkpoint-store error by inspecting its rendered
/// message. A dedicated error type would carry a structured kind, but this
/// mirrors how the original connector distinguished "401 Unauthorized" from
/// transient failures: by substring (§8 S4).
fn classify_by_message<E: std::fmt::Display>(err: &E) -> RetryDisposition {
    let text = err.to_string().to_lowercase();
    let fatal = ["unauthorized", "401", "forbidden", "403", "permission denied", "invalid identifier"];
    if fatal.iter().any(|needle| text.contains(needle)) {
        RetryDisposition::Stop
    } else {
        RetryDisposition::Retry
    }
}

/// C5, the Partition Consumer (§4.5). Owns one subscription to the source
/// for one mapping and every partition the source assigns to it.
pub struct PartitionConsumer<Source, Sink, Store>
where
    Source: PartitionEventSource,
    Sink: ChannelClient,
    Store: connectors::snowflake::checkpoint_store::CheckpointStore,
{
    source: Source,
    sink: std::sync::Arc<Sink>,
    checkpoint_store: std::sync::Arc<Store>,
    /// One channel per owned partition (§3, §4.3 "one streaming channel per
    /// source partition"), keyed by partition id.
    channels: HashMap<String, ChannelName>,
    identity: MappingIdentity,
    accumulator: BatchAccumulator,
    sink_retry: RetryPolicy,
    checkpoint_retry: RetryPolicy,
    metrics: Metrics,
    errors: Mutex<Vec<String>>,
}

impl<Source, Sink, Store> PartitionConsumer<Source, Sink, Store>
where
    Source: PartitionEventSource,
    Sink: ChannelClient,
    Store: connectors::snowflake::checkpoint_store::CheckpointStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Source,
        sink: std::sync::Arc<Sink>,
        checkpoint_store: std::sync::Arc<Store>,
        channels: HashMap<String, ChannelName>,
        identity: MappingIdentity,
        max_batch_size: usize,
        max_batch_wait: Duration,
        sink_retry: RetryPolicy,
        checkpoint_retry: RetryPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            sink,
            checkpoint_store,
            channels,
            identity,
            accumulator: BatchAccumulator::new(max_batch_size, max_batch_wait),
            sink_retry,
            checkpoint_retry,
            metrics,
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    fn record_error(&self, message: String) {
        warn!(error = %message, "partition consumer error");
        self.errors.lock().unwrap().push(message);
        self.metrics.record_failure();
    }

    /// Assigns every owned partition to the source in one call, so the
    /// source can hand events from any of them back through `next_event`
    /// instead of only ever remembering the last one assigned (§6
    /// `assign(partition_ids)`).
    pub async fn resume(&mut self, assignments: Vec<PartitionAssignment>) -> Result<(), crate::error::ConsumerError> {
        self.source
            .assign(assignments)
            .await
            .map_err(|e| crate::error::ConsumerError::Source(e.to_string()))
    }

    /// Drives the consumer until `cancel` fires, then performs one final
    /// drain-and-flush before returning (§4.5, §5 "cancellation").
    pub async fn run(&mut self, cancel: &CancellationToken) {
        self.source.start().await.map_or_else(
            |e| self.record_error(format!("source start failed: {e}")),
            |_| (),
        );

        let mut ticker = tokio::time::interval(TIME_SEAL_POLL_INTERVAL);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("consumer cancelled, performing final flush");
                    break;
                }

                event = self.source.next_event() => {
                    match event {
                        Ok(Some(event)) => {
                            let sealed_by_size = self.accumulator.add(event);
                            if sealed_by_size {
                                self.flush().await;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            self.record_error(format!("source read failed: {e}"));
                        }
                    }
                }

                _ = ticker.tick() => {
                    if self.accumulator.is_sealed_by_time() {
                        self.flush().await;
                    }
                }
            }
        }

        self.flush().await;
        let _ = self.source.stop().await;
    }

    /// The flush protocol of §4.5, applied once per partition so each
    /// partition's rows land in its own channel (§3, §4.3): seal, group by
    /// partition, ingest, checkpoint, acknowledge.
    async fn flush(&mut self) {
        if self.accumulator.is_empty() {
            return;
        }

        let drained = self.accumulator.drain();
        let checkpoints = drained.last_sequence_by_partition;

        let mut rows_by_partition: HashMap<String, Vec<(RowId, Row)>> = HashMap::new();
        for (row_id, row) in drained.rows {
            rows_by_partition.entry(row.partition_id.clone()).or_default().push((row_id, row));
        }

        for (partition_id, waterlevel) in checkpoints {
            let rows = rows_by_partition.remove(&partition_id).unwrap_or_default();
            let row_count = rows.len();

            let Some(channel_name) = self.channels.get(&partition_id).cloned() else {
                self.record_error(format!("no open channel for partition {partition_id}"));
                continue;
            };

            let sink = self.sink.clone();
            let rows_for_call = rows;

            let outcome = self
                .sink_retry
                .run(
                    "sink_ingest",
                    &self.metrics,
                    move || {
                        let sink = sink.clone();
                        let channel_name = channel_name.clone();
                        let rows = rows_for_call.clone();
                        async move { sink.ingest_batch(&channel_name, &rows).await }
                    },
                    classify_by_message,
                )
                .await;

            let ingested = match outcome {
                Ok(true) => true,
                Ok(false) => {
                    self.record_error(format!("sink reported batch ingest failure for partition {partition_id}"));
                    false
                }
                Err(e) => {
                    self.record_error(format!("sink ingest exhausted retries for partition {partition_id}: {e}"));
                    false
                }
            };

            if !ingested {
                // Step 2, false branch: no checkpoint, no acknowledge. The
                // source re-delivers these events on its own timer.
                continue;
            }

            self.metrics.record_rows_appended(row_count as u64);
            self.metrics.record_batch_flushed();

            self.checkpoint_partition(&partition_id, waterlevel).await;

            if let Err(e) = self.source.acknowledge(&partition_id, waterlevel).await {
                self.record_error(format!("source acknowledge failed for partition {partition_id}: {e}"));
            }
        }
    }

    async fn checkpoint_partition(&self, partition_id: &str, waterlevel: i64) {
        let key = CheckpointKey::new(
            self.identity.source_namespace.clone(),
            self.identity.source_name.clone(),
            self.identity.target_db.clone(),
            self.identity.target_schema.clone(),
            self.identity.target_table.clone(),
            partition_id.to_string(),
        );

        // Guard against writing a regression (§8, §9 "last-added vs.
        // maximum"): out-of-order redelivery after a rebalance could hand the
        // accumulator an older last-added sequence than what is already
        // durable.
        if let Ok(Some(current)) = self.checkpoint_store.load(&key).await {
            let candidate = Checkpoint::new(key.clone(), waterlevel, Utc::now());
            if candidate.regresses(&current) {
                warn!(partition_id, waterlevel, stored = current.waterlevel, "skipping regressive checkpoint write");
                return;
            }
        }

        let checkpoint = Checkpoint::new(key, waterlevel, Utc::now());
        let store = self.checkpoint_store.clone();

        let result = self
            .checkpoint_retry
            .run(
                "checkpoint_store",
                &self.metrics,
                move || {
                    let store = store.clone();
                    let checkpoint = checkpoint.clone();
                    async move { store.save(&checkpoint).await }
                },
                classify_by_message,
            )
            .await;

        match result {
            Ok(()) => self.metrics.record_checkpoint_write(),
            Err(e) => {
                // §4.5: "on final failure, log and proceed" — the sink write
                // already stands, so at-least-once holds even if the
                // watermark lags until the next successful checkpoint.
                warn!(partition_id, waterlevel, error = %e, "checkpoint upsert exhausted retries, proceeding");
            }
        }
    }
}

pub(crate) fn assignment_from_checkpoint(partition_id: impl Into<String>, waterlevel: Option<i64>) -> PartitionAssignment {
    PartitionAssignment {
        partition_id: partition_id.into(),
        starting_sequence_number: waterlevel,
    }
}

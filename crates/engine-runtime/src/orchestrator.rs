use crate::error::OrchestratorError;
use engine_processing::mapping::{MappingHandle, MappingStats};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct OrchestratorStats {
    pub mapping_count: usize,
    pub messages_processed: u64,
    pub rows_appended: u64,
    pub batches_processed: u64,
    pub checkpoint_writes: u64,
    pub errors: Vec<String>,
    pub per_mapping: Vec<(String, MappingStats)>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorHealth {
    pub running: bool,
    pub mapping_count: usize,
    pub errors: Vec<String>,
}

/// C7, the Orchestrator (§4.7). Owns the lifecycle of N independent
/// mappings and of the process: construct-and-start every mapping (rolling
/// back on any failure), run them concurrently, and coordinate an idempotent
/// shutdown in reverse init order.
pub struct Orchestrator {
    mappings: Vec<Box<dyn MappingHandle>>,
    cancel_token: CancellationToken,
    graceful_shutdown_timeout: Duration,
    running: bool,
    started_at: Option<Instant>,
    shutdown_started: bool,
}

impl Orchestrator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            mappings: Vec::new(),
            cancel_token,
            graceful_shutdown_timeout: DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT,
            running: false,
            started_at: None,
            shutdown_started: false,
        }
    }

    pub fn with_graceful_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_shutdown_timeout = timeout;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// *Init* (§4.7): starts every mapping in order. On any failure, stops
    /// every mapping started so far (in reverse order) before returning the
    /// error — the orchestrator never leaves a partially-started fleet
    /// running.
    pub async fn init(&mut self, mappings: Vec<Box<dyn MappingHandle>>) -> Result<(), OrchestratorError> {
        for mut mapping in mappings {
            let name = mapping.name().to_string();
            match mapping.start().await {
                Ok(()) => {
                    info!(mapping = %name, "mapping started");
                    self.mappings.push(mapping);
                }
                Err(e) => {
                    error!(mapping = %name, error = %e, "mapping failed to start, rolling back");
                    self.rollback().await;
                    return Err(OrchestratorError::MappingStartFailed(name, e.to_string()));
                }
            }
        }

        self.running = true;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    async fn rollback(&mut self) {
        while let Some(mut mapping) = self.mappings.pop() {
            mapping.stop().await;
        }
    }

    /// *Run* (§4.7): one concurrent task per mapping's `run()`, blocked on
    /// until every task returns (normal completion or cancellation).
    pub async fn run(&mut self) {
        if self.mappings.is_empty() {
            warn!("orchestrator run() called with no mappings");
            return;
        }

        let cancel = self.cancel_token.clone();
        let mut handles: Vec<JoinHandle<Box<dyn MappingHandle>>> = Vec::with_capacity(self.mappings.len());

        for mut mapping in std::mem::take(&mut self.mappings) {
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                mapping.run(&cancel).await;
                mapping
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(mapping) => self.mappings.push(mapping),
                Err(e) => error!(error = %e, "mapping task panicked"),
            }
        }
    }

    /// *Shutdown* (§4.7): idempotent. Cancels all tasks (a no-op if `run()`
    /// already observed cancellation), then stops every mapping in reverse
    /// init order.
    pub async fn shutdown(&mut self) {
        if self.shutdown_started {
            return;
        }
        self.shutdown_started = true;
        self.cancel_token.cancel();

        let shutdown = async {
            while let Some(mut mapping) = self.mappings.pop() {
                mapping.stop().await;
            }
        };

        if tokio::time::timeout(self.graceful_shutdown_timeout, shutdown).await.is_err() {
            warn!(
                timeout = ?self.graceful_shutdown_timeout,
                "graceful shutdown timed out; remaining mappings left unstopped"
            );
        }

        self.running = false;
        info!("orchestrator shutdown complete");
    }

    pub fn stats(&self) -> OrchestratorStats {
        let mut stats = OrchestratorStats {
            mapping_count: self.mappings.len(),
            ..Default::default()
        };

        for mapping in &self.mappings {
            let mapping_stats = mapping.stats();
            stats.messages_processed += mapping_stats.messages_processed;
            stats.rows_appended += mapping_stats.rows_appended;
            stats.batches_processed += mapping_stats.batches_processed;
            stats.checkpoint_writes += mapping_stats.checkpoint_writes;
            stats.errors.extend(mapping_stats.errors.clone());
            stats.per_mapping.push((mapping.name().to_string(), mapping_stats));
        }

        stats
    }

    pub fn health(&self) -> OrchestratorHealth {
        let mut errors = Vec::new();
        for mapping in &self.mappings {
            let health = mapping.health();
            if let Some(e) = health.latest_error {
                errors.push(format!("{}: {e}", mapping.name()));
            }
        }

        OrchestratorHealth {
            running: self.running,
            mapping_count: self.mappings.len(),
            errors,
        }
    }
}

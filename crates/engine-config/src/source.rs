use std::time::Duration;

/// Per-stream source tunables (§6 "Source topology").
#[derive(Debug, Clone)]
pub struct StreamTunables {
    pub max_batch_size: usize,
    pub max_wait_time: Duration,
    pub prefetch_count: u32,
    pub checkpoint_interval_seconds: u64,
    pub max_message_batch_size: usize,
    pub batch_timeout_seconds: u64,
}

impl Default for StreamTunables {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            max_wait_time: Duration::from_secs(10),
            prefetch_count: 300,
            checkpoint_interval_seconds: 30,
            max_message_batch_size: 500,
            batch_timeout_seconds: 30,
        }
    }
}

/// One source stream (an Event Hub) within the configured namespace.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub name: String,
    pub consumer_group: String,
    pub connection_string: Option<String>,
    pub tunables: StreamTunables,
}

/// Source topology root: one namespace hosting any number of streams.
#[derive(Debug, Clone)]
pub struct SourceTopology {
    pub namespace: String,
    pub streams: Vec<StreamConfig>,
}

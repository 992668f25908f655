use crate::row::{Row, RowId};
use async_trait::async_trait;
use std::fmt;

/// Opaque handle to an open ingestion channel on the streaming sink (§6).
///
/// The concrete cache key format (`"{table}_partition_{partition_id}_{client_suffix}"`)
/// is the connector's concern; callers only need equality and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The external streaming sink interface (§6, "Streaming Sink"). A connector
/// implements this once per warehouse product; C3 depends only on this trait.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Derives the channel name for `table`'s `partition_id` (§3's
    /// `"{table}_partition_{partition_id}_{client_suffix}"`), so generic
    /// callers can open one channel per partition without depending on a
    /// concrete sink type.
    fn channel_name_for(&self, table: &str, partition_id: &str) -> Result<ChannelName, Self::Error>;

    /// Opens (or returns from cache) the channel for `name`, returning the
    /// last row id the sink has durably committed for it, if any — the basis
    /// for in-process dedup against a partial prior append.
    async fn open_channel(&self, name: &ChannelName) -> Result<Option<RowId>, Self::Error>;

    /// Appends rows to an already-open channel as one atomic ingest. Empty
    /// `rows` is a no-op that returns `true` without a network call (§4.3,
    /// §8 "empty batch flush"). A transport-level error (auth failure,
    /// connection reset) is surfaced as `Err`; the sink itself never
    /// translates a partial-row failure into `Err` — it returns `false` so
    /// the caller's retry engine, not the sink, decides what happens next
    /// (§9 "wrap(fn) → fn").
    async fn ingest_batch(&self, name: &ChannelName, rows: &[(RowId, Row)]) -> Result<bool, Self::Error>;

    async fn close_channel(&self, name: &ChannelName) -> Result<(), Self::Error>;

    async fn close_client(&self) -> Result<(), Self::Error>;
}

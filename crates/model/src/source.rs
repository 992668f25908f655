use crate::event::Event;
use async_trait::async_trait;

/// A contiguous run of partitions assigned to one consumer (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    pub partition_id: String,
    pub starting_sequence_number: Option<i64>,
}

/// The external event source interface (§6, "Partition Event Source").
///
/// A production implementation wraps an Event Hubs consumer client; tests use
/// an in-memory double. C5 depends only on this trait, never on a concrete
/// SDK type.
#[async_trait]
pub trait PartitionEventSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn start(&mut self) -> Result<(), Self::Error>;

    /// The full partition set this source exposes, discovered from the
    /// transport's own management surface (§6 `assign(partition_ids)`).
    /// Called after [`PartitionEventSource::start`], before the first
    /// [`PartitionEventSource::assign`].
    async fn partition_ids(&self) -> Result<Vec<String>, Self::Error>;

    /// Begins reading every partition in `assignments`, each starting just
    /// after its own resume point. Must be callable again after
    /// [`PartitionEventSource::stop`] with updated assignments (checkpoint
    /// resume, §4.5).
    async fn assign(&mut self, assignments: Vec<PartitionAssignment>) -> Result<(), Self::Error>;

    /// Blocks until at least one event is available on any assigned
    /// partition, or the source is stopped, in which case it returns
    /// `Ok(None)`.
    async fn next_event(&mut self) -> Result<Option<Event>, Self::Error>;

    /// Tells the source's own transport that every event on `partition_id`
    /// up to and including `up_to_sequence` has been durably flushed, so its
    /// store advances too (§4.5 flush protocol, step 4).
    async fn acknowledge(&mut self, partition_id: &str, up_to_sequence: i64) -> Result<(), Self::Error>;

    async fn stop(&mut self) -> Result<(), Self::Error>;
}

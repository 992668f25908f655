use crate::error::EventHubError;
use async_trait::async_trait;
use model::event::Event;
use model::source::{PartitionAssignment, PartitionEventSource};
use std::collections::VecDeque;

/// An in-memory [`PartitionEventSource`] for tests. Events are queued ahead
/// of time via [`MockEventSource::push`] and replayed in order starting just
/// after the assigned `starting_sequence_number`, so tests can exercise
/// checkpoint-resume without a live Event Hubs namespace.
pub struct MockEventSource {
    known_partition_ids: Vec<String>,
    assignments: Vec<PartitionAssignment>,
    queue: VecDeque<Event>,
    started: bool,
    stopped: bool,
    acknowledged: std::collections::HashMap<String, i64>,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self {
            known_partition_ids: vec!["0".to_string()],
            assignments: Vec::new(),
            queue: VecDeque::new(),
            started: false,
            stopped: false,
            acknowledged: std::collections::HashMap::new(),
        }
    }

    /// Overrides the partition set [`PartitionEventSource::partition_ids`]
    /// reports, for tests exercising more than the default single partition.
    pub fn with_partition_ids(mut self, partition_ids: Vec<String>) -> Self {
        self.known_partition_ids = partition_ids;
        self
    }

    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    pub fn acknowledged_up_to(&self, partition_id: &str) -> Option<i64> {
        self.acknowledged.get(partition_id).copied()
    }
}

impl Default for MockEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartitionEventSource for MockEventSource {
    type Error = EventHubError;

    async fn start(&mut self) -> Result<(), Self::Error> {
        self.started = true;
        Ok(())
    }

    async fn partition_ids(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self.known_partition_ids.clone())
    }

    async fn assign(&mut self, assignments: Vec<PartitionAssignment>) -> Result<(), Self::Error> {
        for assignment in &assignments {
            if let Some(resume_after) = assignment.starting_sequence_number {
                let partition_id = assignment.partition_id.clone();
                self.queue.retain(|e| e.partition_id != partition_id || e.sequence_number > resume_after);
            }
        }
        self.assignments = assignments;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<Event>, Self::Error> {
        if self.assignments.is_empty() {
            return Err(EventHubError::NoAssignment);
        }
        if self.stopped {
            return Ok(None);
        }
        Ok(self.queue.pop_front())
    }

    async fn acknowledge(&mut self, partition_id: &str, up_to_sequence: i64) -> Result<(), Self::Error> {
        self.acknowledged.insert(partition_id.to_string(), up_to_sequence);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), Self::Error> {
        self.stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resumes_after_the_assigned_sequence_number() {
        let mut source = MockEventSource::new();
        source.push(Event::new("0", 1, vec![]));
        source.push(Event::new("0", 2, vec![]));
        source.push(Event::new("0", 3, vec![]));

        source.start().await.unwrap();
        source
            .assign(vec![PartitionAssignment { partition_id: "0".into(), starting_sequence_number: Some(1) }])
            .await
            .unwrap();

        let first = source.next_event().await.unwrap().unwrap();
        assert_eq!(first.sequence_number, 2);
        let second = source.next_event().await.unwrap().unwrap();
        assert_eq!(second.sequence_number, 3);
        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_causes_subsequent_reads_to_return_none() {
        let mut source = MockEventSource::new();
        source.push(Event::new("0", 1, vec![]));
        source.start().await.unwrap();
        source
            .assign(vec![PartitionAssignment { partition_id: "0".into(), starting_sequence_number: None }])
            .await
            .unwrap();
        source.stop().await.unwrap();
        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_only_drops_events_on_the_resumed_partition() {
        let mut source = MockEventSource::new().with_partition_ids(vec!["0".to_string(), "1".to_string()]);
        source.push(Event::new("0", 1, vec![]));
        source.push(Event::new("1", 5, vec![]));

        source.start().await.unwrap();
        source
            .assign(vec![
                PartitionAssignment { partition_id: "0".into(), starting_sequence_number: Some(1) },
                PartitionAssignment { partition_id: "1".into(), starting_sequence_number: None },
            ])
            .await
            .unwrap();

        let mut remaining = Vec::new();
        while let Some(event) = source.next_event().await.unwrap() {
            remaining.push(event);
        }
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].partition_id, "1");
    }
}

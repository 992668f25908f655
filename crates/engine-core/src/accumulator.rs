use chrono::Utc;
use model::batch::Batch;
use model::event::Event;
use model::row::{self, Row, RowId};
use std::collections::HashMap;
use std::time::Duration;

/// A sealed batch's warehouse-ready contents: rows to append plus the
/// per-partition resume point to checkpoint after a successful append (§4.5).
#[derive(Debug)]
pub struct DrainedBatch {
    pub rows: Vec<(RowId, Row)>,
    pub last_sequence_by_partition: HashMap<String, i64>,
}

/// C4, the Batch Accumulator (§4.4). Buffers events for one partition until
/// either `max_batch_size` is reached or `max_batch_wait` elapses since the
/// oldest buffered event, then seals and drains.
pub struct BatchAccumulator {
    max_batch_size: usize,
    max_batch_wait: Duration,
    current: Batch,
}

impl BatchAccumulator {
    pub fn new(max_batch_size: usize, max_batch_wait: Duration) -> Self {
        Self {
            max_batch_size,
            max_batch_wait,
            current: Batch::new(Utc::now()),
        }
    }

    /// Adds `event` to the current batch. Returns `true` if the batch is now
    /// full and should be flushed without waiting for the timer.
    pub fn add(&mut self, event: Event) -> bool {
        self.current.push(event);
        self.current.len() >= self.max_batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// True once `max_batch_wait` has elapsed since the first event in the
    /// current batch was added (§4.4 "time-based seal").
    pub fn is_sealed_by_time(&self) -> bool {
        if self.current.is_empty() {
            return false;
        }
        Utc::now()
            .signed_duration_since(self.current.created_at())
            .to_std()
            .map(|elapsed| elapsed >= self.max_batch_wait)
            .unwrap_or(false)
    }

    /// Seals the current batch, serializes its events into rows with a fresh
    /// ingestion timestamp, and starts a new empty batch.
    pub fn drain(&mut self) -> DrainedBatch {
        self.current.seal();
        let sealed = std::mem::replace(&mut self.current, Batch::new(Utc::now()));

        let (events, last_sequence_by_partition) = sealed.into_parts();
        let ingestion_timestamp = Utc::now();
        let rows = events
            .iter()
            .map(|event| {
                let row = row::serialize(event, ingestion_timestamp);
                (row.row_id(), row)
            })
            .collect();

        DrainedBatch {
            rows,
            last_sequence_by_partition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_signals_full_at_max_size() {
        let mut acc = BatchAccumulator::new(2, Duration::from_secs(3600));
        assert!(!acc.add(Event::new("0", 1, vec![])));
        assert!(acc.add(Event::new("0", 2, vec![])));
    }

    #[test]
    fn drain_resets_to_an_empty_batch() {
        let mut acc = BatchAccumulator::new(10, Duration::from_secs(3600));
        acc.add(Event::new("0", 1, b"a".to_vec()));
        acc.add(Event::new("1", 7, b"b".to_vec()));

        let drained = acc.drain();
        assert_eq!(drained.rows.len(), 2);
        assert_eq!(drained.last_sequence_by_partition.get("0"), Some(&1));
        assert_eq!(drained.last_sequence_by_partition.get("1"), Some(&7));
        assert!(acc.is_empty());
    }

    #[test]
    fn empty_accumulator_is_never_sealed_by_time() {
        let acc = BatchAccumulator::new(10, Duration::from_millis(0));
        assert!(!acc.is_sealed_by_time());
    }

    #[test]
    fn zero_wait_seals_immediately_once_nonempty() {
        let mut acc = BatchAccumulator::new(10, Duration::from_millis(0));
        acc.add(Event::new("0", 1, vec![]));
        assert!(acc.is_sealed_by_time());
    }
}

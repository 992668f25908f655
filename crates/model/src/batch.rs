use crate::event::Event;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// An ordered sequence of [`Event`]s plus the per-partition resume point.
///
/// `last_sequence_by_partition` records the *last-added* sequence number for
/// each partition that contributed to the batch, not the maximum — under
/// strict in-order delivery these coincide; the accumulator is fed in
/// source-delivery order, so last-added is the correct resume point even
/// after an out-of-order redelivery (spec.md §9, Open Question 1, resolved in
/// DESIGN.md).
///
/// Mutable until [`Batch::seal`]; immutable afterwards.
#[derive(Debug)]
pub struct Batch {
    events: Vec<Event>,
    last_sequence_by_partition: HashMap<String, i64>,
    created_at: DateTime<Utc>,
    sealed: bool,
}

impl Batch {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            events: Vec::new(),
            last_sequence_by_partition: HashMap::new(),
            created_at,
            sealed: false,
        }
    }

    /// Appends an event in delivery order. Panics if the batch is already
    /// sealed — that would be a state-machine misuse by the caller.
    pub fn push(&mut self, event: Event) {
        assert!(!self.sealed, "push on a sealed batch");
        self.last_sequence_by_partition
            .insert(event.partition_id.clone(), event.sequence_number);
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Consumes the batch, returning its events in delivery order and an
    /// immutable snapshot of the per-partition resume map.
    pub fn into_parts(self) -> (Vec<Event>, HashMap<String, i64>) {
        (self.events, self.last_sequence_by_partition)
    }

    pub fn last_sequence_by_partition(&self) -> &HashMap<String, i64> {
        &self.last_sequence_by_partition
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_last_added_not_maximum() {
        let mut b = Batch::new(Utc::now());
        b.push(Event::new("0", 10, vec![]));
        b.push(Event::new("0", 5, vec![])); // out-of-order redelivery
        assert_eq!(b.last_sequence_by_partition().get("0"), Some(&5));
    }

    #[test]
    #[should_panic(expected = "sealed")]
    fn push_after_seal_panics() {
        let mut b = Batch::new(Utc::now());
        b.seal();
        b.push(Event::new("0", 1, vec![]));
    }
}

//! Size-bounded record accumulator owned by one stream subscriber.

use metasync_types::Record;

use crate::errors::BatchFullError;

/// Upper bound on up-front allocation; larger batches grow on demand.
const PREALLOCATE_LIMIT: usize = 1024;

/// Records waiting to be delivered to one destination.
///
/// A capacity of `0` means unbounded: the batch is never full and is only
/// drained when the stream ends. No interior locking; each batch has a
/// single owner.
#[derive(Debug, Default)]
pub struct Batch {
    data: Vec<Record>,
    capacity: usize,
}

impl Batch {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
            capacity,
        }
    }

    /// Append a record.
    ///
    /// # Errors
    ///
    /// Returns [`BatchFullError`] if the batch is already at capacity.
    pub fn add(&mut self, record: Record) -> Result<(), BatchFullError> {
        if self.is_full() {
            return Err(BatchFullError);
        }
        self.data.push(record);
        Ok(())
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.capacity != 0 && self.data.len() >= self.capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take every buffered record, leaving the batch empty.
    pub fn flush(&mut self) -> Vec<Record> {
        std::mem::replace(
            &mut self.data,
            Vec::with_capacity(self.capacity.min(PREALLOCATE_LIMIT)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn record(i: usize) -> Record {
        Record::new(json!({ "urn": format!("urn:test:{i}") }))
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(10)]
    fn fills_up_at_capacity(#[case] capacity: usize) {
        let mut batch = Batch::new(capacity);
        for i in 0..capacity {
            assert!(!batch.is_full());
            batch.add(record(i)).unwrap();
        }
        assert!(batch.is_full());
        assert_eq!(batch.add(record(capacity)), Err(BatchFullError));
        assert_eq!(batch.len(), capacity);
    }

    #[test]
    fn huge_capacity_does_not_preallocate() {
        let mut batch = Batch::new(usize::MAX);
        batch.add(record(0)).unwrap();
        assert!(!batch.is_full());
        assert_eq!(batch.capacity(), usize::MAX);
        assert_eq!(batch.flush().len(), 1);
        assert!(batch.is_empty());
    }

    #[test]
    fn zero_capacity_is_never_full() {
        let mut batch = Batch::new(0);
        for i in 0..1_000 {
            batch.add(record(i)).unwrap();
        }
        assert!(!batch.is_full());
        assert_eq!(batch.len(), 1_000);
    }

    #[test]
    fn flush_returns_contents_in_order_and_resets() {
        let mut batch = Batch::new(3);
        batch.add(record(0)).unwrap();
        batch.add(record(1)).unwrap();

        let flushed = batch.flush();
        let urns: Vec<&str> = flushed.iter().filter_map(Record::urn).collect();
        assert_eq!(urns, ["urn:test:0", "urn:test:1"]);
        assert!(batch.is_empty());
        assert!(!batch.is_full());
        assert_eq!(batch.capacity(), 3);
    }

    #[test]
    fn flush_on_empty_batch_is_empty() {
        let mut batch = Batch::new(2);
        assert!(batch.is_empty());
        assert!(batch.flush().is_empty());
    }
}

//! Result batch producer
//!
//! Pulls rows from a lazy, non-restartable sequence in bounded batches.
//! `has_more` is decided by peeking one row ahead, so it is exact: it is
//! false precisely when the sequence is drained. Asking for another batch
//! after that is an error rather than an empty batch.

use serde_json::Value;
use std::iter::Peekable;
use tracing::debug;

use crate::error::{CursorError, Result};
use crate::query::Rows;

/// One slice of result rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub rows: Vec<Value>,
    pub has_more: bool,
}

pub struct BatchProducer {
    rows: Option<Peekable<Rows>>,
    delivered: u64,
}

impl BatchProducer {
    /// Wrap a freshly started row sequence.
    pub fn new(rows: Rows) -> Self {
        Self {
            rows: Some(rows.peekable()),
            delivered: 0,
        }
    }

    /// Continue from stored state: the undelivered rows and the count
    /// already handed out.
    pub fn resume(remaining: Vec<Value>, delivered: u64) -> Self {
        let rows: Rows = Box::new(remaining.into_iter());
        Self {
            rows: Some(rows.peekable()),
            delivered,
        }
    }

    /// Pull up to `size` rows.
    pub fn next_batch(&mut self, size: usize) -> Result<Batch> {
        if size == 0 {
            return Err(CursorError::InvalidBatchSize(0).into());
        }
        let rows = self.rows.as_mut().ok_or(CursorError::Exhausted)?;

        let batch: Vec<Value> = rows.by_ref().take(size).collect();
        let has_more = rows.peek().is_some();
        self.delivered += batch.len() as u64;

        if has_more {
            debug!(
                "Produced batch of {} rows (total: {})",
                batch.len(),
                self.delivered
            );
        } else {
            debug!("Row sequence exhausted after {} rows", self.delivered);
            self.rows = None;
        }

        Ok(Batch {
            rows: batch,
            has_more,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.rows.is_none()
    }

    /// Rows handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Drain the undelivered rows for persistence.
    pub fn into_remaining(self) -> Vec<Value> {
        self.rows.map(|rows| rows.collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: i64) -> Rows {
        Box::new((0..n).map(|i| json!(i)))
    }

    #[test]
    fn test_batches_until_exhausted() {
        let mut producer = BatchProducer::new(rows(4));
        let first = producer.next_batch(2).unwrap();
        assert_eq!(first.rows, vec![json!(0), json!(1)]);
        assert!(first.has_more);

        let second = producer.next_batch(2).unwrap();
        assert_eq!(second.rows, vec![json!(2), json!(3)]);
        assert!(!second.has_more);
        assert!(producer.is_exhausted());
        assert_eq!(producer.delivered(), 4);
    }

    #[test]
    fn test_next_batch_after_exhaustion_fails() {
        let mut producer = BatchProducer::new(rows(1));
        assert!(!producer.next_batch(5).unwrap().has_more);
        let err = producer.next_batch(5).unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn test_empty_result() {
        let mut producer = BatchProducer::new(rows(0));
        let batch = producer.next_batch(3).unwrap();
        assert!(batch.rows.is_empty());
        assert!(!batch.has_more);
    }

    #[test]
    fn test_resume_continues_where_left_off() {
        let mut producer = BatchProducer::new(rows(5));
        producer.next_batch(2).unwrap();
        let delivered = producer.delivered();
        let remaining = producer.into_remaining();
        assert_eq!(remaining, vec![json!(2), json!(3), json!(4)]);

        let mut resumed = BatchProducer::resume(remaining, delivered);
        let batch = resumed.next_batch(2).unwrap();
        assert_eq!(batch.rows, vec![json!(2), json!(3)]);
        assert!(batch.has_more);
        assert_eq!(resumed.delivered(), 4);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut producer = BatchProducer::new(rows(1));
        assert!(producer.next_batch(0).is_err());
        assert!(!producer.is_exhausted());
    }

    #[test]
    fn test_exact_multiple_reports_no_more() {
        let mut producer = BatchProducer::new(rows(2));
        assert!(!producer.next_batch(2).unwrap().has_more);
    }
}

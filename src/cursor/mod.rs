//! Cursor management
//!
//! - `producer`: lazy batch production with explicit exhaustion
//! - `store`: cluster-wide registry of paused cursors with check-out/check-in
//! - `service`: create / continue / delete request lifecycle
//! - `sweeper`: background removal of expired cursors

pub mod producer;
pub mod service;
pub mod store;
pub mod sweeper;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub use producer::{Batch, BatchProducer};
pub use service::{CreateCursorRequest, CursorResponse, CursorService, CursorSettings};
pub use store::{CheckedOut, CursorStore, Lease, MemoryCursorStore};
pub use sweeper::spawn_sweeper;

/// Opaque cursor identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorId(String);

impl CursorId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CursorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CursorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serializable snapshot of one paused query execution.
///
/// Only cursors with undelivered rows are ever stored, so `remaining` is
/// non-empty for every record held by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorRecord {
    pub id: CursorId,
    pub owner: String,
    pub database: String,
    /// Collections the query reads, fixed at creation
    pub collections: BTreeSet<String>,
    pub batch_size: usize,
    /// Total row count, present when counting was requested
    pub count: Option<u64>,
    /// Rows delivered so far
    pub delivered: u64,
    /// Undelivered rows, materialized when the first batch is cut.
    ///
    /// The whole remainder is re-serialized on every check-in, so reading
    /// `n` rows in batches of `b` costs `O(n²/b)` serialization work. Large
    /// results should be read with a large batch size.
    pub remaining: Vec<Value>,
    /// Idle time-to-live in seconds
    pub ttl_secs: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CursorRecord {
    pub fn has_more(&self) -> bool {
        !self.remaining.is_empty()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Push the deadline to `now + ttl`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.expires_at = deadline(now, Duration::from_secs(self.ttl_secs));
    }
}

/// `now + ttl`, saturating at the largest representable instant.
pub fn deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

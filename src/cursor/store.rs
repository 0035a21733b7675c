//! Cursor state store
//!
//! Maps cursor ids to serialized [`CursorRecord`] snapshots. The store is the
//! single serialization point for a cursor:
//! - `checkout` hands a record to exactly one request at a time; a second
//!   checkout of the same id fails with a conflict
//! - `checkin` returns the advanced record, `release` destroys it
//! - `delete` always wins: it removes the entry even while checked out, and
//!   the holder's later `checkin`/`release` reports the cursor as not found
//! - the expiry sweep skips checked-out cursors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{CursorId, CursorRecord};
use crate::error::{CursorError, Result};

/// Proof of exclusive ownership of a checked-out cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    id: CursorId,
    token: Uuid,
}

/// A record borrowed from the store for the duration of one request.
#[derive(Debug)]
pub struct CheckedOut {
    pub record: CursorRecord,
    pub lease: Lease,
}

/// Cluster-wide cursor registry reachable from every coordinator.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Store a new cursor; an existing id is a conflict.
    async fn put(&self, record: &CursorRecord) -> Result<()>;

    /// Read a live, unexpired cursor without taking ownership.
    async fn get(&self, id: &CursorId, now: DateTime<Utc>) -> Result<Option<CursorRecord>>;

    /// Remove a cursor whether or not it is checked out; returns whether it existed.
    async fn delete(&self, id: &CursorId) -> Result<bool>;

    /// Take exclusive ownership of a cursor.
    async fn checkout(&self, id: &CursorId, now: DateTime<Utc>) -> Result<CheckedOut>;

    /// Return a checked-out cursor with its new state.
    async fn checkin(&self, lease: Lease, record: &CursorRecord) -> Result<()>;

    /// Destroy a checked-out cursor.
    async fn release(&self, lease: Lease) -> Result<()>;

    /// Remove idle cursors whose deadline has passed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<CursorId>>;

    /// Number of stored cursors.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug)]
struct Slot {
    snapshot: Vec<u8>,
    expires_at: DateTime<Utc>,
    lease: Option<Uuid>,
}

/// Store keeping serialized snapshots in memory, shared through an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    slots: Mutex<HashMap<CursorId, Slot>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &CursorId) -> crate::error::CursordError {
    CursorError::NotFound(id.to_string()).into()
}

fn conflict(id: &CursorId) -> crate::error::CursordError {
    CursorError::Conflict(id.to_string()).into()
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn put(&self, record: &CursorRecord) -> Result<()> {
        let snapshot = serde_json::to_vec(record)?;
        let mut slots = self.slots.lock().await;
        if slots.contains_key(&record.id) {
            return Err(conflict(&record.id));
        }
        slots.insert(
            record.id.clone(),
            Slot {
                snapshot,
                expires_at: record.expires_at,
                lease: None,
            },
        );
        Ok(())
    }

    async fn get(&self, id: &CursorId, now: DateTime<Utc>) -> Result<Option<CursorRecord>> {
        let slots = self.slots.lock().await;
        match slots.get(id) {
            Some(slot) if slot.lease.is_some() || slot.expires_at > now => {
                Ok(Some(serde_json::from_slice(&slot.snapshot)?))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: &CursorId) -> Result<bool> {
        let removed = self.slots.lock().await.remove(id);
        if let Some(slot) = &removed {
            debug!(
                "Deleted cursor {}{}",
                id,
                if slot.lease.is_some() { " while checked out" } else { "" }
            );
        }
        Ok(removed.is_some())
    }

    async fn checkout(&self, id: &CursorId, now: DateTime<Utc>) -> Result<CheckedOut> {
        let mut slots = self.slots.lock().await;
        let (leased, expired) = match slots.get(id) {
            Some(slot) => (slot.lease.is_some(), slot.expires_at <= now),
            None => return Err(not_found(id)),
        };
        if leased {
            return Err(conflict(id));
        }
        if expired {
            slots.remove(id);
            debug!("Cursor {} expired on checkout", id);
            return Err(not_found(id));
        }
        let slot = slots.get_mut(id).ok_or_else(|| not_found(id))?;
        let record: CursorRecord = serde_json::from_slice(&slot.snapshot)?;
        let token = Uuid::new_v4();
        slot.lease = Some(token);
        Ok(CheckedOut {
            record,
            lease: Lease {
                id: id.clone(),
                token,
            },
        })
    }

    async fn checkin(&self, lease: Lease, record: &CursorRecord) -> Result<()> {
        if record.id != lease.id {
            return Err(conflict(&record.id));
        }
        let snapshot = serde_json::to_vec(record)?;
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&lease.id).ok_or_else(|| not_found(&lease.id))?;
        if slot.lease != Some(lease.token) {
            return Err(conflict(&lease.id));
        }
        slot.snapshot = snapshot;
        slot.expires_at = record.expires_at;
        slot.lease = None;
        Ok(())
    }

    async fn release(&self, lease: Lease) -> Result<()> {
        let mut slots = self.slots.lock().await;
        let held = match slots.get(&lease.id) {
            Some(slot) => slot.lease == Some(lease.token),
            None => return Err(not_found(&lease.id)),
        };
        if !held {
            return Err(conflict(&lease.id));
        }
        slots.remove(&lease.id);
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<CursorId>> {
        let mut slots = self.slots.lock().await;
        let expired: Vec<CursorId> = slots
            .iter()
            .filter(|(_, slot)| slot.lease.is_none() && slot.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            slots.remove(id);
        }
        Ok(expired)
    }

    async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::deadline;
    use chrono::TimeDelta;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn record(now: DateTime<Utc>) -> CursorRecord {
        CursorRecord {
            id: CursorId::generate(),
            owner: "alice".into(),
            database: "_system".into(),
            collections: BTreeSet::from(["animals".to_string()]),
            batch_size: 2,
            count: None,
            delivered: 2,
            remaining: vec![json!(3), json!(4)],
            ttl_secs: 30,
            created_at: now,
            expires_at: deadline(now, Duration::from_secs(30)),
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryCursorStore::new();
        let now = Utc::now();
        let rec = record(now);
        store.put(&rec).await.unwrap();
        assert_eq!(store.get(&rec.id, now).await.unwrap(), Some(rec.clone()));
        assert!(store.delete(&rec.id).await.unwrap());
        assert!(!store.delete(&rec.id).await.unwrap());
        assert_eq!(store.get(&rec.id, now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_put_conflicts() {
        let store = MemoryCursorStore::new();
        let rec = record(Utc::now());
        store.put(&rec).await.unwrap();
        assert!(store.put(&rec).await.unwrap_err().is_cursor_conflict());
    }

    #[tokio::test]
    async fn test_second_checkout_conflicts() {
        let store = MemoryCursorStore::new();
        let now = Utc::now();
        let rec = record(now);
        store.put(&rec).await.unwrap();

        let first = store.checkout(&rec.id, now).await.unwrap();
        let err = store.checkout(&rec.id, now).await.unwrap_err();
        assert!(err.is_cursor_conflict());

        let mut advanced = first.record.clone();
        advanced.remaining.remove(0);
        store.checkin(first.lease, &advanced).await.unwrap();

        let again = store.checkout(&rec.id, now).await.unwrap();
        assert_eq!(again.record.remaining, vec![json!(4)]);
    }

    #[tokio::test]
    async fn test_delete_wins_over_checkout() {
        let store = MemoryCursorStore::new();
        let now = Utc::now();
        let rec = record(now);
        store.put(&rec).await.unwrap();

        let held = store.checkout(&rec.id, now).await.unwrap();
        assert!(store.delete(&rec.id).await.unwrap());
        let err = store.checkin(held.lease, &held.record).await.unwrap_err();
        assert!(err.is_cursor_not_found());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_release_destroys() {
        let store = MemoryCursorStore::new();
        let now = Utc::now();
        let rec = record(now);
        store.put(&rec).await.unwrap();
        let held = store.checkout(&rec.id, now).await.unwrap();
        store.release(held.lease).await.unwrap();
        assert!(store.checkout(&rec.id, now).await.unwrap_err().is_cursor_not_found());
    }

    #[tokio::test]
    async fn test_stale_lease_rejected() {
        let store = MemoryCursorStore::new();
        let now = Utc::now();
        let rec = record(now);
        store.put(&rec).await.unwrap();
        let held = store.checkout(&rec.id, now).await.unwrap();
        let stale = held.lease.clone();
        store.checkin(held.lease, &held.record).await.unwrap();
        assert!(store.release(stale).await.unwrap_err().is_cursor_conflict());
    }

    #[tokio::test]
    async fn test_expired_checkout_is_not_found() {
        let store = MemoryCursorStore::new();
        let now = Utc::now();
        let rec = record(now);
        store.put(&rec).await.unwrap();
        let later = now + TimeDelta::seconds(60);
        assert_eq!(store.get(&rec.id, later).await.unwrap(), None);
        assert!(store.checkout(&rec.id, later).await.unwrap_err().is_cursor_not_found());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_skips_checked_out() {
        let store = MemoryCursorStore::new();
        let now = Utc::now();
        let idle = record(now);
        let busy = record(now);
        store.put(&idle).await.unwrap();
        store.put(&busy).await.unwrap();
        let _held = store.checkout(&busy.id, now).await.unwrap();

        let swept = store
            .sweep_expired(now + TimeDelta::seconds(60))
            .await
            .unwrap();
        assert_eq!(swept, vec![idle.id.clone()]);
        assert_eq!(store.len().await, 1);
    }
}

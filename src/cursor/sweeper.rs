//! Background expiry of idle cursors.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::CursorStore;

/// Run `sweep_expired` every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    store: Arc<dyn CursorStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        debug!("Cursor sweeper started (interval: {:?})", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.sweep_expired(Utc::now()).await {
                        Ok(swept) if !swept.is_empty() => {
                            info!("Expired {} idle cursor(s)", swept.len());
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Cursor sweep failed: {}", e),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("Cursor sweeper stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{CursorId, CursorRecord, MemoryCursorStore};
    use chrono::TimeDelta;
    use std::collections::BTreeSet;

    fn expired_record() -> CursorRecord {
        let past = Utc::now() - TimeDelta::seconds(120);
        CursorRecord {
            id: CursorId::generate(),
            owner: "alice".into(),
            database: "_system".into(),
            collections: BTreeSet::new(),
            batch_size: 1,
            count: None,
            delivered: 1,
            remaining: vec![serde_json::json!(1)],
            ttl_secs: 1,
            created_at: past,
            expires_at: past + TimeDelta::seconds(1),
        }
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_and_stops() {
        let store = Arc::new(MemoryCursorStore::new());
        store.put(&expired_record()).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(store.clone(), Duration::from_millis(10), cancel.clone());

        for _ in 0..100 {
            if store.len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len().await, 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}

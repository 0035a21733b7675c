//! Cursor protocol handler
//!
//! Lifecycle: `CREATED -> ACTIVE -> {EXHAUSTED | EXPIRED | DELETED}`.
//!
//! Authorization is evaluated on every request against the current grants:
//! at creation for the caller, at continuation for the owner. A cursor whose
//! first batch drains the result is never stored.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::producer::BatchProducer;
use super::store::{CursorStore, Lease};
use super::{CursorId, CursorRecord, deadline};
use crate::auth::{AuthorizationGate, Identity};
use crate::catalog::Catalog;
use crate::config::CursorConfig;
use crate::error::{AuthError, CursorError, Result};
use crate::query::{BoundQuery, Query, Rows};

/// Attempts at finding an unused cursor id before giving up.
const ID_ATTEMPTS: usize = 3;

/// Limits and defaults applied to cursor requests.
#[derive(Debug, Clone)]
pub struct CursorSettings {
    pub default_batch_size: usize,
    pub max_batch_size: usize,
    pub ttl: Duration,
}

impl Default for CursorSettings {
    fn default() -> Self {
        Self::from(&CursorConfig::default())
    }
}

impl From<&CursorConfig> for CursorSettings {
    fn from(config: &CursorConfig) -> Self {
        Self {
            default_batch_size: config.default_batch_size,
            max_batch_size: config.max_batch_size,
            ttl: Duration::from_secs(config.ttl),
        }
    }
}

/// Body of a create-cursor request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCursorRequest {
    pub query: String,
    #[serde(default)]
    pub bind_vars: Map<String, Value>,
    #[serde(default)]
    pub count: bool,
    #[serde(default)]
    pub batch_size: Option<u64>,
}

/// Body of every successful cursor response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorResponse {
    pub result: Vec<Value>,
    pub has_more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CursorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub error: bool,
    pub code: u16,
}

/// Implements create / continue / delete on top of the shared store.
#[derive(Clone)]
pub struct CursorService {
    store: Arc<dyn CursorStore>,
    gate: AuthorizationGate,
    catalog: Arc<Catalog>,
    settings: CursorSettings,
}

impl CursorService {
    pub fn new(
        store: Arc<dyn CursorStore>,
        gate: AuthorizationGate,
        catalog: Arc<Catalog>,
        settings: CursorSettings,
    ) -> Self {
        Self {
            store,
            gate,
            catalog,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn CursorStore> {
        &self.store
    }

    /// Run a query and return its first batch, persisting the rest.
    pub async fn create(
        &self,
        identity: &Identity,
        database: &str,
        request: CreateCursorRequest,
    ) -> Result<CursorResponse> {
        let batch_size = self.resolve_batch_size(request.batch_size)?;

        let query = Query::parse(&request.query)?;
        let bound = BoundQuery::bind(&query, &request.bind_vars)?;
        let collections = bound.referenced_collections();

        self.gate
            .authorize_read_all(&identity.username, database, &collections)
            .await?;

        let rows = bound.execute(&self.catalog, database).await?;
        let (rows, count): (Rows, Option<u64>) = if request.count {
            let all: Vec<Value> = rows.collect();
            let total = all.len() as u64;
            (Box::new(all.into_iter()), Some(total))
        } else {
            (rows, None)
        };

        let mut producer = BatchProducer::new(rows);
        let batch = producer.next_batch(batch_size)?;

        if !batch.has_more {
            debug!(
                "Query for {} finished in first batch ({} rows)",
                identity.username,
                batch.rows.len()
            );
            return Ok(CursorResponse {
                result: batch.rows,
                has_more: false,
                id: None,
                count,
                error: false,
                code: 201,
            });
        }

        let now = Utc::now();
        let delivered = producer.delivered();
        let mut record = CursorRecord {
            id: CursorId::generate(),
            owner: identity.username.clone(),
            database: database.to_string(),
            collections,
            batch_size,
            count,
            delivered,
            remaining: producer.into_remaining(),
            ttl_secs: self.settings.ttl.as_secs(),
            created_at: now,
            expires_at: deadline(now, self.settings.ttl),
        };
        self.persist(&mut record).await?;

        info!(
            "Created cursor {} for {} on {} ({} rows pending)",
            record.id,
            record.owner,
            record.database,
            record.remaining.len()
        );

        Ok(CursorResponse {
            result: batch.rows,
            has_more: true,
            id: Some(record.id),
            count,
            error: false,
            code: 201,
        })
    }

    /// Deliver the next batch of a stored cursor.
    pub async fn next(
        &self,
        identity: &Identity,
        database: &str,
        id: &CursorId,
    ) -> Result<CursorResponse> {
        let now = Utc::now();
        let checked = self.store.checkout(id, now).await?;
        let lease = checked.lease;
        let mut record = checked.record;

        if record.database != database {
            self.give_back(lease, &record).await;
            return Err(CursorError::NotFound(id.to_string()).into());
        }
        if record.owner != identity.username {
            self.give_back(lease, &record).await;
            return Err(AuthError::NotOwner {
                user: identity.username.clone(),
                cursor: id.to_string(),
            }
            .into());
        }
        if let Err(e) = self
            .gate
            .authorize_read_all(&record.owner, &record.database, &record.collections)
            .await
        {
            self.give_back(lease, &record).await;
            return Err(e);
        }

        let remaining = std::mem::take(&mut record.remaining);
        let mut producer = BatchProducer::resume(remaining, record.delivered);
        let batch = match producer.next_batch(record.batch_size) {
            Ok(batch) => batch,
            Err(e) => {
                self.store.release(lease).await?;
                return Err(e);
            }
        };

        if batch.has_more {
            record.delivered = producer.delivered();
            record.remaining = producer.into_remaining();
            record.touch(now);
            self.store.checkin(lease, &record).await?;
            debug!(
                "Cursor {} advanced to {} rows ({} pending)",
                id,
                record.delivered,
                record.remaining.len()
            );
        } else {
            self.store.release(lease).await?;
            info!(
                "Cursor {} exhausted after {} rows",
                id,
                producer.delivered()
            );
        }

        Ok(CursorResponse {
            result: batch.rows,
            has_more: batch.has_more,
            id: batch.has_more.then(|| id.clone()),
            count: record.count,
            error: false,
            code: 200,
        })
    }

    /// Remove a cursor. Deleting an absent cursor succeeds.
    pub async fn delete(&self, identity: &Identity, database: &str, id: &CursorId) -> Result<()> {
        let Some(record) = self.store.get(id, Utc::now()).await? else {
            debug!("Delete of absent cursor {}", id);
            return Ok(());
        };
        if record.database != database {
            return Ok(());
        }
        if record.owner != identity.username {
            return Err(AuthError::NotOwner {
                user: identity.username.clone(),
                cursor: id.to_string(),
            }
            .into());
        }
        if self.store.delete(id).await? {
            info!("Deleted cursor {}", id);
        }
        Ok(())
    }

    fn resolve_batch_size(&self, requested: Option<u64>) -> Result<usize> {
        match requested {
            None => Ok(self.settings.default_batch_size),
            Some(0) => Err(CursorError::InvalidBatchSize(0).into()),
            Some(n) => usize::try_from(n)
                .ok()
                .filter(|n| *n <= self.settings.max_batch_size)
                .ok_or_else(|| CursorError::InvalidBatchSize(n).into()),
        }
    }

    async fn persist(&self, record: &mut CursorRecord) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.put(record).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_cursor_conflict() && attempt < ID_ATTEMPTS => {
                    warn!("Cursor id {} already taken, regenerating", record.id);
                    record.id = CursorId::generate();
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Return a rejected cursor to the store unchanged.
    async fn give_back(&self, lease: Lease, record: &CursorRecord) {
        if let Err(e) = self.store.checkin(lease, record).await {
            warn!("Could not return cursor {} to store: {}", record.id, e);
        }
    }
}

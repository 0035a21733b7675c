//! Authorization gate
//!
//! Evaluation order for a collection: explicit collection grant, else the
//! database grant, else deny. A collection-level `none` therefore denies even
//! when the database grant would allow access.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::{GrantLevel, GrantSource, SYSTEM_DATABASE};
use crate::error::{AuthError, Result};

/// Evaluates access rights against the current grant state.
#[derive(Clone)]
pub struct AuthorizationGate {
    source: Arc<dyn GrantSource>,
}

impl AuthorizationGate {
    pub fn new(source: Arc<dyn GrantSource>) -> Self {
        Self { source }
    }

    /// Effective level of `user` on `database/collection`.
    pub async fn effective_level(
        &self,
        user: &str,
        database: &str,
        collection: &str,
    ) -> Result<GrantLevel> {
        let grants = self.source.grants(user, database, Some(collection)).await?;
        Ok(grants
            .collection
            .or(grants.database)
            .unwrap_or(GrantLevel::None))
    }

    pub async fn can_read(&self, user: &str, database: &str, collection: &str) -> Result<bool> {
        Ok(self
            .effective_level(user, database, collection)
            .await?
            .allows_read())
    }

    pub async fn can_write(&self, user: &str, database: &str, collection: &str) -> Result<bool> {
        Ok(self
            .effective_level(user, database, collection)
            .await?
            .allows_write())
    }

    /// Database-level `rw` on the system database.
    pub async fn is_admin(&self, user: &str) -> Result<bool> {
        let grants = self.source.grants(user, SYSTEM_DATABASE, None).await?;
        Ok(grants.database == Some(GrantLevel::ReadWrite))
    }

    /// Database-level `rw` on `database`, or admin.
    pub async fn can_manage_database(&self, user: &str, database: &str) -> Result<bool> {
        let grants = self.source.grants(user, database, None).await?;
        if grants.database == Some(GrantLevel::ReadWrite) {
            return Ok(true);
        }
        self.is_admin(user).await
    }

    pub async fn require_admin(&self, user: &str) -> Result<()> {
        if self.is_admin(user).await? {
            Ok(())
        } else {
            Err(AuthError::AdminRequired(user.to_string()).into())
        }
    }

    /// Fail with the first collection (in name order) `user` may not read.
    pub async fn authorize_read_all(
        &self,
        user: &str,
        database: &str,
        collections: &BTreeSet<String>,
    ) -> Result<()> {
        for collection in collections {
            if !self.can_read(user, database, collection).await? {
                debug!("Read of {}/{} denied for {}", database, collection, user);
                return Err(AuthError::ReadDenied {
                    user: user.to_string(),
                    database: database.to_string(),
                    collection: collection.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub async fn authorize_write(&self, user: &str, database: &str, collection: &str) -> Result<()> {
        if self.can_write(user, database, collection).await? {
            Ok(())
        } else {
            Err(AuthError::WriteDenied {
                user: user.to_string(),
                database: database.to_string(),
                collection: collection.to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserRegistry;

    async fn setup() -> (Arc<UserRegistry>, AuthorizationGate) {
        let registry = Arc::new(UserRegistry::new());
        registry.create_user("alice", "pass1").await.unwrap();
        registry.create_user("bob", "pass2").await.unwrap();
        for user in ["alice", "bob"] {
            registry
                .grant_database(user, "_system", GrantLevel::ReadOnly)
                .await
                .unwrap();
            registry
                .grant_collection(user, "_system", "animals", GrantLevel::ReadOnly)
                .await
                .unwrap();
        }
        registry
            .grant_collection("alice", "_system", "fruits", GrantLevel::ReadOnly)
            .await
            .unwrap();
        registry
            .grant_collection("bob", "_system", "fruits", GrantLevel::None)
            .await
            .unwrap();
        let gate = AuthorizationGate::new(registry.clone());
        (registry, gate)
    }

    #[tokio::test]
    async fn test_collection_none_overrides_database_grant() {
        let (_, gate) = setup().await;
        assert!(gate.can_read("alice", "_system", "fruits").await.unwrap());
        assert!(!gate.can_read("bob", "_system", "fruits").await.unwrap());
        assert!(gate.can_read("bob", "_system", "animals").await.unwrap());
    }

    #[tokio::test]
    async fn test_database_grant_applies_without_collection_grant() {
        let (_, gate) = setup().await;
        assert!(gate.can_read("bob", "_system", "vegetables").await.unwrap());
        assert!(!gate.can_write("bob", "_system", "vegetables").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_grant_denies() {
        let (_, gate) = setup().await;
        assert!(!gate.can_read("alice", "other", "animals").await.unwrap());
        assert!(!gate.can_read("mallory", "_system", "animals").await.unwrap());
    }

    #[tokio::test]
    async fn test_revocation_is_seen_immediately() {
        let (registry, gate) = setup().await;
        assert!(gate.can_read("alice", "_system", "animals").await.unwrap());
        registry
            .grant_collection("alice", "_system", "animals", GrantLevel::None)
            .await
            .unwrap();
        assert!(!gate.can_read("alice", "_system", "animals").await.unwrap());
    }

    #[tokio::test]
    async fn test_authorize_read_all_names_denied_collection() {
        let (_, gate) = setup().await;
        let collections: BTreeSet<String> =
            ["animals", "fruits"].iter().map(|s| s.to_string()).collect();
        let err = gate
            .authorize_read_all("bob", "_system", &collections)
            .await
            .unwrap_err();
        assert!(err.is_authorization_denied());
        assert!(err.to_string().contains("fruits"));
        assert!(
            gate.authorize_read_all("alice", "_system", &collections)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_admin_requires_system_rw() {
        let (registry, gate) = setup().await;
        assert!(!gate.is_admin("alice").await.unwrap());
        registry
            .grant_database("alice", "_system", GrantLevel::ReadWrite)
            .await
            .unwrap();
        assert!(gate.is_admin("alice").await.unwrap());
        assert!(gate.require_admin("bob").await.is_err());
    }
}

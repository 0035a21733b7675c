//! In-memory user store holding passwords and grants.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CredentialValidator, GrantLevel, GrantSource, Identity, ResolvedGrants};
use crate::config::UserConfig;
use crate::error::{AuthError, Result};

#[derive(Debug, Clone, Default)]
struct DatabaseGrants {
    level: Option<GrantLevel>,
    collections: HashMap<String, GrantLevel>,
}

#[derive(Debug, Clone)]
struct UserEntry {
    password: String,
    databases: HashMap<String, DatabaseGrants>,
}

/// Thread-safe user store shared by every coordinator.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<String, UserEntry>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from statically configured users.
    pub fn from_config(users: &[UserConfig]) -> Self {
        let mut map = HashMap::new();
        for user in users {
            let databases = user
                .databases
                .iter()
                .map(|(db, grants)| {
                    let grants = DatabaseGrants {
                        level: grants.level,
                        collections: grants
                            .collections
                            .iter()
                            .map(|(c, l)| (c.clone(), *l))
                            .collect(),
                    };
                    (db.clone(), grants)
                })
                .collect();
            map.insert(
                user.username.clone(),
                UserEntry {
                    password: user.password.clone(),
                    databases,
                },
            );
        }
        Self {
            users: RwLock::new(map),
        }
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(AuthError::DuplicateUser(username.to_string()).into());
        }
        users.insert(
            username.to_string(),
            UserEntry {
                password: password.to_string(),
                databases: HashMap::new(),
            },
        );
        debug!("Created user {}", username);
        Ok(())
    }

    pub async fn remove_user(&self, username: &str) -> Result<()> {
        self.users
            .write()
            .await
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| AuthError::UnknownUser(username.to_string()).into())
    }

    pub async fn user_exists(&self, username: &str) -> bool {
        self.users.read().await.contains_key(username)
    }

    pub async fn grant_database(&self, user: &str, database: &str, level: GrantLevel) -> Result<()> {
        self.with_database(user, database, |grants| grants.level = Some(level))
            .await?;
        debug!("Granted {} on database {} to {}", level, database, user);
        Ok(())
    }

    /// Remove the database-level grant; collection grants are kept.
    pub async fn revoke_database(&self, user: &str, database: &str) -> Result<()> {
        self.with_database(user, database, |grants| grants.level = None)
            .await
    }

    pub async fn grant_collection(
        &self,
        user: &str,
        database: &str,
        collection: &str,
        level: GrantLevel,
    ) -> Result<()> {
        self.with_database(user, database, |grants| {
            grants.collections.insert(collection.to_string(), level);
        })
        .await?;
        debug!(
            "Granted {} on collection {}/{} to {}",
            level, database, collection, user
        );
        Ok(())
    }

    /// Remove an explicit collection grant so the database grant applies again.
    pub async fn revoke_collection(&self, user: &str, database: &str, collection: &str) -> Result<()> {
        self.with_database(user, database, |grants| {
            grants.collections.remove(collection);
        })
        .await
    }

    async fn with_database<F>(&self, user: &str, database: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut DatabaseGrants),
    {
        let mut users = self.users.write().await;
        let entry = users
            .get_mut(user)
            .ok_or_else(|| AuthError::UnknownUser(user.to_string()))?;
        f(entry.databases.entry(database.to_string()).or_default());
        Ok(())
    }
}

#[async_trait]
impl GrantSource for UserRegistry {
    async fn grants(
        &self,
        user: &str,
        database: &str,
        collection: Option<&str>,
    ) -> Result<ResolvedGrants> {
        let users = self.users.read().await;
        let Some(db) = users.get(user).and_then(|u| u.databases.get(database)) else {
            return Ok(ResolvedGrants::default());
        };
        Ok(ResolvedGrants {
            database: db.level,
            collection: collection.and_then(|c| db.collections.get(c).copied()),
        })
    }
}

#[async_trait]
impl CredentialValidator for UserRegistry {
    async fn validate(&self, username: &str, password: &str) -> Option<Identity> {
        let users = self.users.read().await;
        users
            .get(username)
            .filter(|u| u.password == password)
            .map(|_| Identity::new(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_credentials() {
        let registry = UserRegistry::new();
        registry.create_user("alice", "pass1").await.unwrap();
        assert_eq!(
            registry.validate("alice", "pass1").await,
            Some(Identity::new("alice"))
        );
        assert_eq!(registry.validate("alice", "wrong").await, None);
        assert_eq!(registry.validate("bob", "pass1").await, None);
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let registry = UserRegistry::new();
        registry.create_user("alice", "a").await.unwrap();
        assert!(registry.create_user("alice", "b").await.is_err());
    }

    #[tokio::test]
    async fn test_grants_round_trip() {
        let registry = UserRegistry::new();
        registry.create_user("bob", "pass2").await.unwrap();
        registry
            .grant_database("bob", "_system", GrantLevel::ReadOnly)
            .await
            .unwrap();
        registry
            .grant_collection("bob", "_system", "fruits", GrantLevel::None)
            .await
            .unwrap();

        let grants = registry.grants("bob", "_system", Some("fruits")).await.unwrap();
        assert_eq!(grants.database, Some(GrantLevel::ReadOnly));
        assert_eq!(grants.collection, Some(GrantLevel::None));

        registry
            .revoke_collection("bob", "_system", "fruits")
            .await
            .unwrap();
        let grants = registry.grants("bob", "_system", Some("fruits")).await.unwrap();
        assert_eq!(grants.collection, None);
    }

    #[tokio::test]
    async fn test_grant_for_unknown_user_fails() {
        let registry = UserRegistry::new();
        assert!(
            registry
                .grant_database("ghost", "_system", GrantLevel::ReadWrite)
                .await
                .is_err()
        );
    }
}

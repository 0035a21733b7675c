//! In-memory document catalog
//!
//! Stands in for the storage engine: databases hold named collections of JSON
//! documents in insertion order. Readers take a [`Snapshot`], a shared
//! immutable view, so a query keeps iterating a consistent state while
//! writers proceed (copy-on-write through `Arc::make_mut`).

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::SYSTEM_DATABASE;
use crate::error::{CatalogError, Result};

/// Immutable view of a collection's documents.
pub type Snapshot = Arc<Vec<Value>>;

#[derive(Debug, Default)]
struct Collection {
    documents: Snapshot,
    keys: HashSet<String>,
    next_key: u64,
    next_rev: u64,
}

#[derive(Debug, Default)]
struct Database {
    collections: HashMap<String, Collection>,
}

/// Key, id and revision assigned to a stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub key: String,
    pub id: String,
    pub rev: String,
}

/// Databases, collections and documents shared by all coordinators.
#[derive(Debug)]
pub struct Catalog {
    databases: RwLock<HashMap<String, Database>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create a catalog holding only the empty system database.
    pub fn new() -> Self {
        let mut databases = HashMap::new();
        databases.insert(SYSTEM_DATABASE.to_string(), Database::default());
        Self {
            databases: RwLock::new(databases),
        }
    }

    pub async fn create_database(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut dbs = self.databases.write().await;
        if dbs.contains_key(name) {
            return Err(CatalogError::DuplicateCollection(name.to_string()).into());
        }
        dbs.insert(name.to_string(), Database::default());
        Ok(())
    }

    pub async fn database_exists(&self, name: &str) -> bool {
        self.databases.read().await.contains_key(name)
    }

    pub async fn create_collection(&self, database: &str, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut dbs = self.databases.write().await;
        let db = database_mut(&mut dbs, database)?;
        if db.collections.contains_key(name) {
            return Err(CatalogError::DuplicateCollection(name.to_string()).into());
        }
        db.collections.insert(name.to_string(), Collection::default());
        debug!("Created collection {}/{}", database, name);
        Ok(())
    }

    /// Drop a collection; returns whether it existed.
    pub async fn drop_collection(&self, database: &str, name: &str) -> Result<bool> {
        let mut dbs = self.databases.write().await;
        let db = database_mut(&mut dbs, database)?;
        let existed = db.collections.remove(name).is_some();
        if existed {
            debug!("Dropped collection {}/{}", database, name);
        }
        Ok(existed)
    }

    pub async fn collection_exists(&self, database: &str, name: &str) -> bool {
        self.databases
            .read()
            .await
            .get(database)
            .is_some_and(|db| db.collections.contains_key(name))
    }

    /// Names of all collections in `database`, sorted.
    pub async fn collections(&self, database: &str) -> Result<Vec<String>> {
        let dbs = self.databases.read().await;
        let db = dbs
            .get(database)
            .ok_or_else(|| CatalogError::DatabaseNotFound(database.to_string()))?;
        let mut names: Vec<String> = db.collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Store a document, assigning `_key` (unless given), `_id` and `_rev`.
    pub async fn insert(&self, database: &str, collection: &str, document: Value) -> Result<DocumentMeta> {
        let Value::Object(mut fields) = document else {
            return Err(CatalogError::InvalidDocument("document must be an object".into()).into());
        };

        let mut dbs = self.databases.write().await;
        let coll = collection_mut(&mut dbs, database, collection)?;

        let key = match fields.get("_key") {
            Some(Value::String(k)) if !k.is_empty() => k.clone(),
            Some(_) => {
                return Err(CatalogError::InvalidDocument("_key must be a non-empty string".into()).into());
            }
            None => loop {
                coll.next_key += 1;
                let candidate = coll.next_key.to_string();
                if !coll.keys.contains(&candidate) {
                    break candidate;
                }
            },
        };
        if coll.keys.contains(&key) {
            return Err(CatalogError::DuplicateKey {
                collection: collection.to_string(),
                key,
            }
            .into());
        }

        coll.next_rev += 1;
        let meta = DocumentMeta {
            id: format!("{collection}/{key}"),
            rev: format!("_{}", coll.next_rev),
            key,
        };
        fields.insert("_key".into(), Value::String(meta.key.clone()));
        fields.insert("_id".into(), Value::String(meta.id.clone()));
        fields.insert("_rev".into(), Value::String(meta.rev.clone()));

        coll.keys.insert(meta.key.clone());
        Arc::make_mut(&mut coll.documents).push(Value::Object(fields));
        Ok(meta)
    }

    /// Insert several documents in order.
    pub async fn insert_many<I>(&self, database: &str, collection: &str, documents: I) -> Result<Vec<DocumentMeta>>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut metas = Vec::new();
        for doc in documents {
            metas.push(self.insert(database, collection, doc).await?);
        }
        Ok(metas)
    }

    /// Shared view of the documents currently in a collection.
    pub async fn snapshot(&self, database: &str, collection: &str) -> Result<Snapshot> {
        let dbs = self.databases.read().await;
        let db = dbs
            .get(database)
            .ok_or_else(|| CatalogError::DatabaseNotFound(database.to_string()))?;
        db.collections
            .get(collection)
            .map(|c| c.documents.clone())
            .ok_or_else(|| CatalogError::CollectionNotFound(collection.to_string()).into())
    }

    pub async fn count(&self, database: &str, collection: &str) -> Result<usize> {
        Ok(self.snapshot(database, collection).await?.len())
    }
}

fn database_mut<'a>(dbs: &'a mut HashMap<String, Database>, name: &str) -> Result<&'a mut Database> {
    dbs.get_mut(name)
        .ok_or_else(|| CatalogError::DatabaseNotFound(name.to_string()).into())
}

fn collection_mut<'a>(
    dbs: &'a mut HashMap<String, Database>,
    database: &str,
    collection: &str,
) -> Result<&'a mut Collection> {
    database_mut(dbs, database)?
        .collections
        .get_mut(collection)
        .ok_or_else(|| CatalogError::CollectionNotFound(collection.to_string()).into())
}

fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid_first && valid_rest && name.len() <= 256 {
        Ok(())
    } else {
        Err(CatalogError::InvalidName(name.to_string()).into())
    }
}

/// Build an object document from key/value pairs; test and seeding helper.
pub fn document<I, K>(fields: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect::<Map<_, _>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_system_attributes() {
        let catalog = Catalog::new();
        catalog.create_collection("_system", "animals").await.unwrap();
        let meta = catalog
            .insert("_system", "animals", json!({ "_key": "ant" }))
            .await
            .unwrap();
        assert_eq!(meta.id, "animals/ant");

        let docs = catalog.snapshot("_system", "animals").await.unwrap();
        assert_eq!(docs[0]["_id"], "animals/ant");
        assert!(docs[0]["_rev"].is_string());
    }

    #[tokio::test]
    async fn test_generated_keys_skip_taken_ones() {
        let catalog = Catalog::new();
        catalog.create_collection("_system", "c").await.unwrap();
        catalog.insert("_system", "c", json!({ "_key": "1" })).await.unwrap();
        let meta = catalog.insert("_system", "c", json!({})).await.unwrap();
        assert_eq!(meta.key, "2");
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let catalog = Catalog::new();
        catalog.create_collection("_system", "c").await.unwrap();
        catalog.insert("_system", "c", json!({ "_key": "a" })).await.unwrap();
        let err = catalog
            .insert("_system", "c", json!({ "_key": "a" }))
            .await
            .unwrap_err();
        assert_eq!(err.http_code(), 409);
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let catalog = Catalog::new();
        catalog.create_collection("_system", "c").await.unwrap();
        catalog.insert("_system", "c", json!({ "v": 1 })).await.unwrap();
        let before = catalog.snapshot("_system", "c").await.unwrap();
        catalog.insert("_system", "c", json!({ "v": 2 })).await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(catalog.count("_system", "c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_drop_collection() {
        let catalog = Catalog::new();
        catalog.create_collection("_system", "c").await.unwrap();
        assert!(catalog.drop_collection("_system", "c").await.unwrap());
        assert!(!catalog.drop_collection("_system", "c").await.unwrap());
        assert!(catalog.snapshot("_system", "c").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_names() {
        let catalog = Catalog::new();
        assert!(catalog.create_collection("_system", "").await.is_err());
        assert!(catalog.create_collection("_system", "9lives").await.is_err());
        assert!(catalog.create_collection("_system", "a/b").await.is_err());
        assert!(catalog.create_collection("nope", "a").await.is_err());
    }

    #[test]
    fn test_document_helper() {
        let doc = document([("_key", json!("x")), ("n", json!(1))]);
        assert_eq!(doc, json!({ "_key": "x", "n": 1 }));
    }
}

//! Named graph definitions
//!
//! [`GraphEngine`] owns graph definitions; [`Graph`] is a client-side handle
//! that forwards every mutation to the engine and replaces its cached edge
//! definitions and orphan collections with whatever the engine answers.
//! The handle holds no logic of its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::{CatalogError, GraphError, Result};

/// Relation between vertex collections stored in an edge collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub collection: String,
    pub from: BTreeSet<String>,
    pub to: BTreeSet<String>,
}

impl EdgeDefinition {
    pub fn new<F, T, S>(collection: &str, from: F, to: T) -> Self
    where
        F: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collection: collection.to_string(),
            from: from.into_iter().map(Into::into).collect(),
            to: to.into_iter().map(Into::into).collect(),
        }
    }

    fn vertex_collections(&self) -> impl Iterator<Item = &String> {
        self.from.iter().chain(self.to.iter())
    }
}

/// Stored shape of a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDefinition {
    pub name: String,
    pub edge_definitions: Vec<EdgeDefinition>,
    pub orphan_collections: Vec<String>,
}

impl GraphDefinition {
    /// Every collection the graph touches: edge, vertex and orphan.
    pub fn collections(&self) -> BTreeSet<String> {
        let mut all = BTreeSet::new();
        for def in &self.edge_definitions {
            all.insert(def.collection.clone());
            all.extend(def.vertex_collections().cloned());
        }
        all.extend(self.orphan_collections.iter().cloned());
        all
    }

    fn uses_as_vertex(&self, collection: &str) -> bool {
        self.edge_definitions
            .iter()
            .any(|d| d.vertex_collections().any(|c| c == collection))
    }
}

/// Graph definition storage and mutation.
#[async_trait]
pub trait GraphEngine: Send + Sync {
    async fn list(&self, database: &str) -> Result<Vec<String>>;

    async fn exists(&self, database: &str, name: &str) -> Result<bool>;

    async fn create(
        &self,
        database: &str,
        name: &str,
        edge_definitions: Vec<EdgeDefinition>,
        orphans: Vec<String>,
    ) -> Result<GraphDefinition>;

    async fn get(&self, database: &str, name: &str) -> Result<GraphDefinition>;

    async fn drop_graph(&self, database: &str, name: &str, drop_collections: bool) -> Result<()>;

    async fn add_vertex_collection(
        &self,
        database: &str,
        graph: &str,
        collection: &str,
        create_collection: bool,
    ) -> Result<GraphDefinition>;

    async fn remove_vertex_collection(
        &self,
        database: &str,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> Result<GraphDefinition>;

    /// Replace the edge definition stored under the same edge collection.
    async fn edit_edge_definition(
        &self,
        database: &str,
        graph: &str,
        definition: EdgeDefinition,
    ) -> Result<GraphDefinition>;

    async fn delete_edge_definition(
        &self,
        database: &str,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> Result<GraphDefinition>;
}

/// Handle on one named graph.
pub struct Graph {
    engine: Arc<dyn GraphEngine>,
    database: String,
    definition: GraphDefinition,
}

impl Graph {
    pub async fn create(
        engine: Arc<dyn GraphEngine>,
        database: &str,
        name: &str,
        edge_definitions: Vec<EdgeDefinition>,
        orphans: Vec<String>,
    ) -> Result<Self> {
        let definition = engine
            .create(database, name, edge_definitions, orphans)
            .await?;
        Ok(Self {
            engine,
            database: database.to_string(),
            definition,
        })
    }

    pub async fn open(engine: Arc<dyn GraphEngine>, database: &str, name: &str) -> Result<Self> {
        let definition = engine.get(database, name).await?;
        Ok(Self {
            engine,
            database: database.to_string(),
            definition,
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn edge_definitions(&self) -> &[EdgeDefinition] {
        &self.definition.edge_definitions
    }

    pub fn orphan_collections(&self) -> &[String] {
        &self.definition.orphan_collections
    }

    pub async fn add_vertex_collection(&mut self, collection: &str, create: bool) -> Result<()> {
        let updated = self
            .engine
            .add_vertex_collection(&self.database, &self.definition.name, collection, create)
            .await?;
        self.update_definitions(updated);
        Ok(())
    }

    pub async fn remove_vertex_collection(&mut self, collection: &str, drop: bool) -> Result<()> {
        let updated = self
            .engine
            .remove_vertex_collection(&self.database, &self.definition.name, collection, drop)
            .await?;
        self.update_definitions(updated);
        Ok(())
    }

    pub async fn edit_edge_definition(&mut self, definition: EdgeDefinition) -> Result<()> {
        let updated = self
            .engine
            .edit_edge_definition(&self.database, &self.definition.name, definition)
            .await?;
        self.update_definitions(updated);
        Ok(())
    }

    pub async fn delete_edge_definition(&mut self, collection: &str, drop: bool) -> Result<()> {
        let updated = self
            .engine
            .delete_edge_definition(&self.database, &self.definition.name, collection, drop)
            .await?;
        self.update_definitions(updated);
        Ok(())
    }

    fn update_definitions(&mut self, updated: GraphDefinition) {
        self.definition.edge_definitions = updated.edge_definitions;
        self.definition.orphan_collections = updated.orphan_collections;
    }
}

type GraphKey = (String, String);

/// Graph engine keeping definitions in memory and collections in the catalog.
pub struct CatalogGraphEngine {
    catalog: Arc<Catalog>,
    graphs: RwLock<HashMap<GraphKey, GraphDefinition>>,
}

impl CatalogGraphEngine {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            graphs: RwLock::new(HashMap::new()),
        }
    }

    async fn ensure_collection(&self, database: &str, name: &str) -> Result<()> {
        if !self.catalog.collection_exists(database, name).await {
            self.catalog.create_collection(database, name).await?;
        }
        Ok(())
    }

    async fn ensure_edge_definition(&self, database: &str, def: &EdgeDefinition) -> Result<()> {
        self.ensure_collection(database, &def.collection).await?;
        for vertex in def.vertex_collections() {
            self.ensure_collection(database, vertex).await?;
        }
        Ok(())
    }

    /// Drop `collections` that no remaining graph of `database` refers to.
    async fn drop_unused(&self, database: &str, collections: BTreeSet<String>) -> Result<()> {
        let in_use: BTreeSet<String> = self
            .graphs
            .read()
            .await
            .iter()
            .filter(|((db, _), _)| db == database)
            .flat_map(|(_, g)| g.collections())
            .collect();
        for name in collections.difference(&in_use) {
            self.catalog.drop_collection(database, name).await?;
        }
        Ok(())
    }

    async fn modify<F>(&self, database: &str, graph: &str, change: F) -> Result<GraphDefinition>
    where
        F: FnOnce(&mut GraphDefinition) -> Result<()> + Send,
    {
        let mut graphs = self.graphs.write().await;
        let def = graphs
            .get_mut(&(database.to_string(), graph.to_string()))
            .ok_or_else(|| GraphError::NotFound(graph.to_string()))?;
        let mut updated = def.clone();
        change(&mut updated)?;
        *def = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl GraphEngine for CatalogGraphEngine {
    async fn list(&self, database: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .graphs
            .read()
            .await
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn exists(&self, database: &str, name: &str) -> Result<bool> {
        Ok(self
            .graphs
            .read()
            .await
            .contains_key(&(database.to_string(), name.to_string())))
    }

    async fn create(
        &self,
        database: &str,
        name: &str,
        edge_definitions: Vec<EdgeDefinition>,
        orphans: Vec<String>,
    ) -> Result<GraphDefinition> {
        if self.exists(database, name).await? {
            return Err(GraphError::Duplicate(name.to_string()).into());
        }
        for def in &edge_definitions {
            self.ensure_edge_definition(database, def).await?;
        }
        let mut definition = GraphDefinition {
            name: name.to_string(),
            edge_definitions,
            orphan_collections: Vec::new(),
        };
        for orphan in orphans {
            if definition.uses_as_vertex(&orphan) || definition.orphan_collections.contains(&orphan)
            {
                return Err(GraphError::VertexCollectionInUse(orphan).into());
            }
            self.ensure_collection(database, &orphan).await?;
            definition.orphan_collections.push(orphan);
        }

        let mut graphs = self.graphs.write().await;
        let key = (database.to_string(), name.to_string());
        if graphs.contains_key(&key) {
            return Err(GraphError::Duplicate(name.to_string()).into());
        }
        graphs.insert(key, definition.clone());
        info!("Created graph {}/{}", database, name);
        Ok(definition)
    }

    async fn get(&self, database: &str, name: &str) -> Result<GraphDefinition> {
        self.graphs
            .read()
            .await
            .get(&(database.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| GraphError::NotFound(name.to_string()).into())
    }

    async fn drop_graph(&self, database: &str, name: &str, drop_collections: bool) -> Result<()> {
        let removed = self
            .graphs
            .write()
            .await
            .remove(&(database.to_string(), name.to_string()))
            .ok_or_else(|| GraphError::NotFound(name.to_string()))?;
        info!("Dropped graph {}/{}", database, name);
        if drop_collections {
            self.drop_unused(database, removed.collections()).await?;
        }
        Ok(())
    }

    async fn add_vertex_collection(
        &self,
        database: &str,
        graph: &str,
        collection: &str,
        create_collection: bool,
    ) -> Result<GraphDefinition> {
        let current = self.get(database, graph).await?;
        if current.collections().contains(collection) {
            return Err(GraphError::VertexCollectionInUse(collection.to_string()).into());
        }
        if !self.catalog.collection_exists(database, collection).await {
            if !create_collection {
                return Err(CatalogError::CollectionNotFound(collection.to_string()).into());
            }
            self.catalog.create_collection(database, collection).await?;
        }
        let name = collection.to_string();
        self.modify(database, graph, move |g| {
            if g.collections().contains(&name) {
                return Err(GraphError::VertexCollectionInUse(name).into());
            }
            g.orphan_collections.push(name);
            Ok(())
        })
        .await
    }

    async fn remove_vertex_collection(
        &self,
        database: &str,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> Result<GraphDefinition> {
        let name = collection.to_string();
        let updated = self
            .modify(database, graph, move |g| {
                let pos = g
                    .orphan_collections
                    .iter()
                    .position(|c| *c == name)
                    .ok_or(GraphError::VertexCollectionNotFound(name))?;
                g.orphan_collections.remove(pos);
                Ok(())
            })
            .await?;
        if drop_collection {
            self.drop_unused(database, BTreeSet::from([collection.to_string()]))
                .await?;
        }
        Ok(updated)
    }

    async fn edit_edge_definition(
        &self,
        database: &str,
        graph: &str,
        definition: EdgeDefinition,
    ) -> Result<GraphDefinition> {
        self.ensure_edge_definition(database, &definition).await?;
        debug!(
            "Editing edge definition {} of graph {}",
            definition.collection, graph
        );
        self.modify(database, graph, move |g| {
            let slot = g
                .edge_definitions
                .iter_mut()
                .find(|d| d.collection == definition.collection)
                .ok_or_else(|| GraphError::EdgeDefinitionNotFound(definition.collection.clone()))?;
            *slot = definition;
            let used: BTreeSet<String> = g
                .edge_definitions
                .iter()
                .flat_map(|d| d.vertex_collections().cloned())
                .collect();
            g.orphan_collections.retain(|c| !used.contains(c));
            Ok(())
        })
        .await
    }

    async fn delete_edge_definition(
        &self,
        database: &str,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> Result<GraphDefinition> {
        let name = collection.to_string();
        let updated = self
            .modify(database, graph, move |g| {
                let pos = g
                    .edge_definitions
                    .iter()
                    .position(|d| d.collection == name)
                    .ok_or(GraphError::EdgeDefinitionNotFound(name))?;
                let removed = g.edge_definitions.remove(pos);
                // vertex collections left without an edge definition become orphans
                for vertex in removed.vertex_collections() {
                    if !g.uses_as_vertex(vertex) && !g.orphan_collections.contains(vertex) {
                        g.orphan_collections.push(vertex.clone());
                    }
                }
                Ok(())
            })
            .await?;
        if drop_collection {
            self.drop_unused(database, BTreeSet::from([collection.to_string()]))
                .await?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (Arc<Catalog>, Arc<CatalogGraphEngine>) {
        let catalog = Arc::new(Catalog::new());
        let engine = Arc::new(CatalogGraphEngine::new(catalog.clone()));
        (catalog, engine)
    }

    fn relation() -> EdgeDefinition {
        EdgeDefinition::new("eats", ["animals"], ["fruits"])
    }

    #[tokio::test]
    async fn test_create_creates_collections() {
        let (catalog, engine) = engine();
        let graph = Graph::create(engine.clone(), "_system", "food", vec![relation()], vec![])
            .await
            .unwrap();
        assert_eq!(graph.name(), "food");
        for name in ["eats", "animals", "fruits"] {
            assert!(catalog.collection_exists("_system", name).await);
        }
        assert_eq!(engine.list("_system").await.unwrap(), vec!["food"]);
        let err = Graph::create(engine, "_system", "food", vec![], vec![])
            .await
            .err()
            .unwrap();
        assert_eq!(err.http_code(), 409);
    }

    #[tokio::test]
    async fn test_handle_tracks_engine_state() {
        let (_, engine) = engine();
        let mut graph = Graph::create(engine.clone(), "_system", "food", vec![relation()], vec![])
            .await
            .unwrap();

        graph.add_vertex_collection("plants", true).await.unwrap();
        assert_eq!(graph.orphan_collections(), ["plants".to_string()]);

        graph
            .edit_edge_definition(EdgeDefinition::new("eats", ["animals"], ["fruits", "plants"]))
            .await
            .unwrap();
        assert!(graph.orphan_collections().is_empty());
        assert_eq!(graph.edge_definitions()[0].to.len(), 2);

        graph.delete_edge_definition("eats", false).await.unwrap();
        assert!(graph.edge_definitions().is_empty());
        assert_eq!(graph.orphan_collections().len(), 3);

        // a reopened handle sees the same state
        let reopened = Graph::open(engine, "_system", "food").await.unwrap();
        assert_eq!(reopened.orphan_collections(), graph.orphan_collections());
    }

    #[tokio::test]
    async fn test_vertex_collection_errors() {
        let (catalog, engine) = engine();
        let mut graph = Graph::create(engine, "_system", "food", vec![relation()], vec![])
            .await
            .unwrap();

        let err = graph.add_vertex_collection("animals", true).await.unwrap_err();
        assert_eq!(err.error_num(), 1938);

        let err = graph.add_vertex_collection("stones", false).await.unwrap_err();
        assert_eq!(err.http_code(), 404);

        let err = graph.remove_vertex_collection("stones", false).await.unwrap_err();
        assert_eq!(err.error_num(), 1926);

        graph.add_vertex_collection("stones", true).await.unwrap();
        graph.remove_vertex_collection("stones", true).await.unwrap();
        assert!(!catalog.collection_exists("_system", "stones").await);
    }

    #[tokio::test]
    async fn test_drop_keeps_shared_collections() {
        let (catalog, engine) = engine();
        engine
            .create("_system", "a", vec![relation()], vec![])
            .await
            .unwrap();
        engine
            .create(
                "_system",
                "b",
                vec![EdgeDefinition::new("likes", ["animals"], ["animals"])],
                vec![],
            )
            .await
            .unwrap();

        engine.drop_graph("_system", "a", true).await.unwrap();
        assert!(!engine.exists("_system", "a").await.unwrap());
        assert!(!catalog.collection_exists("_system", "eats").await);
        assert!(!catalog.collection_exists("_system", "fruits").await);
        assert!(catalog.collection_exists("_system", "animals").await);

        let err = engine.get("_system", "a").await.unwrap_err();
        assert_eq!(err.error_num(), 1924);
    }
}

//! Coordinator routing layer
//!
//! A cluster runs several coordinators. Each one is an independent HTTP
//! router, but all of them share a single [`ClusterState`]: the catalog,
//! the user registry, the cursor store and the graph engine. A cursor
//! created through one coordinator can therefore be continued or deleted
//! through any other.

pub mod http;

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{AuthorizationGate, CredentialValidator, GrantSource, UserRegistry};
use crate::catalog::Catalog;
use crate::config::{Config, ServerConfig};
use crate::cursor::{CursorService, CursorSettings, CursorStore, MemoryCursorStore};
use crate::error::{ConfigError, CursordError, Result};
use crate::graph::CatalogGraphEngine;

pub use http::{ApiError, basic_auth, build_router};

/// State shared by every coordinator of a cluster.
///
/// `users` backs the user management endpoints. Requests are authenticated
/// through `credentials` and authorized through `gate`; both default to the
/// same registry.
pub struct ClusterState {
    pub catalog: Arc<Catalog>,
    pub users: Arc<UserRegistry>,
    pub credentials: Arc<dyn CredentialValidator>,
    pub gate: AuthorizationGate,
    pub cursors: CursorService,
    pub graphs: Arc<CatalogGraphEngine>,
}

impl ClusterState {
    /// Build state with an in-memory cursor store.
    pub fn new(config: &Config) -> Self {
        Self::with_store(config, Arc::new(MemoryCursorStore::new()))
    }

    pub fn with_store(config: &Config, store: Arc<dyn CursorStore>) -> Self {
        let users = Arc::new(UserRegistry::from_config(&config.users));
        Self::build(config, store, users.clone(), users.clone(), users)
    }

    /// Build state that authenticates and authorizes through external sources.
    pub fn with_auth(
        config: &Config,
        store: Arc<dyn CursorStore>,
        grants: Arc<dyn GrantSource>,
        credentials: Arc<dyn CredentialValidator>,
    ) -> Self {
        let users = Arc::new(UserRegistry::from_config(&config.users));
        Self::build(config, store, grants, credentials, users)
    }

    fn build(
        config: &Config,
        store: Arc<dyn CursorStore>,
        grants: Arc<dyn GrantSource>,
        credentials: Arc<dyn CredentialValidator>,
        users: Arc<UserRegistry>,
    ) -> Self {
        let catalog = Arc::new(Catalog::new());
        let gate = AuthorizationGate::new(grants);
        let cursors = CursorService::new(
            store,
            gate.clone(),
            catalog.clone(),
            CursorSettings::from(&config.cursor),
        );
        let graphs = Arc::new(CatalogGraphEngine::new(catalog.clone()));
        Self {
            catalog,
            users,
            credentials,
            gate,
            cursors,
            graphs,
        }
    }

    pub fn store(&self) -> &Arc<dyn CursorStore> {
        self.cursors.store()
    }
}

/// One request router of the cluster.
#[derive(Clone)]
pub struct Coordinator {
    name: String,
    cluster: Arc<ClusterState>,
}

impl Coordinator {
    pub fn new(name: impl Into<String>, cluster: Arc<ClusterState>) -> Self {
        Self {
            name: name.into(),
            cluster,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> &ClusterState {
        &self.cluster
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.clone())
    }
}

/// A set of coordinators over one shared state.
pub struct Cluster {
    state: Arc<ClusterState>,
    coordinators: Vec<Coordinator>,
    server: ServerConfig,
}

impl Cluster {
    pub fn new(config: &Config) -> Self {
        Self::with_state(config, Arc::new(ClusterState::new(config)))
    }

    pub fn with_state(config: &Config, state: Arc<ClusterState>) -> Self {
        let prefix = config
            .server
            .name_prefix
            .clone()
            .unwrap_or_else(host_name);
        let coordinators = (1..=config.server.coordinators)
            .map(|n| Coordinator::new(format!("{prefix}-coord{n}"), state.clone()))
            .collect();
        Self {
            state,
            coordinators,
            server: config.server.clone(),
        }
    }

    pub fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }

    pub fn coordinators(&self) -> &[Coordinator] {
        &self.coordinators
    }

    /// Bind every coordinator on consecutive ports and serve until `cancel`.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let mut tasks = Vec::with_capacity(self.coordinators.len());
        for (offset, coordinator) in self.coordinators.iter().enumerate() {
            let port = u16::try_from(offset)
                .ok()
                .and_then(|o| self.server.base_port.checked_add(o))
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "server.coordinators".to_string(),
                    value: self.coordinators.len().to_string(),
                })?;
            let addr = format!("{}:{}", self.server.bind, port);
            let listener = TcpListener::bind(&addr).await?;
            info!("Coordinator {} listening on {}", coordinator.name(), addr);

            let router = coordinator.router();
            let token = cancel.clone();
            tasks.push(tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await
            }));
        }

        for outcome in futures::future::join_all(tasks).await {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(e) => {
                    return Err(CursordError::Generic(format!(
                        "coordinator task failed: {e}"
                    )));
                }
            }
        }
        info!("All coordinators stopped");
        Ok(())
    }
}

fn host_name() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Could not read host name: {}", e);
            "cursord".to_string()
        }
    }
}

//! cursord library
//!
//! Query cursors for a cluster of coordinators. A query runs once; its rows
//! are handed out in batches, and the paused remainder lives in a cursor
//! store shared by every coordinator so that continuations can arrive
//! anywhere. Each continuation re-checks the owner's current grants.
//!
//! # Modules
//!
//! - `auth`: identities, grants and the authorization gate
//! - `catalog`: in-memory databases, collections and documents
//! - `cli`: command-line interface and argument parsing
//! - `config`: configuration management
//! - `coordinator`: HTTP routers over shared cluster state
//! - `cursor`: batch producer, cursor store and protocol handler
//! - `error`: error types and handling
//! - `graph`: named graph definitions
//! - `query`: query language subset
//!
//! # Example
//!
//! ```no_run
//! use cursord::{Cluster, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     Cluster::new(&config).serve(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod cursor;
pub mod error;
pub mod graph;
pub mod query;

// Re-export commonly used types
pub use auth::{AuthorizationGate, GrantLevel, Identity, UserRegistry};
pub use catalog::Catalog;
pub use config::Config;
pub use coordinator::{Cluster, ClusterState, Coordinator};
pub use cursor::{CursorId, CursorService, CursorStore, MemoryCursorStore};
pub use error::{CursordError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}

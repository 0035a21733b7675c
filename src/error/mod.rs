//! Error handling module for cursord.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`CursordError`] umbrella over the per-area kinds:
//! - cursor lifecycle (`CursorError`): not found, conflict, exhausted
//! - authentication and authorization (`AuthError`)
//! - query parsing and binding (`QueryError`)
//! - storage catalog and graph definitions
//!
//! Every error carries a stable HTTP status and `errorNum`, rendered to
//! clients through [`ErrorResponse`].
//!
//! # Example
//!
//! ```rust
//! use cursord::error::{CursorError, CursordError, ErrorResponse};
//!
//! let err = CursordError::from(CursorError::NotFound("1234".into()));
//! let body = ErrorResponse::from_error(&err);
//! assert_eq!(body.code, 404);
//! assert_eq!(body.error_num, 1600);
//! ```

pub mod kinds;
pub mod response;

// Re-export commonly used types
pub use kinds::{
    AuthError, CatalogError, ConfigError, CursorError, CursordError, GraphError, QueryError,
    Result,
};
pub use response::ErrorResponse;

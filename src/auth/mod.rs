//! Identity, grants and the authorization gate
//!
//! Credentials and grants belong to an external user store; this module only
//! consumes them through two seams:
//! - [`CredentialValidator`] resolves a username/password pair to an [`Identity`]
//! - [`GrantSource`] answers the grants a user currently holds
//!
//! [`UserRegistry`] is the in-memory implementation of both.
//! [`AuthorizationGate`] evaluates read/write rights on top of a grant source
//! and is consulted on every request, never cached.

pub mod gate;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthError, Result};

pub use gate::AuthorizationGate;
pub use registry::UserRegistry;

/// Database holding administrative rights.
pub const SYSTEM_DATABASE: &str = "_system";

/// Access level granted on a database or collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantLevel {
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "ro")]
    ReadOnly,
    #[serde(rename = "none")]
    None,
}

impl GrantLevel {
    pub fn allows_read(self) -> bool {
        matches!(self, GrantLevel::ReadWrite | GrantLevel::ReadOnly)
    }

    pub fn allows_write(self) -> bool {
        matches!(self, GrantLevel::ReadWrite)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GrantLevel::ReadWrite => "rw",
            GrantLevel::ReadOnly => "ro",
            GrantLevel::None => "none",
        }
    }
}

impl fmt::Display for GrantLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantLevel {
    type Err = AuthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "rw" => Ok(GrantLevel::ReadWrite),
            "ro" => Ok(GrantLevel::ReadOnly),
            "none" => Ok(GrantLevel::None),
            other => Err(AuthError::InvalidGrant(other.to_string())),
        }
    }
}

/// An authenticated user, as resolved by the credential collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub username: String,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// The grants relevant to one collection, read in a single lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedGrants {
    pub database: Option<GrantLevel>,
    pub collection: Option<GrantLevel>,
}

/// Authoritative source of user grants.
#[async_trait]
pub trait GrantSource: Send + Sync {
    /// Current grants of `user` for `database` and, if given, `collection`.
    async fn grants(
        &self,
        user: &str,
        database: &str,
        collection: Option<&str>,
    ) -> Result<ResolvedGrants>;
}

/// Resolves credentials to an identity.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, username: &str, password: &str) -> Option<Identity>;
}

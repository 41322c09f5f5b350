//! Catalog error types.
//!
//! Defines the error taxonomy for workspace operations: malformed input,
//! upstream failures, configuration problems, and the per-branch failure
//! descriptor attached to partial aggregate results.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Malformed or missing input, detected before any remote call.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String, input: Vec<String> },

    /// A remote call failed (auth, not-found, permission, network, rate limit).
    #[error("Upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl CatalogError {
    pub fn invalid_argument(message: impl Into<String>, input: Vec<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            input,
        }
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Stable machine-readable kind used in tool responses.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::InvalidArgument { .. } => "invalid_argument",
            CatalogError::Upstream { .. } | CatalogError::Http(_) => "upstream",
            CatalogError::Config(_) => "config",
            CatalogError::Cancelled => "cancelled",
            CatalogError::Transport(_) => "transport",
            CatalogError::Io(_) => "io",
        }
    }

    /// HTTP status of the failed remote call, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Upstream { status, .. } => *status,
            CatalogError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, CatalogError::InvalidArgument { .. })
    }
}

/// Level of the hierarchy at which a fan-out branch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchScope {
    /// Listing schemas of a catalog failed.
    Catalog,
    /// Listing tables of a schema failed.
    Schema,
    /// Fetching a single table failed.
    Table,
}

impl fmt::Display for BranchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BranchScope::Catalog => "catalog",
            BranchScope::Schema => "schema",
            BranchScope::Table => "table",
        })
    }
}

/// A single failed branch of an aggregate operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFailure {
    pub scope: BranchScope,
    /// Catalog name, `catalog.schema`, or `catalog.schema.table`.
    pub target: String,
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl BranchFailure {
    pub fn new(scope: BranchScope, target: impl Into<String>, error: &CatalogError) -> Self {
        Self {
            scope,
            target: target.into(),
            kind: error.kind().to_string(),
            message: error.to_string(),
            status: error.status(),
        }
    }
}

//! Read-only Databricks Unity Catalog facade served as MCP tools.
//!
//! ## Modules
//!
//! - [`core`]: workspace client, cache, aggregator, configuration, metrics
//! - [`server`]: MCP tool server
//!
//! ## Shared Types
//!
//! - [`model`]: catalog, schema, table and job descriptors
//! - [`error`]: error taxonomy and per-branch failure descriptors
//! - [`response`]: tool response envelopes

// Shared types (used across modules)
pub mod error;
pub mod model;
pub mod response;

// Subsystems
pub mod core;
pub mod server;

pub use core::{config, metrics};
// Re-export from core
pub use core::{
    AggregatorOptions, CacheConfig, CacheStats, CatalogAggregator, CatalogFilter, ClientConfig,
    ConfigOverrides, DatabricksConfig, DatabricksProfile, FilterConfig, LookupOutcome,
    MetricsSnapshot, RestWorkspaceClient, TableListing, TableLookup, WorkspaceClient,
};

pub use error::{BranchFailure, BranchScope, CatalogError, CatalogResult};
pub use model::{
    CatalogInfo, ColumnInfo, FullTableName, JobSummary, SchemaInfo, TableDetails, TableSummary,
};
pub use response::ToolResponse;
pub use server::DatabricksMcpServer;

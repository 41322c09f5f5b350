//! Core workspace infrastructure.

pub mod aggregator;
pub mod cache;
pub mod client;
pub mod config;
pub mod metrics;
pub mod rest;

pub use aggregator::{
    AggregatorOptions, CatalogAggregator, CatalogFilter, LookupOutcome, TableListing, TableLookup,
};
pub use cache::{CacheKey, CacheStats, TtlCache};
pub use client::WorkspaceClient;
pub use config::{
    CacheConfig, ClientConfig, ConfigOverrides, DatabricksConfig, DatabricksProfile, FilterConfig,
    WorkspaceConfig,
};
pub use metrics::{AggregatorMetrics, LatencySnapshot, MetricsSnapshot, OperationSnapshot};
pub use rest::RestWorkspaceClient;

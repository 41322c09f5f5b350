//! Remote workspace capability interface.

use async_trait::async_trait;

use crate::{
    error::CatalogResult,
    model::{CatalogInfo, FullTableName, JobSummary, SchemaInfo, TableDetails, TableSummary},
};

/// Read-only view of a Databricks workspace.
///
/// Implementations issue one logical remote call per method (following
/// pagination internally) and surface failures as
/// [`CatalogError::Upstream`](crate::error::CatalogError::Upstream).
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    async fn list_catalogs(&self) -> CatalogResult<Vec<CatalogInfo>>;

    async fn list_schemas(&self, catalog: &str) -> CatalogResult<Vec<SchemaInfo>>;

    async fn list_tables(&self, catalog: &str, schema: &str) -> CatalogResult<Vec<TableSummary>>;

    async fn get_table(&self, name: &FullTableName) -> CatalogResult<TableDetails>;

    async fn list_jobs(&self) -> CatalogResult<Vec<JobSummary>>;
}

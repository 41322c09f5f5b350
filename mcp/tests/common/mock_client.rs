//! Scripted [`WorkspaceClient`] that counts every call.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use dbx_mcp::{
    CatalogError, CatalogInfo, CatalogResult, ColumnInfo, FullTableName, JobSummary, SchemaInfo,
    TableDetails, TableSummary, WorkspaceClient,
};

#[derive(Default)]
pub struct MockClient {
    pub catalogs: Vec<CatalogInfo>,
    pub schemas: HashMap<String, Vec<String>>,
    pub tables: HashMap<(String, String), Vec<String>>,
    /// Catalogs whose schema listing fails with 403.
    pub forbidden_catalogs: HashSet<String>,
    /// Fully-qualified names whose lookup fails with 404.
    pub missing_tables: HashSet<String>,
    pub jobs: Vec<JobSummary>,
    /// Delay applied to every call.
    pub latency: Option<Duration>,
    /// Extra delay applied to `list_tables` only.
    pub table_list_latency: Option<Duration>,
    pub catalog_calls: AtomicUsize,
    pub schema_calls: AtomicUsize,
    pub table_list_calls: AtomicUsize,
    pub table_calls: AtomicUsize,
    pub job_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockClient {
    /// Catalogs `[system, sales, hr]`; `sales.public` holds `orders` and
    /// `customers`; `hr` cannot be read.
    pub fn sales_and_hr() -> Self {
        Self::default()
            .with_catalog("system")
            .with_tables("sales", "public", &["orders", "customers"])
            .with_forbidden_catalog("hr")
    }

    pub fn with_catalog(mut self, name: &str) -> Self {
        if !self.catalogs.iter().any(|c| c.name == name) {
            self.catalogs.push(CatalogInfo::new(name));
        }
        self
    }

    pub fn with_tables(mut self, catalog: &str, schema: &str, tables: &[&str]) -> Self {
        self = self.with_catalog(catalog);
        let schemas = self.schemas.entry(catalog.to_string()).or_default();
        if !schemas.iter().any(|s| s == schema) {
            schemas.push(schema.to_string());
        }
        self.tables
            .entry((catalog.to_string(), schema.to_string()))
            .or_default()
            .extend(tables.iter().map(|t| t.to_string()));
        self
    }

    pub fn with_forbidden_catalog(mut self, catalog: &str) -> Self {
        self = self.with_catalog(catalog);
        self.forbidden_catalogs.insert(catalog.to_string());
        self
    }

    pub fn with_missing_table(mut self, name: &str) -> Self {
        self.missing_tables.insert(name.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_table_list_latency(mut self, latency: Duration) -> Self {
        self.table_list_latency = Some(latency);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
            + self.schema_calls.load(Ordering::SeqCst)
            + self.table_list_calls.load(Ordering::SeqCst)
            + self.table_calls.load(Ordering::SeqCst)
            + self.job_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, counter: &AtomicUsize) -> InFlight<'_> {
        self.enter_with(counter, None).await
    }

    async fn enter_with(&self, counter: &AtomicUsize, extra: Option<Duration>) -> InFlight<'_> {
        counter.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        let delay = self.latency.unwrap_or_default() + extra.unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkspaceClient for MockClient {
    async fn list_catalogs(&self) -> CatalogResult<Vec<CatalogInfo>> {
        let _call = self.enter(&self.catalog_calls).await;
        Ok(self.catalogs.clone())
    }

    async fn list_schemas(&self, catalog: &str) -> CatalogResult<Vec<SchemaInfo>> {
        let _call = self.enter(&self.schema_calls).await;
        if self.forbidden_catalogs.contains(catalog) {
            return Err(CatalogError::upstream(
                Some(403),
                format!("PERMISSION_DENIED: User does not have USE CATALOG on Catalog '{catalog}'."),
            ));
        }
        Ok(self
            .schemas
            .get(catalog)
            .map(|names| names.iter().map(|s| SchemaInfo::new(catalog, s)).collect())
            .unwrap_or_default())
    }

    async fn list_tables(&self, catalog: &str, schema: &str) -> CatalogResult<Vec<TableSummary>> {
        let _call = self
            .enter_with(&self.table_list_calls, self.table_list_latency)
            .await;
        Ok(self
            .tables
            .get(&(catalog.to_string(), schema.to_string()))
            .map(|names| {
                names
                    .iter()
                    .map(|t| TableSummary::new(catalog, schema, t))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_table(&self, name: &FullTableName) -> CatalogResult<TableDetails> {
        let _call = self.enter(&self.table_calls).await;
        if self.missing_tables.contains(&name.to_string()) {
            return Err(CatalogError::upstream(
                Some(404),
                format!("TABLE_DOES_NOT_EXIST: Table '{name}' does not exist."),
            ));
        }
        Ok(TableDetails::new(
            name,
            vec![
                ColumnInfo::new("id", "bigint").not_null(),
                ColumnInfo::new("value", "string"),
            ],
        )
        .with_comment(format!("Description of {}", name.table)))
    }

    async fn list_jobs(&self) -> CatalogResult<Vec<JobSummary>> {
        let _call = self.enter(&self.job_calls).await;
        Ok(self.jobs.clone())
    }
}

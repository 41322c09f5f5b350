//! Workspace metadata aggregation.
//!
//! Composes the per-level remote listings into flattened, deduplicated views
//! of the workspace. Branches of a fan-out run concurrently inside the calling
//! task (no detached tasks), so dropping an aggregate future cancels every
//! outstanding remote call and nothing partial escapes. Within a completed
//! fan-out, a failing branch is recorded and the remaining branches still
//! contribute.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    num::NonZeroUsize,
    sync::Arc,
    time::Instant,
};

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use super::{
    cache::{CacheKey, CacheStats, TtlCache},
    client::WorkspaceClient,
    config::{CacheConfig, DatabricksConfig, FilterConfig},
    metrics::{AggregatorMetrics, MetricsSnapshot},
};
use crate::{
    error::{BranchFailure, BranchScope, CatalogError, CatalogResult},
    model::{CatalogInfo, FullTableName, JobSummary, SchemaInfo, TableDetails, TableSummary},
};

/// Tuning for one aggregator instance.
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Upper bound on simultaneous remote calls issued by one fan-out.
    pub max_concurrent_requests: usize,
    pub cache: CacheConfig,
    pub filters: FilterConfig,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self::from_config(&DatabricksConfig::default())
    }
}

impl AggregatorOptions {
    pub fn from_config(config: &DatabricksConfig) -> Self {
        Self {
            max_concurrent_requests: config.client.max_concurrent_requests,
            cache: config.cache.clone(),
            filters: config.filters.clone(),
        }
    }
}

/// Exclusion rules for system and internal namespaces.
#[derive(Debug, Clone)]
pub struct CatalogFilter {
    exclude_system_owned: bool,
    system_owner: String,
    exact: HashSet<String>,
    prefixes: Vec<String>,
    excluded_schemas: HashSet<String>,
}

impl CatalogFilter {
    pub fn new(config: &FilterConfig) -> Self {
        let mut exact = HashSet::new();
        let mut prefixes = Vec::new();
        for pattern in &config.reserved_catalogs {
            let pattern = pattern.trim().to_lowercase();
            match pattern.strip_suffix('*') {
                Some(prefix) => prefixes.push(prefix.to_string()),
                None => {
                    exact.insert(pattern);
                }
            }
        }
        Self {
            exclude_system_owned: config.exclude_system_owned,
            system_owner: config.system_owner.clone(),
            exact,
            prefixes,
            excluded_schemas: config
                .excluded_schemas
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn is_reserved_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.exact.contains(&name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    pub fn is_excluded_catalog(&self, catalog: &CatalogInfo) -> bool {
        if self.is_reserved_name(&catalog.name) {
            return true;
        }
        self.exclude_system_owned
            && catalog
                .created_by
                .as_deref()
                .is_some_and(|owner| owner.eq_ignore_ascii_case(&self.system_owner))
    }

    pub fn is_excluded_schema(&self, schema: &str) -> bool {
        self.excluded_schemas.contains(&schema.to_lowercase())
    }
}

/// Flattened table listing of the whole workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableListing {
    /// Fully-qualified names, each at most once.
    pub tables: Vec<String>,
    /// Branches that could not be read.
    pub failures: Vec<BranchFailure>,
}

impl TableListing {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Result for one requested name of a table-details batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableLookup {
    /// The name as requested.
    pub name: String,
    #[serde(flatten)]
    pub outcome: LookupOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOutcome {
    Table(TableDetails),
    Error(BranchFailure),
}

impl TableLookup {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, LookupOutcome::Table(_))
    }

    pub fn table(&self) -> Option<&TableDetails> {
        match &self.outcome {
            LookupOutcome::Table(table) => Some(table),
            LookupOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BranchFailure> {
        match &self.outcome {
            LookupOutcome::Table(_) => None,
            LookupOutcome::Error(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone)]
enum CachedValue {
    Catalogs(Arc<Vec<CatalogInfo>>),
    Schemas(Arc<Vec<SchemaInfo>>),
    Tables(Arc<Vec<TableSummary>>),
    Table(Arc<TableDetails>),
}

/// Remote results that can live in the shared cache.
trait Cacheable: Sized {
    fn into_cached(value: Arc<Self>) -> CachedValue;
    fn from_cached(value: CachedValue) -> Option<Arc<Self>>;
}

impl Cacheable for Vec<CatalogInfo> {
    fn into_cached(value: Arc<Self>) -> CachedValue {
        CachedValue::Catalogs(value)
    }

    fn from_cached(value: CachedValue) -> Option<Arc<Self>> {
        match value {
            CachedValue::Catalogs(v) => Some(v),
            _ => None,
        }
    }
}

impl Cacheable for Vec<SchemaInfo> {
    fn into_cached(value: Arc<Self>) -> CachedValue {
        CachedValue::Schemas(value)
    }

    fn from_cached(value: CachedValue) -> Option<Arc<Self>> {
        match value {
            CachedValue::Schemas(v) => Some(v),
            _ => None,
        }
    }
}

impl Cacheable for Vec<TableSummary> {
    fn into_cached(value: Arc<Self>) -> CachedValue {
        CachedValue::Tables(value)
    }

    fn from_cached(value: CachedValue) -> Option<Arc<Self>> {
        match value {
            CachedValue::Tables(v) => Some(v),
            _ => None,
        }
    }
}

impl Cacheable for TableDetails {
    fn into_cached(value: Arc<Self>) -> CachedValue {
        CachedValue::Table(value)
    }

    fn from_cached(value: CachedValue) -> Option<Arc<Self>> {
        match value {
            CachedValue::Table(v) => Some(v),
            _ => None,
        }
    }
}

/// Records an operation's outcome, including when its future is dropped.
struct OperationGuard<'a> {
    metrics: &'a AggregatorMetrics,
    operation: &'static str,
    started: Instant,
    success: bool,
}

impl<'a> OperationGuard<'a> {
    fn start(metrics: &'a AggregatorMetrics, operation: &'static str) -> Self {
        metrics.record_operation_start();
        Self {
            metrics,
            operation,
            started: Instant::now(),
            success: false,
        }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_operation_end(
            self.operation,
            self.success,
            self.started.elapsed().as_millis() as u64,
        );
    }
}

pub struct CatalogAggregator {
    client: Arc<dyn WorkspaceClient>,
    cache: Option<TtlCache<CacheKey, CachedValue>>,
    filter: CatalogFilter,
    fanout: Semaphore,
    /// Per-key locks held while a cache miss is being fetched.
    in_flight: DashMap<CacheKey, Arc<Mutex<()>>>,
    metrics: AggregatorMetrics,
}

impl CatalogAggregator {
    pub fn new(client: Arc<dyn WorkspaceClient>, options: AggregatorOptions) -> Self {
        let cache = if options.cache.enabled {
            NonZeroUsize::new(options.cache.capacity)
                .map(|capacity| TtlCache::new(capacity, options.cache.ttl()))
        } else {
            None
        };

        Self {
            client,
            cache,
            filter: CatalogFilter::new(&options.filters),
            fanout: Semaphore::new(options.max_concurrent_requests.max(1)),
            in_flight: DashMap::new(),
            metrics: AggregatorMetrics::new(),
        }
    }

    pub fn filter(&self) -> &CatalogFilter {
        &self.filter
    }

    /// Cache statistics, or `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(TtlCache::stats)
    }

    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            info!("Metadata cache cleared");
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Names of every user-visible catalog, in remote listing order.
    pub async fn list_all_catalogs(&self) -> CatalogResult<Vec<String>> {
        let mut guard = OperationGuard::start(&self.metrics, "list_all_catalogs");
        let result = self.visible_catalogs().await;
        guard.success = result.is_ok();
        result
    }

    /// Schema names of one catalog.
    pub async fn list_schemas_in_catalog(&self, catalog: &str) -> CatalogResult<Vec<String>> {
        let mut guard = OperationGuard::start(&self.metrics, "list_schemas_in_catalog");
        let result = async {
            let catalog = validate_segment("catalog_name", catalog)?;
            self.visible_schemas(catalog).await
        }
        .await;
        guard.success = result.is_ok();
        result
    }

    /// Fully-qualified names of the tables in one schema.
    pub async fn list_tables_in_schema(
        &self,
        catalog: &str,
        schema: &str,
    ) -> CatalogResult<Vec<FullTableName>> {
        let mut guard = OperationGuard::start(&self.metrics, "list_tables_in_schema");
        let result = async {
            let catalog = validate_segment("catalog_name", catalog)?;
            let schema = validate_segment("schema_name", schema)?;
            self.qualified_tables(catalog, schema).await
        }
        .await;
        guard.success = result.is_ok();
        result
    }

    /// Every table of every visible catalog and schema.
    ///
    /// Fails only if the catalog listing itself fails. A catalog whose schemas
    /// cannot be listed, or a schema whose tables cannot be listed, is skipped
    /// and reported in [`TableListing::failures`]. Ordering follows catalog,
    /// then schema, then table listing order; repeated names keep their first
    /// position.
    pub async fn list_all_tables(&self) -> CatalogResult<TableListing> {
        let mut guard = OperationGuard::start(&self.metrics, "list_all_tables");
        let result = self.collect_all_tables().await;
        guard.success = result.is_ok();
        result
    }

    /// Table metadata for a batch of fully-qualified names.
    ///
    /// Every name is validated before any remote call; one malformed name
    /// rejects the whole batch. Repeated names are fetched once. The result
    /// holds exactly one [`TableLookup`] per requested name, in request order.
    pub async fn get_table_details(&self, names: &[String]) -> CatalogResult<Vec<TableLookup>> {
        let mut guard = OperationGuard::start(&self.metrics, "get_table_details");
        let result = self.lookup_tables(names).await;
        guard.success = result.is_ok();
        result
    }

    /// Jobs defined in the workspace. Not cached.
    pub async fn list_jobs(&self) -> CatalogResult<Vec<JobSummary>> {
        let mut guard = OperationGuard::start(&self.metrics, "list_jobs");
        let result = self.client.list_jobs().await;
        self.metrics.record_remote_call(result.is_ok());
        if let Err(e) = &result {
            warn!(error = %e, "Failed to list jobs");
        }
        guard.success = result.is_ok();
        result
    }

    async fn visible_catalogs(&self) -> CatalogResult<Vec<String>> {
        let catalogs = self
            .cached(CacheKey::Catalogs, || self.client.list_catalogs())
            .await?;
        Ok(catalogs
            .iter()
            .filter(|c| {
                let excluded = self.filter.is_excluded_catalog(c);
                if excluded {
                    debug!(catalog = %c.name, "Skipping system catalog");
                }
                !excluded
            })
            .map(|c| c.name.clone())
            .collect())
    }

    async fn visible_schemas(&self, catalog: &str) -> CatalogResult<Vec<String>> {
        let schemas = self
            .cached(CacheKey::Schemas(catalog.to_string()), || {
                self.client.list_schemas(catalog)
            })
            .await?;
        Ok(schemas
            .iter()
            .filter(|s| !self.filter.is_excluded_schema(&s.name))
            .map(|s| s.name.clone())
            .collect())
    }

    async fn qualified_tables(
        &self,
        catalog: &str,
        schema: &str,
    ) -> CatalogResult<Vec<FullTableName>> {
        let tables = self
            .cached(CacheKey::Tables(catalog.to_string(), schema.to_string()), || {
                self.client.list_tables(catalog, schema)
            })
            .await?;

        let mut names = Vec::with_capacity(tables.len());
        for table in tables.iter() {
            match FullTableName::parse(&format!("{}.{}.{}", catalog, schema, table.name)) {
                Ok(name) => names.push(name),
                Err(e) => warn!(
                    catalog = %catalog,
                    schema = %schema,
                    table = %table.name,
                    error = %e,
                    "Skipping table whose name cannot be fully qualified"
                ),
            }
        }
        Ok(names)
    }

    async fn collect_all_tables(&self) -> CatalogResult<TableListing> {
        let catalogs = self.visible_catalogs().await?;
        debug!(catalogs = catalogs.len(), "Listing tables across catalogs");

        let branches = join_all(catalogs.iter().map(|catalog| self.catalog_branch(catalog))).await;

        let mut listing = TableListing::default();
        let mut seen = HashSet::new();
        for (tables, mut failures) in branches {
            for table in tables {
                let name = table.to_string();
                if seen.insert(name.clone()) {
                    listing.tables.push(name);
                }
            }
            listing.failures.append(&mut failures);
        }

        if listing.is_partial() {
            warn!(
                tables = listing.tables.len(),
                failures = listing.failures.len(),
                "Workspace table listing completed with unreadable branches"
            );
        } else {
            info!(tables = listing.tables.len(), "Workspace table listing completed");
        }
        Ok(listing)
    }

    /// Tables of one catalog, with the failures of its branches.
    async fn catalog_branch(&self, catalog: &str) -> (Vec<FullTableName>, Vec<BranchFailure>) {
        let schemas = match self.visible_schemas(catalog).await {
            Ok(schemas) => schemas,
            Err(e) => {
                warn!(catalog = %catalog, error = %e, "Failed to list schemas, skipping catalog");
                self.metrics.record_branch_failure();
                return (
                    Vec::new(),
                    vec![BranchFailure::new(BranchScope::Catalog, catalog, &e)],
                );
            }
        };

        let results = join_all(schemas.iter().map(|schema| async move {
            (schema, self.qualified_tables(catalog, schema).await)
        }))
        .await;

        let mut tables = Vec::new();
        let mut failures = Vec::new();
        for (schema, result) in results {
            match result {
                Ok(mut names) => tables.append(&mut names),
                Err(e) => {
                    warn!(
                        catalog = %catalog,
                        schema = %schema,
                        error = %e,
                        "Failed to list tables, skipping schema"
                    );
                    self.metrics.record_branch_failure();
                    failures.push(BranchFailure::new(
                        BranchScope::Schema,
                        format!("{}.{}", catalog, schema),
                        &e,
                    ));
                }
            }
        }
        (tables, failures)
    }

    async fn lookup_tables(&self, names: &[String]) -> CatalogResult<Vec<TableLookup>> {
        if names.is_empty() {
            return Err(CatalogError::invalid_argument(
                "at least one fully-qualified table name is required",
                Vec::new(),
            ));
        }

        let mut parsed = Vec::with_capacity(names.len());
        let mut malformed = Vec::new();
        for name in names {
            match FullTableName::parse(name.trim()) {
                Ok(full_name) => parsed.push(full_name),
                Err(_) => malformed.push(name.clone()),
            }
        }
        if !malformed.is_empty() {
            return Err(CatalogError::invalid_argument(
                format!(
                    "table names must have the form catalog.schema.table: {}",
                    malformed.join(", ")
                ),
                malformed,
            ));
        }

        let mut seen = HashSet::new();
        let distinct: Vec<&FullTableName> = parsed.iter().filter(|n| seen.insert(*n)).collect();
        debug!(
            requested = names.len(),
            distinct = distinct.len(),
            "Fetching table details"
        );

        let fetched = join_all(distinct.into_iter().map(|name| async move {
            let result = self
                .cached(CacheKey::Table(name.clone()), || self.client.get_table(name))
                .await;
            (name, result)
        }))
        .await;

        let mut outcomes: HashMap<&FullTableName, LookupOutcome> = HashMap::new();
        for (name, result) in fetched {
            let outcome = match result {
                Ok(details) => LookupOutcome::Table(details.as_ref().clone()),
                Err(e) => {
                    warn!(table = %name, error = %e, "Failed to fetch table details");
                    self.metrics.record_branch_failure();
                    LookupOutcome::Error(BranchFailure::new(
                        BranchScope::Table,
                        name.to_string(),
                        &e,
                    ))
                }
            };
            outcomes.insert(name, outcome);
        }

        Ok(names
            .iter()
            .zip(parsed.iter())
            .map(|(requested, full_name)| TableLookup {
                name: requested.clone(),
                outcome: outcomes
                    .get(full_name)
                    .cloned()
                    .unwrap_or_else(|| {
                        LookupOutcome::Error(BranchFailure::new(
                            BranchScope::Table,
                            full_name.to_string(),
                            &CatalogError::Cancelled,
                        ))
                    }),
            })
            .collect())
    }

    /// Serve `key` from the cache or fetch it under a fan-out permit.
    ///
    /// Concurrent misses on the same key wait for the first fetch and then
    /// read its cached value. Failures are never cached, so a waiter behind a
    /// failed fetch issues its own call.
    async fn cached<T, F, Fut>(&self, key: CacheKey, fetch: F) -> CatalogResult<Arc<T>>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CatalogResult<T>>,
    {
        let Some(cache) = &self.cache else {
            return self.fetch_remote(fetch).await.map(Arc::new);
        };

        if let Some(hit) = cache.get(&key).and_then(T::from_cached) {
            debug!(key = ?key, "Cache hit");
            return Ok(hit);
        }

        let lock = Arc::clone(&self.in_flight.entry(key.clone()).or_default());
        let _flight = lock.lock().await;
        if let Some(hit) = cache.get(&key).and_then(T::from_cached) {
            debug!(key = ?key, "Served by concurrent fetch");
            return Ok(hit);
        }

        let result = self.fetch_remote(fetch).await.map(Arc::new);
        if let Ok(value) = &result {
            cache.insert(key.clone(), T::into_cached(Arc::clone(value)));
        }
        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &lock));
        result
    }

    async fn fetch_remote<T, F, Fut>(&self, fetch: F) -> CatalogResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CatalogResult<T>>,
    {
        let result = {
            let _permit = self
                .fanout
                .acquire()
                .await
                .map_err(|_| CatalogError::Cancelled)?;
            fetch().await
        };
        self.metrics.record_remote_call(result.is_ok());
        result
    }
}

fn validate_segment<'a>(field: &str, value: &'a str) -> CatalogResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::invalid_argument(
            format!("{field} must not be empty"),
            vec![value.to_string()],
        ));
    }
    if trimmed.contains('.') {
        return Err(CatalogError::invalid_argument(
            format!("{field} must not contain '.'"),
            vec![value.to_string()],
        ));
    }
    Ok(trimmed)
}

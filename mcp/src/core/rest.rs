//! HTTP implementation of [`WorkspaceClient`] over the Databricks REST API.
//!
//! All endpoints live under `{host}/api/2.1/`. Listing endpoints are followed
//! page by page via `next_page_token`. Rate-limited responses (429, 503) are
//! retried with exponential backoff; every other failure is returned as-is.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use super::{client::WorkspaceClient, config::DatabricksConfig};
use crate::{
    error::{CatalogError, CatalogResult},
    model::{
        CatalogInfo, FullTableName, JobSummary, RawJob, SchemaInfo, TableDetails, TableSummary,
    },
};

const JOBS_PAGE_LIMIT: &str = "100";

#[derive(Debug, Clone)]
struct RetrySettings {
    initial_interval: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
}

pub struct RestWorkspaceClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    permits: Arc<Semaphore>,
    retry: RetrySettings,
}

impl std::fmt::Debug for RestWorkspaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestWorkspaceClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"****")
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl RestWorkspaceClient {
    /// Build a client from a validated configuration.
    pub fn new(config: &DatabricksConfig) -> CatalogResult<Self> {
        let base_url = Url::parse(&format!("{}/api/2.1/", config.host()))
            .map_err(|e| CatalogError::Config(format!("invalid workspace host: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.client.request_timeout())
            .user_agent(concat!("dbx-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: config.token().to_string(),
            permits: Arc::new(Semaphore::new(config.client.max_concurrent_requests)),
            retry: RetrySettings {
                initial_interval: config.client.initial_retry_interval(),
                max_interval: config.client.max_retry_interval(),
                max_elapsed: config.client.max_retry_elapsed(),
            },
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> CatalogResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CatalogError::Config(format!("invalid endpoint '{path}': {e}")))
    }

    /// GET a JSON document, retrying rate-limited responses.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> CatalogResult<T> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry.initial_interval)
            .with_max_interval(self.retry.max_interval)
            .with_max_elapsed_time(Some(self.retry.max_elapsed))
            .build();

        backoff::future::retry(backoff, || async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| backoff::Error::permanent(CatalogError::Cancelled))?;

            debug!(url = %url, "GET");
            let response = self
                .http
                .get(url.clone())
                .bearer_auth(&self.token)
                .query(query)
                .send()
                .await
                .map_err(|e| backoff::Error::permanent(CatalogError::Http(e)))?;

            let status = response.status();
            if is_rate_limited(status) {
                warn!(url = %url, status = status.as_u16(), "Rate limited by workspace API, backing off");
                return Err(backoff::Error::transient(CatalogError::upstream(
                    Some(status.as_u16()),
                    format!("rate limited on {}", url.path()),
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(error_from_body(status, &body)));
            }

            response.json::<T>().await.map_err(|e| {
                backoff::Error::permanent(CatalogError::upstream(
                    Some(status.as_u16()),
                    format!("invalid response body from {}: {}", url.path(), e),
                ))
            })
        })
        .await
    }

    /// Follow `next_page_token` until the listing is exhausted.
    async fn get_all_pages<P: Page>(
        &self,
        url: &Url,
        query: Vec<(&str, String)>,
    ) -> CatalogResult<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut page_query = query.clone();
            if let Some(token) = page_token.take() {
                page_query.push(("page_token", token));
            }
            let page: P = self.get_json(url, &page_query).await?;
            let (mut page_items, next) = page.into_parts();
            items.append(&mut page_items);

            match next.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(items)
    }
}

fn is_rate_limited(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

/// Databricks error payload: `{"error_code": "...", "message": "..."}`.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn error_from_body(status: StatusCode, body: &str) -> CatalogError {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match (parsed.error_code, parsed.message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (None, Some(message)) => message,
        (Some(code), None) => code,
        (None, None) if !body.trim().is_empty() => body.trim().to_string(),
        (None, None) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    CatalogError::upstream(Some(status.as_u16()), message)
}

/// One page of a paginated listing.
trait Page: DeserializeOwned + Send {
    type Item: Send;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

#[derive(Deserialize)]
struct CatalogsPage {
    #[serde(default)]
    catalogs: Vec<CatalogInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl Page for CatalogsPage {
    type Item = CatalogInfo;

    fn into_parts(self) -> (Vec<CatalogInfo>, Option<String>) {
        (self.catalogs, self.next_page_token)
    }
}

#[derive(Deserialize)]
struct SchemasPage {
    #[serde(default)]
    schemas: Vec<SchemaInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl Page for SchemasPage {
    type Item = SchemaInfo;

    fn into_parts(self) -> (Vec<SchemaInfo>, Option<String>) {
        (self.schemas, self.next_page_token)
    }
}

#[derive(Deserialize)]
struct TablesPage {
    #[serde(default)]
    tables: Vec<TableSummary>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl Page for TablesPage {
    type Item = TableSummary;

    fn into_parts(self) -> (Vec<TableSummary>, Option<String>) {
        (self.tables, self.next_page_token)
    }
}

#[derive(Deserialize)]
struct JobsPage {
    #[serde(default)]
    jobs: Vec<RawJob>,
    #[serde(default)]
    has_more: Option<bool>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl Page for JobsPage {
    type Item = RawJob;

    fn into_parts(self) -> (Vec<RawJob>, Option<String>) {
        let next = if self.has_more == Some(false) {
            None
        } else {
            self.next_page_token
        };
        (self.jobs, next)
    }
}

#[async_trait]
impl WorkspaceClient for RestWorkspaceClient {
    async fn list_catalogs(&self) -> CatalogResult<Vec<CatalogInfo>> {
        let url = self.endpoint("unity-catalog/catalogs")?;
        self.get_all_pages::<CatalogsPage>(&url, Vec::new()).await
    }

    async fn list_schemas(&self, catalog: &str) -> CatalogResult<Vec<SchemaInfo>> {
        let url = self.endpoint("unity-catalog/schemas")?;
        let mut schemas = self
            .get_all_pages::<SchemasPage>(&url, vec![("catalog_name", catalog.to_string())])
            .await?;
        for schema in schemas.iter_mut().filter(|s| s.catalog_name.is_empty()) {
            schema.catalog_name = catalog.to_string();
        }
        Ok(schemas)
    }

    async fn list_tables(&self, catalog: &str, schema: &str) -> CatalogResult<Vec<TableSummary>> {
        let url = self.endpoint("unity-catalog/tables")?;
        let mut tables = self
            .get_all_pages::<TablesPage>(
                &url,
                vec![
                    ("catalog_name", catalog.to_string()),
                    ("schema_name", schema.to_string()),
                ],
            )
            .await?;
        for table in tables.iter_mut() {
            if table.catalog_name.is_empty() {
                table.catalog_name = catalog.to_string();
            }
            if table.schema_name.is_empty() {
                table.schema_name = schema.to_string();
            }
        }
        Ok(tables)
    }

    async fn get_table(&self, name: &FullTableName) -> CatalogResult<TableDetails> {
        let mut url = self.endpoint("unity-catalog/tables/")?;
        url.path_segments_mut()
            .map_err(|_| CatalogError::Config("workspace host cannot be a base URL".into()))?
            .pop_if_empty()
            .push(&name.to_string());
        self.get_json(&url, &[]).await
    }

    async fn list_jobs(&self) -> CatalogResult<Vec<JobSummary>> {
        let url = self.endpoint("jobs/list")?;
        let jobs = self
            .get_all_pages::<JobsPage>(
                &url,
                vec![
                    ("expand_tasks", "false".to_string()),
                    ("limit", JOBS_PAGE_LIMIT.to_string()),
                ],
            )
            .await?;
        Ok(jobs.into_iter().map(JobSummary::from_raw).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_databricks_body() {
        let err = error_from_body(
            StatusCode::FORBIDDEN,
            r#"{"error_code":"PERMISSION_DENIED","message":"User does not have USE CATALOG on Catalog 'hr'."}"#,
        );
        match err {
            CatalogError::Upstream { status, message } => {
                assert_eq!(status, Some(403));
                assert!(message.starts_with("PERMISSION_DENIED: "));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_plain_body() {
        let err = error_from_body(StatusCode::BAD_GATEWAY, "upstream connect error");
        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("upstream connect error"));

        let err = error_from_body(StatusCode::NOT_FOUND, "");
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_jobs_page_stops_when_no_more() {
        let page: JobsPage = serde_json::from_str(
            r#"{"jobs":[{"job_id":1,"settings":{"name":"a"}}],"has_more":false,"next_page_token":"x"}"#,
        )
        .unwrap();
        let (jobs, next) = page.into_parts();
        assert_eq!(jobs.len(), 1);
        assert_eq!(next, None);
    }

    #[test]
    fn test_empty_listing_pages() {
        let page: CatalogsPage = serde_json::from_str("{}").unwrap();
        let (items, next) = page.into_parts();
        assert!(items.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn test_client_builds_api_base_url() {
        let mut config = DatabricksConfig::default();
        config.workspace.host = Some("adb-1.azuredatabricks.net".into());
        config.workspace.token = Some("t".into());
        config.validate().unwrap();

        let client = RestWorkspaceClient::new(&config).unwrap();
        assert_eq!(
            client.base_url().as_str(),
            "https://adb-1.azuredatabricks.net/api/2.1/"
        );
        assert!(!format!("{client:?}").contains("\"t\""));
    }
}

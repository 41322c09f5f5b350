//! MCP tool server over the catalog aggregator.
//!
//! Registers the workspace operations as named tools. Each call is raced
//! against the request's cancellation token: a cancelled request drops the
//! whole aggregate future, so no partial payload is ever returned.

use std::{future::Future, path::PathBuf, sync::Arc};

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo},
    schemars,
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    core::{aggregator::CatalogAggregator, config::DatabricksProfile},
    error::{CatalogError, CatalogResult},
    response::ToolResponse,
};

const INSTRUCTIONS: &str = "Read-only access to Databricks Unity Catalog metadata and workspace jobs. \
Use get-all-catalogs-schemas-tables-in-workspace to discover fully-qualified table names \
(catalog.schema.table), then get-table-details for their columns and descriptions.";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TableDetailsRequest {
    /// Fully-qualified table names in the form catalog.schema.table
    pub full_table_names: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListSchemasRequest {
    /// Name of the catalog to list schemas from
    pub catalog_name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListTablesRequest {
    /// Name of the catalog containing the schema
    pub catalog_name: String,
    /// Name of the schema to list tables from
    pub schema_name: String,
}

/// Profile entry exposed to agents. Never carries the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub host: Option<String>,
}

#[derive(Clone)]
pub struct DatabricksMcpServer {
    aggregator: Arc<CatalogAggregator>,
    profiles_path: Option<PathBuf>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DatabricksMcpServer {
    pub fn new(aggregator: Arc<CatalogAggregator>) -> Self {
        Self {
            aggregator,
            profiles_path: DatabricksProfile::default_path(),
            tool_router: Self::tool_router(),
        }
    }

    /// Read profiles from `path` instead of `~/.databrickscfg`.
    pub fn with_profiles_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profiles_path = Some(path.into());
        self
    }

    pub fn aggregator(&self) -> &Arc<CatalogAggregator> {
        &self.aggregator
    }

    /// Serve MCP over stdin/stdout until the client disconnects.
    pub async fn serve_stdio(self) -> CatalogResult<()> {
        info!("Serving MCP over stdio");
        let service = self
            .serve(stdio())
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        let reason = service
            .waiting()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        info!(reason = ?reason, "MCP session ended");
        Ok(())
    }

    #[tool(
        name = "get-all-catalogs-schemas-tables-in-workspace",
        description = "List every table in the workspace as fully-qualified names \
(catalog.schema.table). System catalogs are excluded. Catalogs or schemas that \
cannot be read are reported under `failures` while the rest are still returned."
    )]
    async fn get_all_tables(
        &self,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        run_cancellable(
            &ctx.ct,
            "get-all-catalogs-schemas-tables-in-workspace",
            self.all_tables(),
        )
        .await
    }

    #[tool(
        name = "get-table-details",
        description = "Get columns, types and descriptions for one or more tables. \
Input names must be fully-qualified (catalog.schema.table). Each requested name \
maps to either a table descriptor or an error descriptor."
    )]
    async fn get_table_details(
        &self,
        Parameters(request): Parameters<TableDetailsRequest>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        run_cancellable(&ctx.ct, "get-table-details", self.table_details(request)).await
    }

    #[tool(
        name = "get-jobs-in-workspace",
        description = "List the jobs defined in the workspace with their id, name and settings."
    )]
    async fn get_jobs(&self, ctx: RequestContext<RoleServer>) -> Result<CallToolResult, McpError> {
        run_cancellable(&ctx.ct, "get-jobs-in-workspace", self.jobs()).await
    }

    #[tool(
        name = "list-catalogs",
        description = "List the names of all user-visible catalogs in the workspace."
    )]
    async fn list_catalogs(
        &self,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        run_cancellable(&ctx.ct, "list-catalogs", self.catalogs()).await
    }

    #[tool(name = "list-schemas", description = "List the schema names of one catalog.")]
    async fn list_schemas(
        &self,
        Parameters(request): Parameters<ListSchemasRequest>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        run_cancellable(&ctx.ct, "list-schemas", self.schemas(request)).await
    }

    #[tool(
        name = "list-tables",
        description = "List the fully-qualified names of the tables in one schema."
    )]
    async fn list_tables(
        &self,
        Parameters(request): Parameters<ListTablesRequest>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        run_cancellable(&ctx.ct, "list-tables", self.tables(request)).await
    }

    #[tool(
        name = "get-databricks-profiles",
        description = "List the profiles configured in ~/.databrickscfg (name and host only)."
    )]
    async fn get_databricks_profiles(&self) -> Result<CallToolResult, McpError> {
        Ok(self.profiles().await)
    }
}

impl DatabricksMcpServer {
    async fn all_tables(&self) -> CallToolResult {
        match self.aggregator.list_all_tables().await {
            Ok(listing) => ToolResponse::partial(&listing.tables, &listing.failures),
            Err(e) => ToolResponse::error(&e),
        }
    }

    async fn table_details(&self, request: TableDetailsRequest) -> CallToolResult {
        match self
            .aggregator
            .get_table_details(&request.full_table_names)
            .await
        {
            Ok(lookups) => {
                let failures: Vec<_> = lookups.iter().filter_map(|l| l.error().cloned()).collect();
                ToolResponse::partial(&lookups, &failures)
            }
            Err(e) => ToolResponse::error(&e),
        }
    }

    async fn jobs(&self) -> CallToolResult {
        match self.aggregator.list_jobs().await {
            Ok(jobs) => ToolResponse::success(&jobs),
            Err(e) => ToolResponse::error(&e),
        }
    }

    async fn catalogs(&self) -> CallToolResult {
        match self.aggregator.list_all_catalogs().await {
            Ok(catalogs) => ToolResponse::success(&catalogs),
            Err(e) => ToolResponse::error(&e),
        }
    }

    async fn schemas(&self, request: ListSchemasRequest) -> CallToolResult {
        match self
            .aggregator
            .list_schemas_in_catalog(&request.catalog_name)
            .await
        {
            Ok(schemas) => ToolResponse::success(&schemas),
            Err(e) => ToolResponse::error(&e),
        }
    }

    async fn tables(&self, request: ListTablesRequest) -> CallToolResult {
        match self
            .aggregator
            .list_tables_in_schema(&request.catalog_name, &request.schema_name)
            .await
        {
            Ok(tables) => {
                let names: Vec<String> = tables.iter().map(ToString::to_string).collect();
                ToolResponse::success(&names)
            }
            Err(e) => ToolResponse::error(&e),
        }
    }

    async fn profiles(&self) -> CallToolResult {
        let Some(path) = self.profiles_path.as_ref().filter(|p| p.exists()) else {
            debug!("No Databricks config file found");
            return ToolResponse::success(&Vec::<ProfileSummary>::new());
        };
        match DatabricksProfile::load_all(path).await {
            Ok(profiles) => {
                let summaries: Vec<ProfileSummary> = profiles
                    .into_iter()
                    .map(|p| ProfileSummary {
                        name: p.name,
                        host: p.host,
                    })
                    .collect();
                ToolResponse::success(&summaries)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read Databricks profiles");
                ToolResponse::error(&e)
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for DatabricksMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }
}

/// Run a tool body unless the request is cancelled first.
async fn run_cancellable<F>(
    ct: &CancellationToken,
    tool: &'static str,
    body: F,
) -> Result<CallToolResult, McpError>
where
    F: Future<Output = CallToolResult>,
{
    debug!(tool, "Tool call started");
    tokio::select! {
        biased;
        _ = ct.cancelled() => {
            info!(tool, "Tool call cancelled");
            Err(McpError::internal_error(
                format!("{tool}: {}", CatalogError::Cancelled),
                None,
            ))
        }
        result = body => Ok(result),
    }
}

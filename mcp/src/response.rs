//! Tool response envelopes.
//!
//! Every tool answers with a single JSON text item so agents get one stable
//! shape to parse:
//!
//! ```json
//! {"success": true, "content": ...}
//! {"success": true, "partial": true, "content": ..., "failures": [...]}
//! {"success": false, "error": {"kind": "invalid_argument", "message": "...", "input": [...]}}
//! ```

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::error::{BranchFailure, CatalogError};

/// Builds MCP tool results from catalog outcomes.
pub struct ToolResponse;

impl ToolResponse {
    pub fn success<T: Serialize>(content: &T) -> CallToolResult {
        match serde_json::to_value(content) {
            Ok(content) => Self::text(
                json!({
                    "success": true,
                    "content": content,
                }),
                false,
            ),
            Err(e) => Self::serialization_failure(e),
        }
    }

    /// Success that may carry branch failures. With no failures this is a
    /// plain success envelope.
    pub fn partial<T: Serialize>(content: &T, failures: &[BranchFailure]) -> CallToolResult {
        if failures.is_empty() {
            return Self::success(content);
        }
        match (serde_json::to_value(content), serde_json::to_value(failures)) {
            (Ok(content), Ok(failures)) => Self::text(
                json!({
                    "success": true,
                    "partial": true,
                    "content": content,
                    "failures": failures,
                }),
                false,
            ),
            (Err(e), _) | (_, Err(e)) => Self::serialization_failure(e),
        }
    }

    pub fn error(err: &CatalogError) -> CallToolResult {
        Self::text(json!({ "success": false, "error": error_body(err) }), true)
    }

    fn serialization_failure(e: serde_json::Error) -> CallToolResult {
        error!(error = %e, "Failed to serialize tool response");
        Self::text(
            json!({
                "success": false,
                "error": {"kind": "internal", "message": format!("Failed to serialize response: {e}")},
            }),
            true,
        )
    }

    fn text(body: Value, is_error: bool) -> CallToolResult {
        let content = vec![Content::text(body.to_string())];
        if is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        }
    }
}

fn error_body(err: &CatalogError) -> Value {
    let mut body = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });
    if let CatalogError::InvalidArgument { input, .. } = err {
        if !input.is_empty() {
            body["input"] = json!(input);
        }
    }
    if let Some(status) = err.status() {
        body["status"] = json!(status);
    }
    body
}

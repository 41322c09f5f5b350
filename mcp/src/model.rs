//! Unity Catalog and Jobs entity types.
//!
//! Wire types mirror the Databricks REST payloads closely enough to
//! deserialize them directly; unknown fields are ignored.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Three-level table identifier: `catalog.schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FullTableName {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl FullTableName {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Parse from `catalog.schema.table`.
    ///
    /// Exactly three segments are required and none may be empty or blank.
    /// Whitespace around each segment is dropped.
    pub fn parse(s: &str) -> CatalogResult<Self> {
        let segments: Vec<&str> = s.split('.').map(str::trim).collect();
        if segments.len() != 3 {
            return Err(CatalogError::invalid_argument(
                format!(
                    "'{}' must have exactly three dot-separated segments (catalog.schema.table), found {}",
                    s,
                    segments.len()
                ),
                vec![s.to_string()],
            ));
        }
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(CatalogError::invalid_argument(
                format!("'{}' contains an empty segment", s),
                vec![s.to_string()],
            ));
        }
        Ok(Self::new(segments[0], segments[1], segments[2]))
    }
}

impl fmt::Display for FullTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

impl FromStr for FullTableName {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CatalogInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_by: None,
            catalog_type: None,
            comment: None,
        }
    }

    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    #[serde(default)]
    pub catalog_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SchemaInfo {
    pub fn new(catalog_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catalog_name: catalog_name.into(),
            comment: None,
        }
    }
}

/// Table entry as returned by the table listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    #[serde(default)]
    pub catalog_name: String,
    #[serde(default)]
    pub schema_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
}

impl TableSummary {
    pub fn new(
        catalog_name: impl Into<String>,
        schema_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            catalog_name: catalog_name.into(),
            schema_name: schema_name.into(),
            table_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Vendor type in string form, e.g. `bigint` or `array<string>`.
    #[serde(default)]
    pub type_text: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_text: type_text.into(),
            nullable: true,
            comment: None,
            position: None,
        }
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Full table metadata from the single-table endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDetails {
    pub name: String,
    #[serde(default)]
    pub catalog_name: String,
    #[serde(default)]
    pub schema_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
    /// Table description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

impl TableDetails {
    pub fn new(name: &FullTableName, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.table.clone(),
            catalog_name: name.catalog.clone(),
            schema_name: name.schema.clone(),
            full_name: Some(name.to_string()),
            table_type: None,
            comment: None,
            columns,
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Job as returned by `jobs/list`; only the documented subset is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Job configuration, passed through unmodified.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl JobSummary {
    /// Build from a raw `jobs/list` entry. The name lives in `settings.name`.
    pub fn from_raw(raw: RawJob) -> Self {
        let name = raw
            .settings
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self {
            job_id: raw.job_id,
            name,
            settings: raw.settings,
        }
    }
}

/// Raw `jobs/list` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub job_id: i64,
    #[serde(default)]
    pub settings: serde_json::Value,
}

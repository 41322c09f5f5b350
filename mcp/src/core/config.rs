//! Configuration types and resolution.
//!
//! Defines the workspace credentials, HTTP client limits, cache sizing and
//! catalog filters, and resolves them from a YAML file, a `~/.databrickscfg`
//! profile, environment variables and explicit overrides.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CatalogError, CatalogResult};

pub const HOST_ENV: &str = "DATABRICKS_HOST";
pub const TOKEN_ENV: &str = "DATABRICKS_TOKEN";
pub const PROFILE_ENV: &str = "DATABRICKS_CONFIG_PROFILE";
pub const CONFIG_FILE_ENV: &str = "DATABRICKS_CONFIG_FILE";
pub const DEFAULT_PROFILE: &str = "DEFAULT";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabricksConfig {
    /// Workspace URL and access token
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// HTTP client limits and retry settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Metadata cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Catalog and schema exclusion rules
    #[serde(default)]
    pub filters: FilterConfig,
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    /// Workspace URL, e.g. `https://adb-123.4.azuredatabricks.net`
    #[serde(default)]
    pub host: Option<String>,

    /// Personal access token sent as a Bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "****"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Maximum simultaneous in-flight requests against the workspace API
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// First backoff interval after a rate-limited response (milliseconds)
    #[serde(default = "default_initial_retry_interval")]
    pub initial_retry_interval_ms: u64,

    /// Upper bound on a single backoff interval (seconds)
    #[serde(default = "default_max_retry_interval")]
    pub max_retry_interval_secs: u64,

    /// Give up retrying rate-limited requests after this long (seconds)
    #[serde(default = "default_max_retry_elapsed")]
    pub max_retry_elapsed_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How long a cached listing is served before refetching (seconds)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum cached entries before least-recently-used eviction
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Skip catalogs whose owner is `system_owner`
    #[serde(default = "default_true")]
    pub exclude_system_owned: bool,

    #[serde(default = "default_system_owner")]
    pub system_owner: String,

    /// Hidden catalog names; a trailing `*` matches any suffix
    #[serde(default = "default_reserved_catalogs")]
    pub reserved_catalogs: Vec<String>,

    /// Schema names hidden from every listing
    #[serde(default = "default_excluded_schemas")]
    pub excluded_schemas: Vec<String>,
}

// Default value functions
fn default_max_concurrent_requests() -> usize {
    16
}

fn default_request_timeout() -> u64 {
    30
}

fn default_initial_retry_interval() -> u64 {
    500
}

fn default_max_retry_interval() -> u64 {
    8
}

fn default_max_retry_elapsed() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    120 // 2 minutes
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_system_owner() -> String {
    "System user".to_string()
}

fn default_reserved_catalogs() -> Vec<String> {
    vec!["system".to_string(), "__*".to_string()]
}

fn default_excluded_schemas() -> Vec<String> {
    vec!["information_schema".to_string()]
}

// Default implementations
impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            request_timeout_secs: default_request_timeout(),
            initial_retry_interval_ms: default_initial_retry_interval(),
            max_retry_interval_secs: default_max_retry_interval(),
            max_retry_elapsed_secs: default_max_retry_elapsed(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude_system_owned: true,
            system_owner: default_system_owner(),
            reserved_catalogs: default_reserved_catalogs(),
            excluded_schemas: default_excluded_schemas(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_retry_interval(&self) -> Duration {
        Duration::from_millis(self.initial_retry_interval_ms)
    }

    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_secs(self.max_retry_interval_secs)
    }

    pub fn max_retry_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_retry_elapsed_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Values supplied on the command line or by the embedding process.
///
/// Every `Some` field wins over the file, profile and environment.
#[derive(Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub profile: Option<String>,
    pub profiles_file: Option<PathBuf>,
    pub host: Option<String>,
    pub token: Option<String>,
    pub max_concurrent_requests: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_capacity: Option<usize>,
    pub disable_cache: bool,
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("config_file", &self.config_file)
            .field("profile", &self.profile)
            .field("profiles_file", &self.profiles_file)
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "****"))
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_capacity", &self.cache_capacity)
            .field("disable_cache", &self.disable_cache)
            .finish()
    }
}

impl DatabricksConfig {
    /// Load configuration from a YAML file
    pub async fn from_file(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
            .map_err(|e| CatalogError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> CatalogResult<Self> {
        serde_yaml::from_str(content).map_err(|e| CatalogError::Config(e.to_string()))
    }

    /// Resolve the effective configuration.
    ///
    /// Precedence, lowest first: defaults, YAML file, `~/.databrickscfg`
    /// profile, `DATABRICKS_HOST`/`DATABRICKS_TOKEN`, explicit overrides.
    /// The result is validated before it is returned.
    pub async fn resolve(overrides: ConfigOverrides) -> CatalogResult<Self> {
        let mut config = match &overrides.config_file {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };

        let profile_name = overrides
            .profile
            .clone()
            .or_else(|| std::env::var(PROFILE_ENV).ok())
            .filter(|p| !p.trim().is_empty());
        let explicit_profile = profile_name.is_some();
        let profile_name = profile_name.unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let profiles_path = overrides
            .profiles_file
            .clone()
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from))
            .or_else(DatabricksProfile::default_path);

        if let Some(path) = profiles_path.filter(|p| p.exists()) {
            let profiles = DatabricksProfile::load_all(&path).await?;
            match profiles.into_iter().find(|p| p.name == profile_name) {
                Some(profile) => {
                    debug!(profile = %profile.name, path = %path.display(), "Using Databricks profile");
                    config.apply_profile(profile);
                }
                None if explicit_profile => {
                    return Err(CatalogError::Config(format!(
                        "profile '{}' not found in {}",
                        profile_name,
                        path.display()
                    )));
                }
                None => {}
            }
        } else if explicit_profile {
            return Err(CatalogError::Config(format!(
                "profile '{}' requested but no Databricks config file was found",
                profile_name
            )));
        }

        if let Ok(host) = std::env::var(HOST_ENV) {
            config.workspace.host = Some(host);
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.workspace.token = Some(token);
        }

        config.apply_overrides(&overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_profile(&mut self, profile: DatabricksProfile) {
        if profile.host.is_some() {
            self.workspace.host = profile.host;
        }
        if profile.token.is_some() {
            self.workspace.token = profile.token;
        }
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.host {
            self.workspace.host = Some(host.clone());
        }
        if let Some(token) = &overrides.token {
            self.workspace.token = Some(token.clone());
        }
        if let Some(max) = overrides.max_concurrent_requests {
            self.client.max_concurrent_requests = max;
        }
        if let Some(ttl) = overrides.cache_ttl_secs {
            self.cache.ttl_secs = ttl;
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = capacity;
        }
        if overrides.disable_cache {
            self.cache.enabled = false;
        }
    }

    /// Check that credentials are present and limits are usable.
    ///
    /// Normalizes the host to an `https://` URL without a trailing slash.
    pub fn validate(&mut self) -> CatalogResult<()> {
        let host = self
            .workspace
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                CatalogError::Config(format!(
                    "workspace host is not set (use {HOST_ENV}, a profile, or --host)"
                ))
            })?;
        self.workspace.host = Some(normalize_host(host)?);

        let token_missing = self
            .workspace
            .token
            .as_deref()
            .map(|t| t.trim().is_empty())
            .unwrap_or(true);
        if token_missing {
            return Err(CatalogError::Config(format!(
                "access token is not set (use {TOKEN_ENV}, a profile, or --token)"
            )));
        }

        if self.client.max_concurrent_requests == 0 {
            return Err(CatalogError::Config(
                "client.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        let limits = [
            ("request_timeout_secs", self.client.request_timeout_secs),
            ("initial_retry_interval_ms", self.client.initial_retry_interval_ms),
            ("max_retry_interval_secs", self.client.max_retry_interval_secs),
            ("max_retry_elapsed_secs", self.client.max_retry_elapsed_secs),
        ];
        if let Some((field, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(CatalogError::Config(format!("client.{field} must be at least 1")));
        }
        if self.cache.enabled && (self.cache.capacity == 0 || self.cache.ttl_secs == 0) {
            return Err(CatalogError::Config(
                "cache.capacity and cache.ttl_secs must be positive when the cache is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Workspace host after validation.
    pub fn host(&self) -> &str {
        self.workspace.host.as_deref().unwrap_or_default()
    }

    /// Access token after validation.
    pub fn token(&self) -> &str {
        self.workspace.token.as_deref().unwrap_or_default()
    }
}

fn normalize_host(host: &str) -> CatalogResult<String> {
    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let parsed = url::Url::parse(&with_scheme)
        .map_err(|e| CatalogError::Config(format!("invalid workspace host '{host}': {e}")))?;
    if parsed.host_str().is_none() {
        return Err(CatalogError::Config(format!(
            "invalid workspace host '{host}': missing host name"
        )));
    }
    Ok(with_scheme.trim_end_matches('/').to_string())
}

/// One `[section]` of a `~/.databrickscfg` file.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabricksProfile {
    pub name: String,
    pub host: Option<String>,
    pub token: Option<String>,
}

impl fmt::Debug for DatabricksProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabricksProfile")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "****"))
            .finish()
    }
}

impl DatabricksProfile {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".databrickscfg"))
    }

    pub async fn load_all(path: impl AsRef<Path>) -> CatalogResult<Vec<Self>> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(Self::parse_all(&content))
    }

    /// Parse INI-style profile sections. Keys outside a section, comments
    /// (`#`, `;`) and unknown keys are ignored; section order is preserved.
    pub fn parse_all(content: &str) -> Vec<Self> {
        let mut sections: Vec<(String, BTreeMap<String, String>)> = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push((name.trim().to_string(), BTreeMap::new()));
                continue;
            }
            if let (Some((key, value)), Some((_, entries))) =
                (line.split_once('='), sections.last_mut())
            {
                entries.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        sections
            .into_iter()
            .map(|(name, mut entries)| Self {
                name,
                host: entries.remove("host").filter(|v| !v.is_empty()),
                token: entries.remove("token").filter(|v| !v.is_empty()),
            })
            .collect()
    }
}

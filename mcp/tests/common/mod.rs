//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod mock_client;
pub mod mock_workspace;

use dbx_mcp::DatabricksConfig;

pub const TEST_TOKEN: &str = "dapi-test-token";

/// Validated configuration pointing at `host` with fast retries.
pub fn test_config(host: &str) -> DatabricksConfig {
    let mut config = DatabricksConfig::default();
    config.workspace.host = Some(host.to_string());
    config.workspace.token = Some(TEST_TOKEN.to_string());
    config.client.initial_retry_interval_ms = 10;
    config.client.max_retry_interval_secs = 1;
    config.client.max_retry_elapsed_secs = 5;
    config.validate().expect("test config is valid");
    config
}

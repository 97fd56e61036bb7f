//! Settings Models
//!
//! Application configuration and settings data structures.

use serde::{Deserialize, Serialize};
use sitewatch_steps::StepKind;

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Base URL of the analysis API (e.g. "https://api.sitewatch.io")
    pub api_base_url: String,
    /// Analytics collector endpoint; telemetry is logged locally when unset
    #[serde(default)]
    pub analytics_endpoint: Option<String>,
    /// Enable telemetry events
    pub telemetry_enabled: bool,
    /// Age in seconds after which a running run may be force-reset
    pub stale_run_secs: u64,
    /// Maximum age in seconds of a persisted run snapshot
    pub snapshot_ttl_secs: u64,
    /// Storage key of the persisted run snapshot
    pub storage_key: String,
    /// Storage key of the session auth token
    pub auth_token_key: String,
    /// Steps skipped by every run regardless of selection
    #[serde(default)]
    pub disabled_steps: Vec<StepKind>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3001".to_string(),
            analytics_endpoint: None,
            telemetry_enabled: true,
            stale_run_secs: 300,
            snapshot_ttl_secs: 3600,
            storage_key: "site-analysis-state".to_string(),
            auth_token_key: "token".to_string(),
            disabled_steps: Vec::new(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub api_base_url: Option<String>,
    pub analytics_endpoint: Option<Option<String>>,
    pub telemetry_enabled: Option<bool>,
    pub stale_run_secs: Option<u64>,
    pub snapshot_ttl_secs: Option<u64>,
    pub disabled_steps: Option<Vec<StepKind>>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(url) = update.api_base_url {
            self.api_base_url = url;
        }
        if let Some(endpoint) = update.analytics_endpoint {
            self.analytics_endpoint = endpoint;
        }
        if let Some(enabled) = update.telemetry_enabled {
            self.telemetry_enabled = enabled;
        }
        if let Some(secs) = update.stale_run_secs {
            self.stale_run_secs = secs;
        }
        if let Some(secs) = update.snapshot_ttl_secs {
            self.snapshot_ttl_secs = secs;
        }
        if let Some(disabled) = update.disabled_steps {
            self.disabled_steps = disabled;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(format!(
                "Invalid apiBaseUrl: {}. Must start with http:// or https://",
                self.api_base_url
            ));
        }

        if let Some(endpoint) = &self.analytics_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(format!("Invalid analyticsEndpoint: {}", endpoint));
            }
        }

        if self.stale_run_secs == 0 {
            return Err("staleRunSecs must be greater than 0".to_string());
        }

        if self.snapshot_ttl_secs == 0 {
            return Err("snapshotTtlSecs must be greater than 0".to_string());
        }

        if self.storage_key.trim().is_empty() || self.auth_token_key.trim().is_empty() {
            return Err("storage keys cannot be empty".to_string());
        }

        Ok(())
    }
}

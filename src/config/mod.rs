use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.rabby.io";
pub const DEFAULT_APPROVAL_STATUS_PATH: &str = "/v1/user/approval_status";
/// Deployments whose backend names the count route differently override
/// `approval_count_path`.
pub const DEFAULT_APPROVAL_COUNT_PATH: &str = "/v1/user/total_approval_count";

/// Limits for one task queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Length of the rolling rate window
    pub window_ms: u64,
    /// Max tasks started inside any window
    pub max_starts_per_window: usize,
    /// Max tasks running at once
    pub max_concurrent: usize,
    /// Per-task deadline; `None` waits on the task forever
    pub task_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            window_ms: 1_000,
            max_starts_per_window: 10,
            max_concurrent: 5,
            task_timeout_ms: Some(30_000),
        }
    }
}

impl QueueConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err("queue window_ms must be greater than zero".into());
        }
        if self.max_starts_per_window == 0 {
            return Err("queue max_starts_per_window must be greater than zero".into());
        }
        if self.max_concurrent == 0 {
            return Err("queue max_concurrent must be greater than zero".into());
        }
        if self.task_timeout_ms == Some(0) {
            return Err("queue task_timeout_ms must be greater than zero".into());
        }
        Ok(())
    }
}

/// Settings for the approval counter and the alert aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub api_base_url: String,
    /// Route for per-chain approval risk entries, relative to `api_base_url`
    pub approval_status_path: String,
    /// Route for the approval count, relative to `api_base_url`
    pub approval_count_path: String,
    /// HTTP client timeout for each request
    pub request_timeout_ms: u64,
    /// Minimum gap between two alert recomputations
    pub alert_cache_time_ms: u64,
    pub count_queue: QueueConfig,
    pub alert_queue: QueueConfig,
    /// Drives the optional background poller
    pub poll_interval_ms: Option<u64>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            approval_status_path: DEFAULT_APPROVAL_STATUS_PATH.to_string(),
            approval_count_path: DEFAULT_APPROVAL_COUNT_PATH.to_string(),
            request_timeout_ms: 15_000,
            alert_cache_time_ms: 60_000,
            count_queue: QueueConfig::default(),
            alert_queue: QueueConfig::default(),
            poll_interval_ms: None,
        }
    }
}

impl ApprovalConfig {
    /// Parse a JSON document; missing fields fall back to defaults
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err("api_base_url must not be empty".into());
        }
        for (name, path) in [
            ("approval_status_path", &self.approval_status_path),
            ("approval_count_path", &self.approval_count_path),
        ] {
            if !path.starts_with('/') {
                return Err(format!("{} must start with '/'", name).into());
            }
        }
        if self.poll_interval_ms == Some(0) {
            return Err("poll_interval_ms must be greater than zero".into());
        }
        self.count_queue
            .validate()
            .map_err(|e| ConfigError::from(format!("count_queue: {}", e)))?;
        self.alert_queue
            .validate()
            .map_err(|e| ConfigError::from(format!("alert_queue: {}", e)))?;
        Ok(())
    }
}

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::api::types::{ApprovalCount, ApprovalStatus};
use crate::config::{ApprovalConfig, DEFAULT_APPROVAL_COUNT_PATH, DEFAULT_APPROVAL_STATUS_PATH};
use crate::error::{ApiError, ApiErrorKind};

type Result<T> = std::result::Result<T, ApiError>;

/// Read-only calls the approval layer needs from the backend.
/// Both calls are idempotent; failures come back as `ApiError`.
#[async_trait]
pub trait ApprovalApi: Send + Sync {
    /// Per-chain risk entries for an address
    async fn get_approval_status(&self, address: &str) -> Result<Vec<ApprovalStatus>>;

    /// Number of assets with approvals for an address
    async fn get_approval_count(&self, address: &str) -> Result<ApprovalCount>;
}

/// reqwest-backed client for the wallet's open API
pub struct OpenApiClient {
    base_url: String,
    status_path: String,
    count_path: String,
    http_client: HttpClient,
}

impl OpenApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::new(ApiErrorKind::Transport, format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            status_path: DEFAULT_APPROVAL_STATUS_PATH.to_string(),
            count_path: DEFAULT_APPROVAL_COUNT_PATH.to_string(),
            http_client,
        })
    }

    /// Override the status and count routes
    pub fn with_paths(mut self, status_path: &str, count_path: &str) -> Self {
        self.status_path = status_path.to_string();
        self.count_path = count_path.to_string();
        self
    }

    pub fn from_config(config: &ApprovalConfig) -> Result<Self> {
        Ok(Self::new(&config.api_base_url, config.request_timeout())?
            .with_paths(&config.approval_status_path, &config.approval_count_path))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn count_url(&self) -> String {
        format!("{}{}", self.base_url, self.count_path)
    }

    pub fn status_url(&self) -> String {
        format!("{}{}", self.base_url, self.status_path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, address: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("[ApprovalApi] GET {} id={}", url, address);

        let response = self
            .http_client
            .get(&url)
            .query(&[("id", address)])
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::status(status.as_u16(), error_text));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            ApiError::new(
                ApiErrorKind::Decode,
                format!("{} - Response: {}", e, response_text),
            )
        })
    }
}

#[async_trait]
impl ApprovalApi for OpenApiClient {
    async fn get_approval_status(&self, address: &str) -> Result<Vec<ApprovalStatus>> {
        self.get_json(&self.status_path, address).await
    }

    async fn get_approval_count(&self, address: &str) -> Result<ApprovalCount> {
        self.get_json(&self.count_path, address).await
    }
}

//! Polls delivery, connection and performance stats from a JSON endpoint
//!
//! ```text
//! GET {url}/delivery     → DeliverySnapshot
//! GET {url}/connections  → ConnectionSnapshot
//! GET {url}/performance  → PerformanceSnapshot (application-level fields)
//! ```
//!
//! The optional token is sent in the `X-MONITORING-SECRET` header.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{instrument, trace};

use crate::config::SourceConfig;
use crate::metrics::{ConnectionSnapshot, DeliverySnapshot, PerformanceSnapshot};

use super::{ConnectionStatsProvider, DeliveryStatsProvider, PerformanceStatsProvider};

const SECRET_HEADER: &str = "X-MONITORING-SECRET";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RemoteStatsProvider {
    base_url: String,
    token: Option<String>,
    /// Reused across requests
    client: reqwest::Client,
}

impl RemoteStatsProvider {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token,
            client,
        })
    }

    #[instrument(skip(self))]
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        trace!("requesting stats from {url}");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header(SECRET_HEADER, token);
        }

        let response = request
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        serde_json::from_str(&body).with_context(|| format!("failed to parse {path} stats JSON"))
    }
}

#[async_trait]
impl DeliveryStatsProvider for RemoteStatsProvider {
    async fn delivery_stats(&self) -> Result<DeliverySnapshot> {
        let mut snapshot: DeliverySnapshot = self.fetch("delivery").await?;
        snapshot.timestamp = Utc::now();
        Ok(snapshot)
    }
}

#[async_trait]
impl ConnectionStatsProvider for RemoteStatsProvider {
    async fn connection_stats(&self) -> Result<ConnectionSnapshot> {
        let mut snapshot: ConnectionSnapshot = self.fetch("connections").await?;
        snapshot.timestamp = Utc::now();
        Ok(snapshot)
    }
}

#[async_trait]
impl PerformanceStatsProvider for RemoteStatsProvider {
    async fn performance_stats(&self) -> Result<PerformanceSnapshot> {
        let mut snapshot: PerformanceSnapshot = self.fetch("performance").await?;
        snapshot.timestamp = Utc::now();
        Ok(snapshot)
    }
}

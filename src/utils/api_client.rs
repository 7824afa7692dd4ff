use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config;
use crate::metrics::{
    MetricData, MetricDataSource, MetricDefinition, MetricDefinitionSource, MetricsQueryRequest,
};

/// HTTP client for the metrics API v2
///
/// Implements both metric lookups used by the query pipeline.
#[derive(Debug, Clone)]
pub struct MetricsApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl MetricsApiClient {
    pub fn new(base_url: impl Into<String>, api_token: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        // Validate the base URL up front instead of on the first request
        config::metrics_query_url(&base_url)?;

        let mut headers = HeaderMap::new();
        if !api_token.is_empty() {
            let authorization = format!("{} {}", config::API_TOKEN_SCHEME, api_token);
            let value = HeaderValue::from_str(&authorization)
                .map_err(|e| anyhow::anyhow!("invalid API token: {}", e))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))?;

        debug!(
            base_url = %base_url,
            timeout_ms = timeout.as_millis(),
            "Metrics API client initialized"
        );
        Ok(MetricsApiClient { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a URL and decode the JSON body, failing on non-success status
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!(url = %url, "Sending metrics API request");
        let response = self.client.get(url.clone()).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "unexpected status from {}: {} {}",
                url,
                status,
                body.trim()
            ));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MetricDefinitionSource for MetricsApiClient {
    async fn get_metric_definition_by_id(&self, metric_selector: &str) -> Result<MetricDefinition> {
        let url = config::metric_definition_url(&self.base_url, metric_selector)?;
        self.get_json(url, &[]).await
    }
}

#[async_trait]
impl MetricDataSource for MetricsApiClient {
    async fn get_metric_data_by_query(&self, request: &MetricsQueryRequest) -> Result<MetricData> {
        let url = config::metrics_query_url(&self.base_url)?;
        let data: MetricData = self.get_json(url, &request.query_params()).await?;
        debug!(
            collection_count = data.result.len(),
            total_count = ?data.total_count,
            "Metrics query response received"
        );
        Ok(data)
    }
}

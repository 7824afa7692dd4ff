//! Application context and dependency injection
//!
//! Holds the metrics API client and builds the processing chain for a run.
//! The client is created once and shared through `Arc` by both lookups.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::{
    MetricDataSource, MetricDefinitionSource, MetricsProcessing, MetricsProcessor,
    MetricsQueryRequest, ModifiedQueryMetricsProcessing, ProcessingResultSet,
};
use crate::utils::api_client::MetricsApiClient;

/// How queries are rewritten before they are executed
#[derive(Debug, Clone, Default)]
pub struct ProcessingOptions {
    /// Force a single value per series via `resolution=Inf` or `:fold`
    pub single_value: bool,
    /// Unit the values should be returned in ("", "auto" or "none" keep the native unit)
    pub target_unit_id: String,
}

/// Application context holding the shared metric lookups
#[derive(Clone)]
pub struct AppContext {
    /// Metric descriptor lookups
    definition_source: Arc<dyn MetricDefinitionSource>,

    /// Metrics query execution
    data_source: Arc<dyn MetricDataSource>,
}

impl AppContext {
    /// Create a context backed by the metrics API at `api_url`
    pub fn new(api_url: String, api_token: String, timeout_secs: u64) -> Result<Self> {
        tracing::info!("Initializing application context");

        if api_url.is_empty() {
            return Err(anyhow::anyhow!("metrics API URL missing"));
        }

        if timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "timeout_secs must be > 0, got {}",
                timeout_secs
            ));
        }

        let client = Arc::new(MetricsApiClient::new(
            api_url,
            &api_token,
            Duration::from_secs(timeout_secs),
        )?);
        tracing::info!(base_url = %client.base_url(), "Metrics API client initialized");

        Ok(AppContext::with_sources(client.clone(), client))
    }

    /// Create a context from already constructed lookups
    pub fn with_sources(
        definition_source: Arc<dyn MetricDefinitionSource>,
        data_source: Arc<dyn MetricDataSource>,
    ) -> Self {
        AppContext {
            definition_source,
            data_source,
        }
    }

    /// Build the processor for one request
    ///
    /// Without rewrites the plain processor is returned; otherwise it is
    /// wrapped so the query is modified before execution.
    pub fn metrics_processor(&self, options: &ProcessingOptions) -> Arc<dyn MetricsProcessor> {
        let processing: Arc<dyn MetricsProcessor> =
            Arc::new(MetricsProcessing::new(self.data_source.clone()));

        if !options.single_value && options.target_unit_id.is_empty() {
            return processing;
        }

        Arc::new(ModifiedQueryMetricsProcessing::new(
            processing,
            self.definition_source.clone(),
            options.single_value,
            options.target_unit_id.clone(),
        ))
    }

    /// Get reference to the metric definition lookup
    pub fn definition_source(&self) -> &Arc<dyn MetricDefinitionSource> {
        &self.definition_source
    }

    /// Get reference to the metrics query lookup
    pub fn data_source(&self) -> &Arc<dyn MetricDataSource> {
        &self.data_source
    }
}

/// Process `request`, giving up once `deadline` has passed
///
/// On expiry the processing future is dropped, which aborts any in-flight
/// lookup; no partial results are returned.
pub async fn process_with_deadline(
    processor: &dyn MetricsProcessor,
    request: &MetricsQueryRequest,
    deadline: Duration,
) -> Result<ProcessingResultSet> {
    let result_set = tokio::time::timeout(deadline, processor.process_request(request))
        .await
        .map_err(|_| anyhow::anyhow!("metrics query timed out after {:?}", deadline))??;
    Ok(result_set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricData, MetricSeries, MetricSeriesCollection, Query, Timeframe};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    /// Data source answering with one value after a fixed delay
    struct SlowDataSource {
        delay: Duration,
    }

    #[async_trait]
    impl MetricDataSource for SlowDataSource {
        async fn get_metric_data_by_query(
            &self,
            _request: &MetricsQueryRequest,
        ) -> Result<MetricData> {
            tokio::time::sleep(self.delay).await;
            Ok(MetricData {
                result: vec![MetricSeriesCollection {
                    metric_id: "builtin:host.cpu.usage".to_string(),
                    data: vec![MetricSeries {
                        values: vec![Some(1.0)],
                        ..Default::default()
                    }],
                    warnings: vec![],
                }],
                ..Default::default()
            })
        }
    }

    fn request() -> MetricsQueryRequest {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        MetricsQueryRequest::new(
            Query::new("builtin:host.cpu.usage", "", "", "").unwrap(),
            Timeframe::new(from, to).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_process_with_deadline_times_out() {
        let processing = MetricsProcessing::new(Arc::new(SlowDataSource {
            delay: Duration::from_secs(10),
        }));

        let started = std::time::Instant::now();
        let result =
            process_with_deadline(&processing, &request(), Duration::from_millis(50)).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_process_with_deadline_returns_results_in_time() {
        let processing = MetricsProcessing::new(Arc::new(SlowDataSource {
            delay: Duration::from_millis(1),
        }));

        let result_set = process_with_deadline(&processing, &request(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result_set.results.len(), 1);
        assert_eq!(result_set.results[0].value, 1.0);
    }

    #[test]
    fn test_app_context_creation() {
        let context = AppContext::new(
            "https://abc123.live.example.com".to_string(),
            "token".to_string(),
            30,
        );
        assert!(context.is_ok());
    }

    #[test]
    fn test_app_context_clone_shares_sources() {
        let context = AppContext::new(
            "https://abc123.live.example.com".to_string(),
            "token".to_string(),
            30,
        )
        .unwrap();
        let cloned = context.clone();

        assert!(Arc::ptr_eq(context.data_source(), cloned.data_source()));
        assert!(Arc::ptr_eq(
            context.definition_source(),
            cloned.definition_source()
        ));
    }

    #[test]
    fn test_app_context_empty_url() {
        let context = AppContext::new(String::new(), "token".to_string(), 30);
        assert!(context.is_err());
    }

    #[test]
    fn test_app_context_zero_timeout() {
        let context = AppContext::new("https://example.com".to_string(), String::new(), 0);
        assert!(context.is_err(), "Should reject zero timeout_secs");
    }
}

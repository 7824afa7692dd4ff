//! Metrics query pipeline: query rewriting and result normalization
//!
//! The pipeline turns a metric selector into exactly one scalar value per series.
//!
//! ## Flow
//!
//! 1. **Query** - caller-supplied selector, entity selector, resolution and management zone
//! 2. **QueryModifier** - forces a single value per series (`resolution=Inf` or `:fold`)
//!    and converts to a target unit, using metadata from a [`MetricDefinitionSource`]
//! 3. **MetricDataSource** - executes the rewritten query (external collaborator)
//! 4. **MetricsProcessing** - validates the result shape and names each value
//!    from its dimensions
//!
//! Both collaborators are narrow traits; no HTTP or serialization details
//! leak into this module.

pub mod definition;
pub mod error;
pub mod modifier;
pub mod processing;
pub mod query;
pub mod unit_conversion;

pub use definition::{AggregationKind, MetricDefinition};
pub use error::MetricsError;
pub use modifier::{apply_fold_or_resolution_inf, apply_unit_conversion, QueryModifier};
pub use processing::{
    generate_result_name, MetricsProcessing, MetricsProcessor, ModifiedQueryMetricsProcessing,
    ProcessingResult, ProcessingResultSet,
};
pub use query::{MetricsQueryRequest, Query, Timeframe};
pub use unit_conversion::UnitConversion;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Looks up metadata for the metric named by a selector
#[async_trait]
pub trait MetricDefinitionSource: Send + Sync {
    async fn get_metric_definition_by_id(&self, metric_selector: &str)
        -> Result<MetricDefinition>;
}

/// Executes a metrics query
#[async_trait]
pub trait MetricDataSource: Send + Sync {
    async fn get_metric_data_by_query(&self, request: &MetricsQueryRequest) -> Result<MetricData>;
}

/// Raw metrics query response
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricData {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub next_page_key: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    /// One collection per metric selector in the query
    #[serde(default)]
    pub result: Vec<MetricSeriesCollection>,
}

/// All series returned for one metric selector
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeriesCollection {
    pub metric_id: String,
    /// One series per distinct dimension combination
    #[serde(default)]
    pub data: Vec<MetricSeries>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    #[serde(default)]
    pub dimension_map: HashMap<String, String>,
    #[serde(default)]
    pub timestamps: Vec<i64>,
    /// `None` where the backend reported `null`
    #[serde(default)]
    pub values: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_metric_data() {
        let json = r#"{
            "totalCount": 1,
            "nextPageKey": null,
            "resolution": "Inf",
            "result": [
                {
                    "metricId": "builtin:host.cpu.usage",
                    "dataPointCountRatio": 0.0001,
                    "dimensionCountRatio": 0.001,
                    "data": [
                        {
                            "dimensions": ["HOST-1"],
                            "dimensionMap": {"dt.entity.host": "HOST-1", "dt.entity.host.name": "host-A"},
                            "timestamps": [1704070800000],
                            "values": [42.5]
                        },
                        {
                            "dimensions": ["HOST-2"],
                            "dimensionMap": {"dt.entity.host": "HOST-2"},
                            "timestamps": [1704070800000],
                            "values": [null]
                        }
                    ],
                    "warnings": ["The dimension key 'x' has been referenced, but it does not exist."]
                }
            ]
        }"#;

        let data: MetricData = serde_json::from_str(json).unwrap();
        assert_eq!(data.total_count, Some(1));
        assert_eq!(data.resolution.as_deref(), Some("Inf"));
        assert_eq!(data.result.len(), 1);

        let collection = &data.result[0];
        assert_eq!(collection.metric_id, "builtin:host.cpu.usage");
        assert_eq!(collection.warnings.len(), 1);
        assert_eq!(collection.data[0].values, vec![Some(42.5)]);
        assert_eq!(collection.data[1].values, vec![None]);
        assert_eq!(
            collection.data[0].dimension_map.get("dt.entity.host.name").unwrap(),
            "host-A"
        );
    }

    #[test]
    fn test_deserialize_empty_collection_defaults() {
        let data: MetricData = serde_json::from_str(r#"{"result": [{"metricId": "m"}]}"#).unwrap();
        assert!(data.result[0].data.is_empty());
        assert!(data.result[0].warnings.is_empty());
    }
}

//! Metric metadata and its lazy, instance-local lookup

use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use super::error::{MetricsError, Result};
use super::MetricDefinitionSource;

/// Transformation name advertising native `:toUnit` support
pub const TO_UNIT_TRANSFORMATION: &str = "toUnit";

/// Default aggregation type declared by a metric
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Auto,
    Avg,
    Count,
    Max,
    Median,
    Min,
    Percentile,
    Sum,
    /// Single value per timeslot; cannot be folded
    Value,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Deserialize)]
struct DefaultAggregation {
    #[serde(rename = "type")]
    kind: AggregationKind,
}

/// Metadata of a metric as returned by the metric descriptor endpoint
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    #[serde(default)]
    pub metric_id: String,
    pub unit: String,
    #[serde(default)]
    pub transformations: HashSet<String>,
    #[serde(deserialize_with = "deserialize_aggregation")]
    pub default_aggregation: AggregationKind,
    #[serde(default)]
    pub resolution_inf_supported: bool,
}

fn deserialize_aggregation<'de, D>(
    deserializer: D,
) -> std::result::Result<AggregationKind, D::Error>
where
    D: serde::Deserializer<'de>,
{
    DefaultAggregation::deserialize(deserializer).map(|aggregation| aggregation.kind)
}

impl MetricDefinition {
    pub fn supports_transformation(&self, transformation: &str) -> bool {
        self.transformations.contains(transformation)
    }
}

/// Fetches the definition for one selector at most once
///
/// Owned by a single query modifier; never shared between requests.
pub struct MetricDefinitionProvider<'a> {
    source: &'a dyn MetricDefinitionSource,
    metric_selector: String,
    definition: Option<MetricDefinition>,
}

impl<'a> MetricDefinitionProvider<'a> {
    pub fn new(source: &'a dyn MetricDefinitionSource, metric_selector: impl Into<String>) -> Self {
        MetricDefinitionProvider {
            source,
            metric_selector: metric_selector.into(),
            definition: None,
        }
    }

    /// Definition for the selector, fetched on first access
    pub async fn get(&mut self) -> Result<&MetricDefinition> {
        let definition = match self.definition.take() {
            Some(definition) => definition,
            None => {
                debug!(metric_selector = %self.metric_selector, "Fetching metric definition");
                let definition = self
                    .source
                    .get_metric_definition_by_id(&self.metric_selector)
                    .await
                    .map_err(|e| {
                        MetricsError::definition_lookup_failed(&self.metric_selector, e)
                    })?;
                debug!(
                    metric_selector = %self.metric_selector,
                    unit = %definition.unit,
                    default_aggregation = ?definition.default_aggregation,
                    resolution_inf_supported = definition.resolution_inf_supported,
                    "Metric definition fetched"
                );
                definition
            }
        };

        Ok(&*self.definition.insert(definition))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Definition source returning a fixed definition and counting lookups
    pub(crate) struct StaticDefinitionSource {
        pub definition: Option<MetricDefinition>,
        pub calls: AtomicUsize,
    }

    impl StaticDefinitionSource {
        pub fn new(definition: MetricDefinition) -> Self {
            StaticDefinitionSource {
                definition: Some(definition),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            StaticDefinitionSource {
                definition: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetricDefinitionSource for StaticDefinitionSource {
        async fn get_metric_definition_by_id(
            &self,
            _metric_selector: &str,
        ) -> anyhow::Result<MetricDefinition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.definition
                .clone()
                .ok_or_else(|| anyhow::anyhow!("metric not found"))
        }
    }

    pub(crate) fn definition(
        unit: &str,
        transformations: &[&str],
        default_aggregation: AggregationKind,
        resolution_inf_supported: bool,
    ) -> MetricDefinition {
        MetricDefinition {
            metric_id: "builtin:test.metric".to_string(),
            unit: unit.to_string(),
            transformations: transformations.iter().map(|t| t.to_string()).collect(),
            default_aggregation,
            resolution_inf_supported,
        }
    }

    #[test]
    fn test_deserialize_metric_definition() {
        let json = r#"{
            "metricId": "builtin:service.response.time",
            "displayName": "Response time",
            "unit": "MicroSecond",
            "aggregationTypes": ["auto", "value", "count", "avg"],
            "transformations": ["filter", "fold", "toUnit", "limit"],
            "defaultAggregation": {"type": "avg"},
            "resolutionInfSupported": true
        }"#;

        let definition: MetricDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(definition.metric_id, "builtin:service.response.time");
        assert_eq!(definition.unit, "MicroSecond");
        assert_eq!(definition.default_aggregation, AggregationKind::Avg);
        assert!(definition.resolution_inf_supported);
        assert!(definition.supports_transformation(TO_UNIT_TRANSFORMATION));
        assert!(!definition.supports_transformation("rate"));
    }

    #[test]
    fn test_deserialize_unknown_aggregation() {
        let json = r#"{"unit": "Count", "defaultAggregation": {"type": "something-new"}}"#;
        let definition: MetricDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(definition.default_aggregation, AggregationKind::Other);
        assert!(!definition.resolution_inf_supported);
        assert!(definition.transformations.is_empty());
    }

    #[tokio::test]
    async fn test_provider_fetches_once() {
        let source = StaticDefinitionSource::new(definition(
            "Percent",
            &[],
            AggregationKind::Avg,
            true,
        ));
        let mut provider = MetricDefinitionProvider::new(&source, "builtin:host.cpu.usage");

        assert_eq!(provider.get().await.unwrap().unit, "Percent");
        assert_eq!(provider.get().await.unwrap().unit, "Percent");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_propagates_lookup_error() {
        let source = StaticDefinitionSource::failing();
        let mut provider = MetricDefinitionProvider::new(&source, "builtin:missing");

        let err = provider.get().await.unwrap_err();
        assert!(matches!(
            err,
            MetricsError::DefinitionLookupFailed { ref metric_selector, .. }
                if metric_selector == "builtin:missing"
        ));
    }
}

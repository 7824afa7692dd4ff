//! Metrics result processing
//!
//! Validates that a query result holds exactly one value per series and turns
//! each series into a named scalar result.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{MetricsError, Result};
use super::modifier::QueryModifier;
use super::query::MetricsQueryRequest;
use super::{MetricData, MetricDataSource, MetricDefinitionSource};

/// Suffix marking a dimension that holds the display name of an entity
const DIMENSION_NAME_SUFFIX: &str = ".name";

/// A single named value
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub name: String,
    pub value: f64,
}

/// Named values of one query plus the warnings the backend returned with them
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProcessingResultSet {
    pub results: Vec<ProcessingResult>,
    pub warnings: Vec<String>,
}

/// Runs a metrics request and reduces its result to named values
#[async_trait]
pub trait MetricsProcessor: Send + Sync {
    async fn process_request(&self, request: &MetricsQueryRequest) -> Result<ProcessingResultSet>;
}

/// Fetches metric data and processes it as-is
pub struct MetricsProcessing {
    data_source: Arc<dyn MetricDataSource>,
}

impl MetricsProcessing {
    pub fn new(data_source: Arc<dyn MetricDataSource>) -> Self {
        MetricsProcessing { data_source }
    }

    /// Validate a raw result and turn it into named values
    pub fn process_result(result: &MetricData) -> Result<ProcessingResultSet> {
        let collection = match result.result.as_slice() {
            [] => {
                return Err(MetricsError::processing(
                    "zero metric series collections",
                    &[],
                ))
            }
            [collection] => collection,
            collections => {
                return Err(MetricsError::processing(
                    format!("{} metric series collections", collections.len()),
                    &[],
                ))
            }
        };

        let warnings = &collection.warnings;
        if collection.data.is_empty() {
            return Err(MetricsError::processing("zero metric series", warnings));
        }

        let results = collection
            .data
            .iter()
            .map(|series| {
                let value = match series.values.as_slice() {
                    [] => return Err(MetricsError::processing("zero values", warnings)),
                    [Some(value)] => *value,
                    [None] => return Err(MetricsError::processing("'null' as value", warnings)),
                    values => {
                        return Err(MetricsError::ReturnedMultipleValues {
                            count: values.len(),
                            warnings: warnings.clone(),
                        })
                    }
                };

                Ok(ProcessingResult {
                    name: generate_result_name(&series.dimension_map),
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for warning in warnings {
            warn!(
                metric_id = %collection.metric_id,
                warning = %warning,
                "Metrics query returned a warning"
            );
        }

        Ok(ProcessingResultSet {
            results,
            warnings: warnings.clone(),
        })
    }
}

#[async_trait]
impl MetricsProcessor for MetricsProcessing {
    async fn process_request(&self, request: &MetricsQueryRequest) -> Result<ProcessingResultSet> {
        debug!(query = %request.query(), "Executing metrics query");
        let result = self
            .data_source
            .get_metric_data_by_query(request)
            .await
            .map_err(MetricsError::query_failed)?;

        let result_set = Self::process_result(&result)?;
        debug!(
            result_count = result_set.results.len(),
            warning_count = result_set.warnings.len(),
            "Metrics query processed"
        );
        Ok(result_set)
    }
}

/// Rewrites the request's query before handing it to another processor
///
/// Both rewrites share one query modifier, so the metric definition is
/// fetched at most once per request.
pub struct ModifiedQueryMetricsProcessing {
    inner: Arc<dyn MetricsProcessor>,
    definition_source: Arc<dyn MetricDefinitionSource>,
    single_value: bool,
    target_unit_id: String,
}

impl ModifiedQueryMetricsProcessing {
    pub fn new(
        inner: Arc<dyn MetricsProcessor>,
        definition_source: Arc<dyn MetricDefinitionSource>,
        single_value: bool,
        target_unit_id: impl Into<String>,
    ) -> Self {
        ModifiedQueryMetricsProcessing {
            inner,
            definition_source,
            single_value,
            target_unit_id: target_unit_id.into(),
        }
    }
}

#[async_trait]
impl MetricsProcessor for ModifiedQueryMetricsProcessing {
    async fn process_request(&self, request: &MetricsQueryRequest) -> Result<ProcessingResultSet> {
        let mut modifier =
            QueryModifier::new(self.definition_source.as_ref(), request.query().clone());
        if self.single_value {
            modifier.apply_fold_or_resolution_inf().await?;
        }
        let query = modifier.apply_unit_conversion(&self.target_unit_id).await?;

        debug!(original = %request.query(), modified = %query, "Metrics query modified");
        self.inner.process_request(&request.with_query(query)).await
    }
}

/// Derive a display name from a series' dimensions
///
/// `<key>.name` dimensions replace the raw `<key>` value. Empty values are
/// ignored. Values are joined with spaces, ordered by base key.
pub fn generate_result_name(dimension_map: &HashMap<String, String>) -> String {
    let mut names: BTreeMap<&str, &str> = BTreeMap::new();

    // Raw values first, so name dimensions overwrite them regardless of map order
    for (key, value) in dimension_map {
        if !value.is_empty() && !key.ends_with(DIMENSION_NAME_SUFFIX) {
            names.insert(key, value);
        }
    }
    for (key, value) in dimension_map {
        if value.is_empty() {
            continue;
        }
        if let Some(base_key) = key.strip_suffix(DIMENSION_NAME_SUFFIX) {
            names.insert(base_key, value);
        }
    }

    names.into_values().collect::<Vec<_>>().join(" ")
}

//! Query rewriting so the backend returns one value per series, in a given unit
//!
//! The modifier never edits a selector string in place. It records which
//! rewrites are pending and rebuilds the selector from the original on every
//! call to [`QueryModifier::query`], so repeated calls cannot double-wrap.

use tracing::debug;

use super::definition::{AggregationKind, MetricDefinitionProvider, TO_UNIT_TRANSFORMATION};
use super::error::{MetricsError, Result};
use super::query::Query;
use super::unit_conversion::{is_no_conversion, UnitConversion};
use super::MetricDefinitionSource;
use crate::config::RESOLUTION_INF;

pub struct QueryModifier<'a> {
    query: Query,
    definitions: MetricDefinitionProvider<'a>,
    apply_fold: bool,
    set_resolution_inf: bool,
    unit_conversion: Option<UnitConversion>,
}

impl<'a> QueryModifier<'a> {
    pub fn new(source: &'a dyn MetricDefinitionSource, query: Query) -> Self {
        let definitions = MetricDefinitionProvider::new(source, query.metric_selector());
        QueryModifier {
            query,
            definitions,
            apply_fold: false,
            set_resolution_inf: false,
            unit_conversion: None,
        }
    }

    /// Make the query return a single value per series
    ///
    /// Prefers `resolution=Inf` when the query has no resolution and the metric
    /// supports it; otherwise wraps the selector in `:fold`.
    pub async fn apply_fold_or_resolution_inf(&mut self) -> Result<Query> {
        if self.apply_fold || self.set_resolution_inf {
            return Ok(self.query());
        }

        let definition = self.definitions.get().await?;

        if self.query.resolution().is_empty() && definition.resolution_inf_supported {
            debug!(metric_selector = %self.query.metric_selector(), "Setting resolution to Inf");
            self.set_resolution_inf = true;
            return Ok(self.query());
        }

        if definition.default_aggregation == AggregationKind::Value {
            return Err(MetricsError::UnableToApplyFoldToValueDefaultAggregation);
        }

        debug!(metric_selector = %self.query.metric_selector(), "Applying fold");
        self.apply_fold = true;
        Ok(self.query())
    }

    /// Make the query return values in `target_unit_id`
    pub async fn apply_unit_conversion(&mut self, target_unit_id: &str) -> Result<Query> {
        if is_no_conversion(target_unit_id) {
            return Ok(self.query());
        }

        let definition = self.definitions.get().await?;
        if definition.unit == target_unit_id {
            debug!(unit = %target_unit_id, "Metric already in target unit");
            return Ok(self.query());
        }

        let conversion = UnitConversion::resolve(
            &definition.unit,
            target_unit_id,
            definition.supports_transformation(TO_UNIT_TRANSFORMATION),
        )?;
        debug!(
            metric_selector = %self.query.metric_selector(),
            conversion = %conversion,
            "Applying unit conversion"
        );
        self.unit_conversion = Some(conversion);
        Ok(self.query())
    }

    /// The original query with all pending rewrites applied
    pub fn query(&self) -> Query {
        let mut selector = self.query.metric_selector().to_string();
        if self.apply_fold {
            selector = format!("({}):fold", selector);
        }
        if let Some(conversion) = &self.unit_conversion {
            selector = format!("({}){}", selector, conversion);
        }

        let query = self.query.with_metric_selector(selector);
        if self.set_resolution_inf {
            query.with_resolution(RESOLUTION_INF)
        } else {
            query
        }
    }
}

/// One-shot fold-or-resolution-Inf rewrite of `query`
pub async fn apply_fold_or_resolution_inf(
    source: &dyn MetricDefinitionSource,
    query: Query,
) -> Result<Query> {
    QueryModifier::new(source, query)
        .apply_fold_or_resolution_inf()
        .await
}

/// One-shot unit conversion rewrite of `query`
pub async fn apply_unit_conversion(
    source: &dyn MetricDefinitionSource,
    query: Query,
    target_unit_id: &str,
) -> Result<Query> {
    QueryModifier::new(source, query)
        .apply_unit_conversion(target_unit_id)
        .await
}

//! Metrics query values and the request sent to the metrics query API

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::error::{MetricsError, Result};

const METRIC_SELECTOR_KEY: &str = "metricSelector";
const ENTITY_SELECTOR_KEY: &str = "entitySelector";
const RESOLUTION_KEY: &str = "resolution";
const MZ_SELECTOR_KEY: &str = "mzSelector";

/// Immutable descriptor of a metrics query
///
/// Rewrites never mutate a `Query`; they build a new one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    metric_selector: String,
    entity_selector: String,
    resolution: String,
    mz_selector: String,
}

impl Query {
    /// Create a query, rejecting an empty metric selector
    pub fn new(
        metric_selector: impl Into<String>,
        entity_selector: impl Into<String>,
        resolution: impl Into<String>,
        mz_selector: impl Into<String>,
    ) -> Result<Self> {
        let metric_selector = metric_selector.into();
        if metric_selector.trim().is_empty() {
            return Err(MetricsError::InvalidQuery(
                "metric selector must not be empty".to_string(),
            ));
        }

        Ok(Query {
            metric_selector,
            entity_selector: entity_selector.into(),
            resolution: resolution.into(),
            mz_selector: mz_selector.into(),
        })
    }

    /// Parse a query string such as
    /// `metricSelector=builtin:host.cpu.usage&entitySelector=type(HOST)&resolution=Inf`
    pub fn from_query_string(query_string: &str) -> Result<Self> {
        let mut metric_selector = None;
        let mut entity_selector = None;
        let mut resolution = None;
        let mut mz_selector = None;

        for pair in query_string.split('&').filter(|pair| !pair.trim().is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                MetricsError::InvalidQuery(format!("could not parse '{}' as key=value", pair))
            })?;

            let slot = match key.trim() {
                METRIC_SELECTOR_KEY => &mut metric_selector,
                ENTITY_SELECTOR_KEY => &mut entity_selector,
                RESOLUTION_KEY => &mut resolution,
                MZ_SELECTOR_KEY => &mut mz_selector,
                other => {
                    return Err(MetricsError::InvalidQuery(format!(
                        "unknown key '{}'",
                        other
                    )))
                }
            };

            if slot.is_some() {
                return Err(MetricsError::InvalidQuery(format!(
                    "duplicate key '{}'",
                    key.trim()
                )));
            }
            *slot = Some(value.trim().to_string());
        }

        let metric_selector = metric_selector.ok_or_else(|| {
            MetricsError::InvalidQuery(format!("missing '{}'", METRIC_SELECTOR_KEY))
        })?;

        Query::new(
            metric_selector,
            entity_selector.unwrap_or_default(),
            resolution.unwrap_or_default(),
            mz_selector.unwrap_or_default(),
        )
    }

    pub fn metric_selector(&self) -> &str {
        &self.metric_selector
    }

    pub fn entity_selector(&self) -> &str {
        &self.entity_selector
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    pub fn mz_selector(&self) -> &str {
        &self.mz_selector
    }

    /// Copy of this query with a different metric selector
    pub fn with_metric_selector(&self, metric_selector: impl Into<String>) -> Self {
        Query {
            metric_selector: metric_selector.into(),
            ..self.clone()
        }
    }

    /// Copy of this query with a different resolution
    pub fn with_resolution(&self, resolution: impl Into<String>) -> Self {
        Query {
            resolution: resolution.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", METRIC_SELECTOR_KEY, self.metric_selector)?;
        for (key, value) in [
            (ENTITY_SELECTOR_KEY, &self.entity_selector),
            (RESOLUTION_KEY, &self.resolution),
            (MZ_SELECTOR_KEY, &self.mz_selector),
        ] {
            if !value.is_empty() {
                write!(f, "&{}={}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Time range a query is evaluated over
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeframe {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl Timeframe {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> anyhow::Result<Self> {
        if from >= to {
            return Err(anyhow::anyhow!(
                "timeframe start {} must be before end {}",
                from,
                to
            ));
        }
        Ok(Timeframe { from, to })
    }

    /// Timeframe ending now and spanning the given duration
    pub fn last(duration: chrono::Duration) -> anyhow::Result<Self> {
        let to = Utc::now();
        let from = to
            .checked_sub_signed(duration)
            .ok_or_else(|| anyhow::anyhow!("timeframe of {} is out of range", duration))?;
        Timeframe::new(from, to)
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }
}

/// A query plus the timeframe it is executed for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsQueryRequest {
    query: Query,
    timeframe: Timeframe,
}

impl MetricsQueryRequest {
    pub fn new(query: Query, timeframe: Timeframe) -> Self {
        MetricsQueryRequest { query, timeframe }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    /// Same timeframe, different query
    pub fn with_query(&self, query: Query) -> Self {
        MetricsQueryRequest {
            query,
            timeframe: self.timeframe,
        }
    }

    /// API query parameters; empty optional fields are omitted
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![(METRIC_SELECTOR_KEY, self.query.metric_selector.clone())];
        for (key, value) in [
            (ENTITY_SELECTOR_KEY, &self.query.entity_selector),
            (RESOLUTION_KEY, &self.query.resolution),
            (MZ_SELECTOR_KEY, &self.query.mz_selector),
        ] {
            if !value.is_empty() {
                params.push((key, value.clone()));
            }
        }
        let timeframe = self.timeframe();
        params.push(("from", timeframe.from().timestamp_millis().to_string()));
        params.push(("to", timeframe.to().timestamp_millis().to_string()));
        params
    }
}

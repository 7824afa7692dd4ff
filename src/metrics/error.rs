//! Error kinds raised while rewriting metric queries and processing their results

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetricsError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum MetricsError {
    /// The data fetch itself failed (network or backend error)
    #[error("error querying metrics: {source}")]
    QueryFailed {
        #[source]
        source: BoxError,
    },

    /// The metric definition lookup for a selector failed
    #[error("error fetching metric definition for '{metric_selector}': {source}")]
    DefinitionLookupFailed {
        metric_selector: String,
        #[source]
        source: BoxError,
    },

    /// The response was valid but its shape cannot be turned into single values
    #[error("error processing metrics query: {message}{}", format_warnings(.warnings))]
    Processing {
        message: String,
        warnings: Vec<String>,
    },

    /// A series carried more than one value; the query needs fold or resolution=Inf
    #[error("metrics query returned {count} values{}", format_warnings(.warnings))]
    ReturnedMultipleValues { count: usize, warnings: Vec<String> },

    #[error("unknown unit conversion: {unit_id}")]
    UnknownUnitConversion { unit_id: String },

    #[error("unable to apply ':fold' to a metric with default aggregation 'value'")]
    UnableToApplyFoldToValueDefaultAggregation,

    #[error("invalid metrics query: {0}")]
    InvalidQuery(String),
}

impl MetricsError {
    pub(crate) fn query_failed(source: anyhow::Error) -> Self {
        MetricsError::QueryFailed {
            source: source.into(),
        }
    }

    pub(crate) fn definition_lookup_failed(
        metric_selector: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        MetricsError::DefinitionLookupFailed {
            metric_selector: metric_selector.into(),
            source: source.into(),
        }
    }

    pub(crate) fn processing(message: impl Into<String>, warnings: &[String]) -> Self {
        MetricsError::Processing {
            message: message.into(),
            warnings: warnings.to_vec(),
        }
    }

    /// Warnings returned by the backend alongside the failed result, if any
    pub fn warnings(&self) -> &[String] {
        match self {
            MetricsError::Processing { warnings, .. }
            | MetricsError::ReturnedMultipleValues { warnings, .. } => warnings,
            _ => &[],
        }
    }
}

fn format_warnings(warnings: &[String]) -> String {
    if warnings.is_empty() {
        String::new()
    } else {
        format!(" (warnings: {})", warnings.join(", "))
    }
}

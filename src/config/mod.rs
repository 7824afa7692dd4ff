use std::time::Duration;

// Metrics API v2 endpoint paths
pub const METRICS_QUERY_PATH: &str = "/api/v2/metrics/query";
pub const METRICS_PATH: &str = "/api/v2/metrics";

// Resolution that collapses the whole timeframe into one data point
pub const RESOLUTION_INF: &str = "Inf";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Authorization header scheme for API tokens
pub const API_TOKEN_SCHEME: &str = "Api-Token";

// Get the metrics query URL for the given API base URL
pub fn metrics_query_url(base_url: &str) -> anyhow::Result<reqwest::Url> {
    api_url(base_url, METRICS_QUERY_PATH)
}

// Get the metric descriptor URL for a metric selector
// The selector is a single path segment and gets percent-encoded
pub fn metric_definition_url(
    base_url: &str,
    metric_selector: &str,
) -> anyhow::Result<reqwest::Url> {
    let mut url = api_url(base_url, METRICS_PATH)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("API base URL cannot be a base: {}", base_url))?
        .push(metric_selector);
    Ok(url)
}

fn api_url(base_url: &str, path: &str) -> anyhow::Result<reqwest::Url> {
    let base = base_url.trim_end_matches('/');
    if base.is_empty() {
        return Err(anyhow::anyhow!("API base URL missing"));
    }

    reqwest::Url::parse(&format!("{}{}", base, path))
        .map_err(|e| anyhow::anyhow!("invalid API base URL {}: {}", base_url, e))
}

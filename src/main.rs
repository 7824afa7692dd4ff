use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sli_query::context::{process_with_deadline, AppContext, ProcessingOptions};
use sli_query::metrics::{MetricsQueryRequest, Query, Timeframe};

const APP_NAME: &str = "sli-query";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TIMEFRAME_MINS: i64 = 60;

#[derive(Parser, Debug)]
#[command(
    name = APP_NAME,
    version = VERSION,
    about = "Retrieve single metric values for SLI evaluation",
    long_about = "sli-query: rewrites a metric selector so the metrics API returns one value per series, optionally in a target unit, and prints the named results as JSON"
)]
struct Args {
    /// Base URL of the metrics API environment
    #[arg(long, env = "METRICS_API_URL", help = "Base URL of the metrics API environment")]
    api_url: String,

    /// API token sent with every request
    #[arg(
        long,
        env = "METRICS_API_TOKEN",
        default_value = "",
        hide_env_values = true,
        help = "API token sent with every request"
    )]
    api_token: String,

    /// Metrics query
    #[arg(
        long,
        help = "Metrics query, e.g. metricSelector=builtin:host.cpu.usage&entitySelector=type(HOST)"
    )]
    query: String,

    /// Target unit
    #[arg(
        long,
        default_value = "",
        help = "Unit to convert values to (empty, auto or none keep the native unit)"
    )]
    unit: String,

    /// Force a single value per series
    #[arg(long, help = "Force a single value per series via resolution=Inf or :fold")]
    single_value: bool,

    /// Timeframe length in minutes, ending now
    #[arg(
        long,
        default_value_t = DEFAULT_TIMEFRAME_MINS,
        help = "Timeframe length in minutes, ending now"
    )]
    timeframe_mins: i64,

    /// Request timeout in seconds
    #[arg(
        long,
        env = "METRICS_API_TIMEOUT",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        help = "Timeout in seconds for each API request and for the whole run"
    )]
    timeout_secs: u64,

    /// Log level
    #[arg(
        long,
        env = "RUST_LOG",
        default_value = DEFAULT_LOG_LEVEL,
        help = "Log level (trace/debug/info/warn/error)"
    )]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(
        app = APP_NAME,
        version = VERSION,
        api_url = %args.api_url,
        unit = %args.unit,
        single_value = args.single_value,
        timeframe_mins = args.timeframe_mins,
        "announcement"
    );

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "Metrics query failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let app_context = AppContext::new(args.api_url, args.api_token, args.timeout_secs)?;

    let query = Query::from_query_string(&args.query)?;
    let duration = chrono::Duration::try_minutes(args.timeframe_mins).ok_or_else(|| {
        anyhow::anyhow!("timeframe of {} minutes is out of range", args.timeframe_mins)
    })?;
    let timeframe = Timeframe::last(duration)?;
    let request = MetricsQueryRequest::new(query, timeframe);

    let options = ProcessingOptions {
        single_value: args.single_value,
        target_unit_id: args.unit,
    };
    let processor = app_context.metrics_processor(&options);

    let deadline = Duration::from_secs(args.timeout_secs);
    let result_set = process_with_deadline(processor.as_ref(), &request, deadline).await?;

    for warning in &result_set.warnings {
        eprintln!("Warning: {}", warning);
    }
    println!("{}", serde_json::to_string_pretty(&result_set)?);

    Ok(())
}

/// Initialize the logging system
fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = match log_level {
        "trace" => EnvFilter::new("trace"),
        "debug" => EnvFilter::new("debug"),
        "info" => EnvFilter::new("info"),
        "warn" => EnvFilter::new("warn"),
        "error" => EnvFilter::new("error"),
        _ => EnvFilter::new("info"),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}

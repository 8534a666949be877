//! Capture Probe - Issue HTTP Requests Through the Capture Layer
//!
//! Sends one request per URL through a [`CaptureInterceptor`] over the
//! reqwest transport, waits for every record to settle, and prints the
//! captured history.
//!
//! # Usage
//!
//! ```bash
//! # Fetch two URLs concurrently and print the table
//! capture-probe https://example.com https://example.org/missing
//!
//! # POST with a header and show bodies
//! capture-probe -X POST -H 'Content-Type: application/json' -d '{"a":1}' --bodies https://httpbin.org/post
//!
//! # Export the records as JSON
//! capture-probe --json https://example.com > records.json
//!
//! # With config file and verbose capture logging
//! RUST_LOG=capture_core=debug capture-probe --config ./capture.toml https://example.com
//! ```
//!
//! # Signals
//!
//! - `SIGINT`: abandon in-flight requests (recorded as cancelled) and print
//!   what was captured
//!
//! [`CaptureInterceptor`]: capture_core::CaptureInterceptor

mod report;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tracing::{error, info, warn};

use capture_core::config::{load_config, load_config_from_path, ConfigOverrides};
use capture_core::{CaptureService, HttpRequest, HttpTransport, ReqwestTransport};

use report::ReportOptions;

/// Capture Probe - send requests through the capture layer and print the records
#[derive(Parser, Debug)]
#[command(name = "capture-probe")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// URLs to request (issued concurrently)
    #[arg(required = true, value_name = "URL")]
    urls: Vec<String>,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long, value_name = "DATA")]
    data: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "NETCAPTURE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Records to retain (overrides config)
    #[arg(short = 'm', long, value_name = "N")]
    max_records: Option<usize>,

    /// Request timeout in seconds (overrides config)
    #[arg(short = 't', long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// User-Agent header (overrides config)
    #[arg(long, value_name = "AGENT")]
    user_agent: Option<String>,

    /// Send requests without recording them
    #[arg(long)]
    no_capture: bool,

    /// Print records as JSON
    #[arg(long)]
    json: bool,

    /// Print a curl command for each record
    #[arg(long)]
    curl: bool,

    /// Print request and response bodies
    #[arg(short = 'b', long)]
    bodies: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "NETCAPTURE_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("capture_probe={level},capture_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Split a `Name: value` header argument
fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Header {raw:?} is not in `Name: value` form"))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Header {raw:?} has an empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Collect the configuration overrides given on the command line
fn config_overrides(args: &Args) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    if args.no_capture {
        overrides = overrides.with_enabled(false);
    }
    if let Some(max) = args.max_records {
        overrides = overrides.with_max_records(max);
    }
    if let Some(secs) = args.timeout_secs {
        overrides = overrides.with_timeout_secs(secs);
    }
    if let Some(ref agent) = args.user_agent {
        overrides = overrides.with_user_agent(agent.clone());
    }
    overrides
}

/// Build one request per URL from the arguments
fn build_requests(args: &Args) -> Result<Vec<HttpRequest>> {
    let headers = args
        .headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<Result<Vec<_>>>()?;

    Ok(args
        .urls
        .iter()
        .map(|url| {
            let mut request = HttpRequest::new(args.method.to_uppercase(), url.clone());
            for (name, value) in &headers {
                request = request.with_header(name.clone(), value.clone());
            }
            if let Some(ref data) = args.data {
                request = request.with_body(data.clone());
            }
            request
        })
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    // Resolve configuration: CLI > env > file > defaults
    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;
    config_overrides(&args).apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        path = ?config.config_file_path,
        max_records = config.capture.max_records,
        "Configuration resolved"
    );

    let requests = build_requests(&args)?;

    let isolated = ReqwestTransport::new(&config.transport).context("Failed to build HTTP client")?;
    let service = CaptureService::with_settings(config.capture.clone());
    if !service.is_enabled() {
        warn!("Capture is disabled by configuration, requests will not be recorded");
    }
    let transport: Arc<dyn HttpTransport> = Arc::new(
        service
            .interceptor(isolated)
            .with_event_buffer(config.transport.event_buffer),
    );

    let exchanges = join_all(requests.into_iter().map(|request| {
        let transport = Arc::clone(&transport);
        async move {
            let url = request.url.clone();
            (url, transport.send(request.into()).await)
        }
    }));

    let mut failed = 0usize;
    tokio::select! {
        outcomes = exchanges => {
            for (url, outcome) in outcomes {
                match outcome {
                    Ok(response) => info!(
                        url = %url,
                        status = response.status,
                        bytes = response.body.len(),
                        "Request finished"
                    ),
                    Err(e) => {
                        failed += 1;
                        error!(url = %url, error = %e, "Request failed");
                    }
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning in-flight requests");
        }
    }

    if tokio::time::timeout(config.transport.timeout, service.wait_until_settled())
        .await
        .is_err()
    {
        warn!("Some records were still pending when the report was printed");
    }

    let options = ReportOptions {
        json: args.json,
        curl: args.curl,
        bodies: args.bodies,
        body_preview_chars: config.capture.body_preview_chars,
    };
    let rendered = report::render(&service.records(), &options).context("Failed to render records")?;
    print!("{rendered}");

    if failed > 0 {
        anyhow::bail!("{failed} of {} request(s) failed", args.urls.len());
    }
    Ok(())
}

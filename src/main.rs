use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use agrisense_telemetry::data::duration::{format_duration, parse_duration};
use agrisense_telemetry::{
    BootstrapSource, HttpBootstrap, Metric, MqttTransport, Pipeline, Report, Settings,
};

#[derive(Parser, Debug)]
#[command(name = "agrisense")]
#[command(about = "Live sensor telemetry for AgriSense farm monitoring")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long)]
    broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    broker_port: Option<u16>,

    /// Topic the sensor nodes publish on
    #[arg(short, long)]
    topic: Option<String>,

    /// Base URL of the history server (GET <url>/data)
    #[arg(long, conflicts_with = "no_bootstrap")]
    bootstrap_url: Option<String>,

    /// Skip the historical bootstrap and start with live data only
    #[arg(long)]
    no_bootstrap: bool,

    /// Delay between reconnect attempts (e.g., "1s", "500ms")
    #[arg(long, value_parser = duration_arg)]
    retry: Option<Duration>,

    /// Interval between status reports (e.g., "5s")
    #[arg(short, long, value_parser = duration_arg)]
    refresh: Option<Duration>,

    /// Write a JSON report to this file on exit
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Log filter (e.g., "debug", "agrisense_telemetry=trace"); overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    let settings = resolve_settings(&args)?;
    let export = args.export;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(settings, export))
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init()?;
    Ok(())
}

/// Config file and environment first, then command-line overrides.
fn resolve_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;

    if let Some(host) = &args.broker_host {
        settings.broker.host = host.clone();
    }
    if let Some(port) = args.broker_port {
        settings.broker.port = port;
    }
    if let Some(topic) = &args.topic {
        settings.broker.topic = topic.clone();
    }
    if let Some(url) = &args.bootstrap_url {
        settings.bootstrap.url = url.clone();
    }
    if args.no_bootstrap {
        settings.bootstrap.enabled = false;
    }
    if let Some(retry) = args.retry {
        settings.broker.retry_interval = retry;
    }
    if let Some(refresh) = args.refresh {
        settings.display.refresh = refresh;
    }

    settings.validate()?;
    Ok(settings)
}

async fn run(settings: Settings, export: Option<PathBuf>) -> Result<()> {
    let transport = MqttTransport::new(settings.broker.host.clone(), settings.broker.port)
        .with_client_id_prefix(settings.broker.client_id_prefix.clone())
        .with_keep_alive(settings.broker.keep_alive);

    let bootstrap: Option<Arc<dyn BootstrapSource>> = if settings.bootstrap.enabled {
        let loader = HttpBootstrap::builder()
            .endpoint(settings.bootstrap.url.clone())
            .timeout(settings.bootstrap.timeout)
            .build()?;
        Some(Arc::new(loader))
    } else {
        None
    };

    info!(
        "Starting: broker {}:{}, topic {}, retry every {}",
        settings.broker.host,
        settings.broker.port,
        settings.broker.topic,
        format_duration(settings.broker.retry_interval)
    );
    let mut pipeline = Pipeline::start(transport, bootstrap, settings.pipeline_options());

    let mut ticker = tokio::time::interval(settings.display.refresh);
    ticker.tick().await;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for ctrl-c: {}", e);
                }
                break;
            }
            _ = ticker.tick() => log_report(&pipeline.report()),
        }
    }

    info!("Shutting down");
    pipeline.shutdown().await;

    if let Some(path) = export {
        export_to_file(&pipeline.report(), &path)?;
    }
    Ok(())
}

fn log_report(report: &Report) {
    info!(
        "Connection: {} | bootstrap: {} | dropped payloads: {}",
        report.connection, report.bootstrap, report.decode_errors
    );

    if report.assessments.is_empty() {
        info!("No readings yet");
        return;
    }
    for assessment in &report.assessments {
        let range = report
            .ranges
            .iter()
            .find(|(metric, _)| *metric == assessment.metric)
            .map(|(_, range)| *range);
        let unit = assessment.metric.unit();
        match range {
            Some(range) => info!(
                "{:<12} {:>8.1}{} [{}] axis {:.1}..{:.1}: {}",
                assessment.metric.label(),
                assessment.value,
                unit,
                assessment.status.symbol(),
                range.min,
                range.max,
                assessment.recommendation
            ),
            None => info!(
                "{:<12} {:>8.1}{} [{}]: {}",
                assessment.metric.label(),
                assessment.value,
                unit,
                assessment.status.symbol(),
                assessment.recommendation
            ),
        }
    }
}

/// Export the current pipeline state to a JSON file
fn export_to_file(report: &Report, export_path: &Path) -> Result<()> {
    use std::io::Write;

    let mut export = serde_json::Map::new();

    let mut summary = serde_json::Map::new();
    summary.insert(
        "generated_at".to_string(),
        serde_json::json!(report.generated_at.to_string()),
    );
    summary.insert("connection".to_string(), serde_json::json!(report.connection));
    summary.insert("bootstrap".to_string(), serde_json::to_value(&report.bootstrap)?);
    summary.insert("decode_errors".to_string(), serde_json::json!(report.decode_errors));
    summary.insert("points".to_string(), serde_json::json!(report.history.len()));
    export.insert("summary".to_string(), serde_json::Value::Object(summary));

    let metrics: Vec<serde_json::Value> = Metric::ALL
        .iter()
        .map(|&metric| {
            let assessment = report.assessments.iter().find(|a| a.metric == metric);
            let range = report
                .ranges
                .iter()
                .find(|(m, _)| *m == metric)
                .map(|(_, r)| *r);
            serde_json::json!({
                "metric": metric,
                "unit": metric.unit(),
                "value": assessment.map(|a| a.value),
                "status": assessment.map(|a| a.status),
                "recommendation": assessment.map(|a| a.recommendation.as_str()),
                "range": range,
                "history": report.history.series(metric),
            })
        })
        .collect();
    export.insert("metrics".to_string(), serde_json::Value::Array(metrics));

    let json = serde_json::to_string_pretty(&export)?;
    let mut file = std::fs::File::create(export_path)
        .with_context(|| format!("Failed to create {}", export_path.display()))?;
    file.write_all(json.as_bytes())?;

    info!("Exported report to {}", export_path.display());
    Ok(())
}

use std::{
    fmt::Write as _,
    sync::{Mutex, OnceLock, PoisonError},
    time::Instant,
};

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use hris_util::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

#[derive(Debug, Clone, Copy)]
enum MetricKind {
    Counter,
    Gauge,
}

/// Every metric the service records, with its help text.
const METRICS: [(&str, MetricKind, &str); 9] = [
    ("app_build_info", MetricKind::Gauge, "Build metadata for the running binary"),
    ("app_uptime_seconds", MetricKind::Gauge, "Seconds since the process started"),
    (
        "lifecycle_transitions_total",
        MetricKind::Counter,
        "Application status transition requests, labelled by result",
    ),
    (
        "applications_created_total",
        MetricKind::Counter,
        "Application submissions, labelled by result",
    ),
    (
        "passes_issued_total",
        MetricKind::Counter,
        "Profiles registered with a fresh pass, labelled by kind",
    ),
    (
        "pass_lookups_total",
        MetricKind::Counter,
        "Pass resolution requests, labelled by result",
    ),
    (
        "notifications_published_total",
        MetricKind::Counter,
        "Domain events handed to the notification hub, labelled by kind",
    ),
    (
        "onboarding_tasks_completed_total",
        MetricKind::Counter,
        "Onboarding task completion requests, labelled by result",
    ),
    ("ws_clients", MetricKind::Gauge, "Connected notification WebSocket clients"),
];

static TRACING_INIT: OnceLock<()> = OnceLock::new();
// Holds the handle once the global recorder is installed.
static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);
static START_TIME: OnceLock<Instant> = OnceLock::new();

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Installs the global subscriber: pretty output outside production, JSON in it.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = tracing_fmt::layer()
        .with_target(false)
        .with_timer(UtcTime::rfc_3339());
    let registry = tracing_subscriber::registry().with(filter);

    match config.environment {
        Environment::Production => registry.with(layer.json()).try_init()?,
        Environment::Development | Environment::Test => registry
            .with(layer.event_format(tracing_fmt::format().pretty()))
            .try_init()?,
    }

    TRACING_INIT.set(()).ok();
    tracing::info!(
        stage = "telemetry",
        env = config.environment.as_str(),
        version = BUILD_VERSION,
        git_sha = build_git_sha(),
        "tracing initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder once per process and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let mut recorder = RECORDER.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = recorder.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    for (name, kind, help) in METRICS {
        match kind {
            MetricKind::Counter => describe_counter!(name, help),
            MetricKind::Gauge => describe_gauge!(name, help),
        }
    }
    START_TIME.get_or_init(Instant::now);

    *recorder = Some(handle.clone());
    Ok(handle)
}

/// Renders the recorder output followed by the build and uptime gauges.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or_default();
    // Writing into a String cannot fail.
    let _ = writeln!(body, "# TYPE app_build_info gauge");
    let _ = writeln!(
        body,
        "app_build_info{{version=\"{BUILD_VERSION}\",git=\"{}\"}} 1",
        build_git_sha()
    );
    let _ = writeln!(body, "# TYPE app_uptime_seconds gauge");
    let _ = writeln!(body, "app_uptime_seconds {uptime}");

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_install_once_and_render_build_gauges() {
        let first = init_metrics().expect("metrics init");
        let second = init_metrics().expect("second init reuses recorder");

        metrics::counter!("pass_lookups_total", "result" => "found").increment(1);
        let rendered = render_metrics(&second);
        assert!(rendered.contains("pass_lookups_total"));
        assert!(rendered.contains(&format!("version=\"{BUILD_VERSION}\"")));
        assert!(rendered.ends_with('\n'));
        assert!(render_metrics(&first).contains("app_uptime_seconds"));
    }
}

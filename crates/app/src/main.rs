mod auth;
mod notify;
mod problem;
mod router;
mod telemetry;

use tracing::info;

use hris_core::PassPolicy;
use hris_storage::Database;
use hris_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;
    if let Some(path) = env_file {
        info!(stage = "config", path = %path.display(), "loaded environment file");
    }

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    let policy = PassPolicy {
        digits: config.pass_suffix_digits,
        max_attempts: config.pass_max_attempts,
    };
    let state = router::AppState::new(
        metrics,
        database,
        policy,
        &config.token_secret,
        config.notify_buffer,
    );

    let addr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}

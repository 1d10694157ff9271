use std::ffi::OsStr;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use weather_predictor::config::AppConfig;
use weather_predictor::error::ModelError;
use weather_predictor::http::{router, AppState};
use weather_predictor::model::ModelStore;
use weather_predictor::security::RateLimiter;

const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// Stderr at RUST_LOG (default info) plus the security log file at debug.
fn init_tracing(log_file: &Path) -> anyhow::Result<WorkerGuard> {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = log_file
        .file_name()
        .unwrap_or(OsStr::new("security_log.log"))
        .to_string_lossy()
        .into_owned();

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

#[cfg(unix)]
fn spawn_reload_on_sighup(models: Arc<ModelStore>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if let Err(e) = models.reload() {
                tracing::warn!("model reload failed: {}", e);
            }
        }
    });
    Ok(())
}

fn spawn_limiter_sweep(limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(LIMITER_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            limiter.sweep();
            tracing::debug!("rate limiter tracking {} clients", limiter.len());
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = AppConfig::from_env()?;
    let _log_guard = init_tracing(&cfg.log_file)?;

    if !cfg.secret_from_env {
        tracing::warn!("SECRET_KEY not set; CSRF tokens will not survive a restart");
    }

    let models = Arc::new(ModelStore::from_path(&cfg.model_path));
    // Warm the cache; a missing artifact is retried on each request.
    match models.get() {
        Ok(_) => {}
        Err(ModelError::Unavailable(path)) => {
            tracing::warn!("model not found at {}; predictions unavailable until it appears", path.display())
        }
        Err(e) => return Err(e).context("failed to load model"),
    }

    #[cfg(unix)]
    spawn_reload_on_sighup(models.clone())?;

    let state = AppState::from_config(&cfg, models)?;
    spawn_limiter_sweep(state.limiter.clone());
    let app = router(state);

    tracing::info!("listening on {}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

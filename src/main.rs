use realtor_gate::application::limiter::RequestLimiter;
use realtor_gate::application::ports::UpstreamConnector;
use realtor_gate::application::sweeper::SweeperHandle;
use realtor_gate::config::{AppConfig, ConfigError};
use realtor_gate::infrastructure::builder::{BuildError, RateLimiterBuilder};
use realtor_gate::infrastructure::http::{router, AppState, SharedSecret};
use realtor_gate::infrastructure::upstream::TungsteniteConnector;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build rate limiter: {0}")]
    Build(#[from] BuildError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "redis-storage")]
    #[error("failed to connect to Redis: {0}")]
    Redis(#[from] redis::RedisError),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "realtor-gate stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    let (limiter, sweeper) = build_limiter(&config).await?;

    let mut state = AppState::new(limiter, SharedSecret::new(config.secret.as_str()))
        .with_session_options(config.session_options.clone());
    if let Some(upstream) = &config.upstream {
        let connector: Arc<dyn UpstreamConnector> = Arc::new(
            TungsteniteConnector::new(upstream.url.as_str(), upstream.api_key.as_str())
                .with_beta_header(upstream.beta.clone()),
        );
        state = state.with_upstream(connector);
    }

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(
        addr = %config.addr,
        relay_enabled = config.upstream.is_some(),
        "realtor-gate listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        if let Err(err) = handle.shutdown().await {
            tracing::warn!(error = %err, "Bucket sweeper did not stop cleanly");
        }
    }
    tracing::info!("realtor-gate shut down");
    Ok(())
}

async fn build_limiter(
    config: &AppConfig,
) -> Result<(Arc<dyn RequestLimiter>, Option<SweeperHandle>), StartupError> {
    let builder = RateLimiterBuilder::new().with_max_buckets(config.max_buckets);

    #[cfg(feature = "redis-storage")]
    if let Some(url) = &config.redis_url {
        let storage = realtor_gate::infrastructure::redis_storage::RedisStorage::connect(url).await?;
        let limiter: Arc<dyn RequestLimiter> = Arc::new(builder.build_with_storage(storage)?);
        return Ok((limiter, None));
    }

    #[cfg(not(feature = "redis-storage"))]
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but redis-storage is not compiled in, keeping buckets in process");
    }

    let limiter = builder.build()?;
    let sweeper = limiter.sweeper(config.sweeper.clone()).start();
    let limiter: Arc<dyn RequestLimiter> = Arc::new(limiter);
    Ok((limiter, Some(sweeper)))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(err) => {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

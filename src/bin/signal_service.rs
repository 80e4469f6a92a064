//! Signal Service binary (spec §4.1, §6): generates ranked/weighted signals
//! from the currently active model per strategy, and keeps the hot-swappable
//! model registry in sync with the model repository on a reload timer.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tradectl::application::signal_service::model_registry::ModelRegistry;
use tradectl::application::signal_service::SignalGenerationService;
use tradectl::config::Config;
use tradectl::infrastructure::http::signal_router::{self, SignalState};
use tradectl::infrastructure::market_data::AlpacaMarketData;
use tradectl::infrastructure::observability::Metrics;
use tradectl::infrastructure::persistence::{Database, SqliteModelRepository};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::from_env()?;
    info!("starting signal service");

    let db = Database::connect(&config.gateway.database_url).await?;
    let models = Arc::new(SqliteModelRepository::new(db.pool.clone()));

    // Alpaca splits trading and market-data hosts across separate base URLs;
    // `BrokerEnvConfig` only carries the trading host, so the data host is
    // its own env var here rather than a field every trading call would pay for.
    let data_base_url = env_or("BROKER_DATA_BASE_URL", "https://data.alpaca.markets");
    let market_data = Arc::new(AlpacaMarketData::new(
        config.broker.api_key.clone(),
        config.broker.api_secret.clone(),
        data_base_url,
    ));

    let strategy_name = env_or("STRATEGY_ID", "momentum");
    let sequence_length = env_usize("MODEL_SEQUENCE_LENGTH", 20);
    let bar_lookback = env_usize("SIGNAL_BAR_LOOKBACK", 60);

    let registry = Arc::new(ModelRegistry::new(models, sequence_length));
    match registry.reload_if_changed(&strategy_name).await {
        Ok(true) => info!(strategy_name, "loaded initial active model"),
        Ok(false) => info!(strategy_name, "no active model row yet; starting degraded"),
        Err(err) => error!(strategy_name, %err, "initial model load failed; starting degraded"),
    }

    let reload_interval = Duration::from_secs(config.gateway.model_reload_interval_seconds);
    let reload_registry = registry.clone();
    let reload_strategy = strategy_name.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reload_interval);
        loop {
            ticker.tick().await;
            match reload_registry.reload_if_changed(&reload_strategy).await {
                Ok(true) => info!(strategy_name = %reload_strategy, "model hot-swapped"),
                Ok(false) => {}
                Err(err) => error!(strategy_name = %reload_strategy, %err, "model reload failed"),
            }
        }
    });

    let service = Arc::new(SignalGenerationService::new(market_data, registry, bar_lookback));
    let state = SignalState { service, metrics: Arc::new(Metrics::new()) };
    let app = signal_router::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.gateway.signal_bind_addr).await?;
    info!(addr = %config.gateway.signal_bind_addr, "signal service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

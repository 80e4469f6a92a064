//! Orchestrator binary (spec §4.3, §6): the single REST entry point that
//! drives one signal-generation-to-order-submission batch per request,
//! calling the Signal Service and Execution Gateway over HTTP.

use std::env;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradectl::application::orchestrator::OrchestratorService;
use tradectl::application::risk::QuarantineGuard;
use tradectl::config::Config;
use tradectl::domain::ports::RiskStore;
use tradectl::infrastructure::http::gateway_client::HttpGatewayClient;
use tradectl::infrastructure::http::orchestrator_router::{self, OrchestratorState};
use tradectl::infrastructure::http::signal_client::HttpSignalClient;
use tradectl::infrastructure::market_data::AlpacaMarketData;
use tradectl::infrastructure::observability::Metrics;
use tradectl::infrastructure::persistence::{Database, SqliteOrchestrationRunRepository, SqliteRiskStore};

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
    info!("starting orchestrator");

    let db = Database::connect(&config.gateway.database_url).await?;
    let risk_db = if config.gateway.risk_store_url == config.gateway.database_url {
        db.clone()
    } else {
        Database::connect(&config.gateway.risk_store_url).await?
    };

    let runs = Arc::new(SqliteOrchestrationRunRepository::new(db.pool.clone()));
    let risk_store: Arc<dyn RiskStore> = Arc::new(SqliteRiskStore::new(risk_db.pool.clone()));
    let quarantine = QuarantineGuard::new(risk_store);

    let signal_base_url = format!("http://{}", config.gateway.signal_bind_addr);
    let gateway_base_url = format!("http://{}", config.gateway.gateway_bind_addr);
    let signals = Arc::new(HttpSignalClient::new(signal_base_url, config.gateway.request_deadline));
    let gateway = Arc::new(HttpGatewayClient::new(gateway_base_url, config.gateway.request_deadline));

    let data_base_url = env_or("BROKER_DATA_BASE_URL", "https://data.alpaca.markets");
    let market_data = Arc::new(AlpacaMarketData::new(
        config.broker.api_key.clone(),
        config.broker.api_secret.clone(),
        data_base_url,
    ));

    let top_n = env_usize("ORCHESTRATION_TOP_N", 10);
    let bottom_n = env_usize("ORCHESTRATION_BOTTOM_N", 10);
    let strategy_id = env_or("STRATEGY_ID", "momentum");

    let service = Arc::new(OrchestratorService::new(
        signals,
        gateway,
        market_data,
        quarantine,
        runs.clone(),
        top_n,
        bottom_n,
        strategy_id,
    ));

    let state = OrchestratorState { service, runs, metrics: Arc::new(Metrics::new()) };
    let app = orchestrator_router::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.gateway.orchestrator_bind_addr).await?;
    info!(addr = %config.gateway.orchestrator_bind_addr, "orchestrator listening");
    axum::serve(listener, app).await?;
    Ok(())
}

//! Execution Gateway binary (spec §2, §6): owns the order ledger, runs the
//! pre-trade gate pipeline, ingests broker webhooks, and drives the
//! reconciliation and TTL-sweep background cycles. Grounded on the
//! teacher's `main.rs` runtime/logging bootstrap, rebuilt as a single-service
//! axum binary instead of a desktop-UI host process.

use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tradectl::application::execution_gateway::reconciliation::ReconciliationEngine;
use tradectl::application::execution_gateway::sweep::TtlSweeper;
use tradectl::application::execution_gateway::webhook::WebhookHandler;
use tradectl::application::execution_gateway::ExecutionGatewayService;
use tradectl::application::risk::{CircuitBreaker, KillSwitchGuard, QuarantineGuard, ReconciliationGateGuard, ReservationLedger};
use tradectl::config::Config;
use tradectl::domain::ports::{BreakerHistory, RiskStore};
use tradectl::domain::risk_state::CircuitBreakerState;
use tradectl::infrastructure::broker::AlpacaBroker;
use tradectl::infrastructure::http::gateway_router::{self, GatewayState};
use tradectl::infrastructure::observability::Metrics;
use tradectl::infrastructure::persistence::{Database, SqliteOrderRepository, SqliteOrphanRepository, SqlitePositionRepository, SqliteRiskStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::from_env()?;
    info!(dry_run = config.gateway.dry_run, "starting execution gateway");

    let ledger_db = Database::connect(&config.gateway.database_url).await?;
    let risk_db = if config.gateway.risk_store_url == config.gateway.database_url {
        ledger_db.clone()
    } else {
        Database::connect(&config.gateway.risk_store_url).await?
    };

    let orders = Arc::new(SqliteOrderRepository::new(ledger_db.pool.clone()));
    let positions = Arc::new(SqlitePositionRepository::new(ledger_db.pool.clone()));
    let orphans = Arc::new(SqliteOrphanRepository::new(ledger_db.pool.clone()));
    let risk_store: Arc<dyn RiskStore> = Arc::new(SqliteRiskStore::new(risk_db.pool.clone()));
    let breaker_history: Arc<dyn BreakerHistory> = Arc::new(SqliteRiskStore::new(risk_db.pool.clone()));
    let broker = Arc::new(AlpacaBroker::new(
        config.broker.api_key.clone(),
        config.broker.api_secret.clone(),
        config.broker.base_url.clone(),
    ));

    let service = Arc::new(ExecutionGatewayService::new(
        orders.clone(),
        positions.clone(),
        broker.clone(),
        risk_store.clone(),
        KillSwitchGuard::new(risk_store.clone()),
        CircuitBreaker::new(risk_store.clone(), breaker_history.clone()),
        ReconciliationGateGuard::new(risk_store.clone()),
        QuarantineGuard::new(risk_store.clone()),
        ReservationLedger::new(risk_store.clone()),
        config.risk.clone(),
        config.gateway.dry_run,
    ));
    let webhook = Arc::new(WebhookHandler::new(
        orders.clone(),
        positions.clone(),
        ReservationLedger::new(risk_store.clone()),
    ));

    let reconciliation = ReconciliationEngine::new(
        orders.clone(),
        positions.clone(),
        broker.clone(),
        orphans.clone(),
        ReconciliationGateGuard::new(risk_store.clone()),
        QuarantineGuard::new(risk_store.clone()),
        ReservationLedger::new(risk_store.clone()),
        config.gateway.reconciliation_grace_seconds,
        config.gateway.reconciliation_interval_seconds as i64,
    );
    let sweeper = TtlSweeper::new(orders.clone(), ReservationLedger::new(risk_store.clone()), config.gateway.reservation_ttl_seconds);
    let metrics = Arc::new(Metrics::new());

    let reconciliation_interval = Duration::from_secs(config.gateway.reconciliation_interval_seconds);
    let breaker_metrics = CircuitBreaker::new(risk_store.clone(), breaker_history.clone());
    let reconciliation_metrics = metrics.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reconciliation_interval);
        loop {
            ticker.tick().await;
            match reconciliation.run_cycle().await {
                Ok(summary) if !summary.skipped => {
                    info!(matched = summary.matched, orphaned = summary.orphaned, aged_out = summary.aged_out, "reconciliation cycle complete");
                    reconciliation_metrics.reconciliation_cycles_total.with_label_values(&["completed"]).inc();
                }
                Ok(_) => {}
                Err(err) => {
                    error!(%err, "reconciliation cycle failed");
                    reconciliation_metrics.reconciliation_cycles_total.with_label_values(&["failed"]).inc();
                }
            }
            let breaker_state = match breaker_metrics.read().await {
                CircuitBreakerState::Open => 0,
                CircuitBreakerState::QuietPeriod => 1,
                CircuitBreakerState::Tripped => 2,
            };
            reconciliation_metrics.circuit_breaker_state.set(breaker_state);
        }
    });

    // Polls well inside the TTL window so an aged-out reservation doesn't sit
    // held much longer than `reservation_ttl_seconds` actually allows.
    let sweep_interval = Duration::from_secs((config.gateway.reservation_ttl_seconds / 4).clamp(5, 60) as u64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            match sweeper.sweep().await {
                Ok(summary) if summary.canceled > 0 => {
                    info!(canceled = summary.canceled, "ttl sweep aged out dry-run orders");
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "ttl sweep failed"),
            }
        }
    });

    let state = GatewayState {
        service,
        webhook,
        webhook_secret: config.gateway.webhook_secret.clone(),
        dry_run: config.gateway.dry_run,
        risk_store: risk_store.clone(),
        metrics,
    };
    let app = gateway_router::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.gateway.gateway_bind_addr).await?;
    info!(addr = %config.gateway.gateway_bind_addr, "execution gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

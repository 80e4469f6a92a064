//! Port interfaces: the seams between domain logic and infrastructure.
//!
//! Generalized from the teacher's `MarketDataService`/`ExecutionService`
//! traits (single-broker, single-process) into the repository/broker/store
//! abstractions the control plane's three services share.

use crate::domain::errors::AppError;
use crate::domain::fill::Fill;
use crate::domain::model::ModelMetadata;
use crate::domain::order::{Order, OrderSide, OrderStatus, OrderType, StatusSource};
use crate::domain::position::PositionSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub type PortResult<T> = Result<T, AppError>;

/// Persists and retrieves the order ledger. Owned exclusively by the
/// Execution Gateway.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_pending(&self, order: &Order) -> PortResult<()>;

    async fn get(&self, client_order_id: &str) -> PortResult<Option<Order>>;

    async fn list(&self, filters: OrderFilters) -> PortResult<Vec<Order>>;

    async fn list_non_terminal(&self) -> PortResult<Vec<Order>>;

    /// Compare-and-set transition keyed on `status_sequence`. Returns
    /// `Ok(false)` (no error) when the CAS lost to a higher-priority or
    /// higher-sequence writer — this is the expected, non-exceptional
    /// outcome of a lost race, not a failure.
    async fn apply_transition(&self, transition: OrderTransition) -> PortResult<bool>;

    async fn append_fill(&self, fill: &Fill) -> PortResult<()>;

    async fn fills_for_order(&self, client_order_id: &str) -> PortResult<Vec<Fill>>;

    /// Idempotency check for webhook delivery: has this broker event already
    /// been applied to this order?
    async fn has_webhook_event(&self, client_order_id: &str, broker_event_id: &str) -> PortResult<bool>;

    async fn record_webhook_event(&self, client_order_id: &str, broker_event_id: &str) -> PortResult<()>;
}

#[derive(Debug, Clone)]
pub struct OrderTransition {
    pub client_order_id: String,
    pub new_status: OrderStatus,
    pub filled_qty: i64,
    pub avg_fill_price: Decimal,
    pub broker_order_id: Option<String>,
    pub source: StatusSource,
    /// The `status_sequence` the caller last observed; the write only
    /// commits if the persisted row still matches it.
    pub expected_sequence: i64,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilters {
    pub symbol: Option<String>,
    pub status: Option<OrderStatus>,
    pub strategy_id: Option<String>,
    pub limit: Option<i64>,
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn get(&self, symbol: &str) -> PortResult<Option<PositionSnapshot>>;
    async fn list(&self) -> PortResult<Vec<PositionSnapshot>>;
    async fn upsert(&self, snapshot: &PositionSnapshot) -> PortResult<()>;
}

#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn get_active(&self, strategy_name: &str) -> PortResult<Option<ModelMetadata>>;
    async fn get(&self, id: &str) -> PortResult<Option<ModelMetadata>>;
    /// Transactionally deactivates the current active row (if any) for
    /// `strategy_name` and activates `id`, enforcing the at-most-one-active
    /// invariant.
    async fn activate(&self, strategy_name: &str, id: &str) -> PortResult<()>;
    async fn insert(&self, model: &ModelMetadata) -> PortResult<()>;
}

/// The shared risk-state key-value store (spec §3), realized here as the
/// `risk_kv` SQLite table (SPEC_FULL.md §3) rather than an external KV
/// system. Every write is a single-key CAS; no multi-key transactions.
#[async_trait]
pub trait RiskStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    /// Unconditional set, for values without CAS semantics (e.g. the
    /// kill switch, which is operator-authoritative and never raced).
    async fn set(&self, key: &str, value: &str) -> PortResult<()>;

    /// Versioned compare-and-set. `expected_version` must match the
    /// currently stored version (0 for a key that doesn't exist yet) or the
    /// write is rejected without error — the caller re-reads and retries.
    async fn cas(&self, key: &str, expected_version: i64, new_value: &str) -> PortResult<bool>;

    async fn get_with_version(&self, key: &str) -> PortResult<Option<(String, i64)>>;

    /// Atomically adds `delta` to an integer-valued key, creating it at 0
    /// first if absent. Used for position reservations.
    async fn atomic_add(&self, key: &str, delta: i64) -> PortResult<i64>;

    async fn delete(&self, key: &str) -> PortResult<()>;

    /// Acquires a short-lived named lock (e.g. `reconciliation:running`).
    /// Returns `false` without error if already held and unexpired.
    async fn try_lock(&self, key: &str, ttl_seconds: i64) -> PortResult<bool>;

    async fn unlock(&self, key: &str) -> PortResult<()>;
}

/// Broker-side order submission and account queries. Implemented by
/// `infrastructure::broker::alpaca::AlpacaBroker`.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn submit_order(&self, order: &Order) -> PortResult<BrokerAck>;
    async fn cancel_order(&self, broker_order_id: &str) -> PortResult<()>;
    async fn get_open_orders(&self) -> PortResult<Vec<BrokerOrderState>>;
    async fn get_orders_since(&self, since: DateTime<Utc>) -> PortResult<Vec<BrokerOrderState>>;
    async fn get_positions(&self) -> PortResult<Vec<PositionSnapshot>>;
}

#[derive(Debug, Clone)]
pub struct BrokerAck {
    pub broker_order_id: String,
    pub status: OrderStatus,
}

/// Broker's view of an order, as returned by polling/reconciliation reads.
///
/// `side`/`qty`/`order_type`/`limit_price`/`time_in_force` mirror fields the
/// broker already returns on every order object; reconciliation needs them to
/// absorb an order it finds with a `client_order_id` matching its own
/// deterministic scheme (spec §4.5 step 4) but no local ledger row, since
/// absorption means constructing a full `Order` to insert.
#[derive(Debug, Clone)]
pub struct BrokerOrderState {
    pub broker_order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: i64,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub time_in_force: String,
    pub status: OrderStatus,
    pub filled_qty: i64,
    pub avg_fill_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// A single OHLCV bar, optionally carrying the top-of-book quote observed
/// at close. `bid`/`ask` are `None` when the feed doesn't carry quotes for
/// this asset class; the feature pipeline falls back to neutral defaults
/// for spread/order-flow features in that case rather than failing.
#[derive(Debug, Clone, Copy)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

/// Latest mark price and recent bar history, used by the Orchestrator's
/// sizing rule and the Signal Service's feature pipeline respectively.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn get_price(&self, symbol: &str) -> PortResult<Option<Decimal>>;

    /// Most recent `lookback` bars, oldest first. Fewer than `lookback` bars
    /// come back for a symbol with a short history; the feature pipeline
    /// treats that as a cold start, not an error.
    async fn get_recent_bars(&self, symbol: &str, lookback: usize) -> PortResult<Vec<PriceBar>>;
}

/// Append-only circuit breaker trip history (spec §3's `circuit_breaker:
/// history` sorted-set key). A single `RiskStore` TEXT value can't hold an
/// appendable sorted set, so this is its own small port rather than a
/// `RiskStore` method — realized by `circuit_breaker_trips` (SPEC_FULL.md
/// §6).
#[async_trait]
pub trait BreakerHistory: Send + Sync {
    async fn record_trip(&self, reason: &str, tripped_at: DateTime<Utc>) -> PortResult<()>;
    async fn list_trips(&self, limit: i64) -> PortResult<Vec<(String, DateTime<Utc>)>>;
}

/// A broker order reconciliation found with no matching ledger row and a
/// `client_order_id` outside the deterministic scheme (spec §4.5 step 4).
#[derive(Debug, Clone)]
pub struct OrphanOrder {
    pub broker_order_id: String,
    pub symbol: String,
    pub status: OrderStatus,
    pub filled_qty: i64,
    pub avg_fill_price: Decimal,
    pub detected_at: DateTime<Utc>,
}

#[async_trait]
pub trait OrphanRepository: Send + Sync {
    async fn record(&self, orphan: &OrphanOrder) -> PortResult<()>;
    async fn list(&self) -> PortResult<Vec<OrphanOrder>>;
}

/// Orchestration run record (spec §4.3: "the run record ... is persisted
/// before returning"), backing the Orchestrator's own ledger of its batch
/// submissions independent of the gateway's per-order ledger.
#[derive(Debug, Clone)]
pub struct OrchestrationRun {
    pub run_id: String,
    pub status: String,
    pub num_signals: i64,
    pub num_orders_submitted: i64,
    pub num_orders_accepted: i64,
    pub num_orders_rejected: i64,
    pub mappings: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[async_trait]
pub trait OrchestrationRunRepository: Send + Sync {
    async fn insert(&self, run: &OrchestrationRun) -> PortResult<()>;
    async fn get(&self, run_id: &str) -> PortResult<Option<OrchestrationRun>>;
}

/// Outcome of a single order submission through the Execution Gateway's
/// public contract, as observed by a caller across the process boundary
/// (the Orchestrator) — the same `{client_order_id, status, broker_order_id}`
/// triple `POST /api/v1/orders` returns (spec §6).
#[derive(Debug, Clone)]
pub struct GatewaySubmitOutcome {
    pub client_order_id: String,
    pub status: OrderStatus,
    pub broker_order_id: Option<String>,
}

/// The Orchestrator's view of the Execution Gateway: an HTTP client in
/// production (the two are separate services per spec §2's dependency
/// order), substitutable in tests. Mirrors `BrokerClient`'s shape one layer
/// up the stack.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn submit_order(&self, request: &crate::domain::order::OrderRequest) -> PortResult<GatewaySubmitOutcome>;
}

/// The Orchestrator's view of the Signal Service: an HTTP client in
/// production, substitutable in tests. `generate_signals` mirrors the
/// Signal Service's `POST /api/v1/signals/generate` contract (spec §6).
#[async_trait]
pub trait SignalClient: Send + Sync {
    async fn generate_signals(
        &self,
        symbols: &[String],
        top_n: usize,
        bottom_n: usize,
    ) -> PortResult<Vec<crate::domain::signal::Signal>>;
}

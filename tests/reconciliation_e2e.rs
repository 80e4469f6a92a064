//! End-to-end tests for the reconciliation engine against a real
//! SQLite-backed ledger (spec §4.5, §8): the startup gate, the orphan
//! absorption/quarantine path, and the webhook-vs-reconciliation CAS race.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tradectl::application::execution_gateway::reconciliation::ReconciliationEngine;
use tradectl::application::execution_gateway::webhook::{WebhookHandler, WebhookPayload};
use tradectl::application::risk::{QuarantineGuard, ReconciliationGateGuard, ReservationLedger};
use tradectl::domain::order::{Order, OrderSide, OrderStatus, OrderType, StatusSource};
use tradectl::domain::ports::{
    BrokerAck, BrokerClient, BrokerOrderState, OrderRepository, OrphanRepository, PortResult, PositionRepository,
};
use tradectl::domain::position::PositionSnapshot;
use tradectl::domain::risk_state::ReconciliationGate;
use tradectl::infrastructure::persistence::database::Database;
use tradectl::infrastructure::persistence::order_repository::SqliteOrderRepository;
use tradectl::infrastructure::persistence::orphan_repository::SqliteOrphanRepository;
use tradectl::infrastructure::persistence::position_repository::SqlitePositionRepository;
use tradectl::infrastructure::persistence::risk_kv_repository::SqliteRiskStore;

struct ScriptedBroker {
    open_orders: Vec<BrokerOrderState>,
    positions: Vec<PositionSnapshot>,
    calls: AtomicUsize,
}

#[async_trait]
impl BrokerClient for ScriptedBroker {
    async fn submit_order(&self, _order: &Order) -> PortResult<BrokerAck> {
        unreachable!("reconciliation never submits new orders")
    }

    async fn cancel_order(&self, _broker_order_id: &str) -> PortResult<()> {
        Ok(())
    }

    async fn get_open_orders(&self) -> PortResult<Vec<BrokerOrderState>> {
        Ok(self.open_orders.clone())
    }

    async fn get_orders_since(&self, _since: DateTime<Utc>) -> PortResult<Vec<BrokerOrderState>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.open_orders.clone())
    }

    async fn get_positions(&self) -> PortResult<Vec<PositionSnapshot>> {
        Ok(self.positions.clone())
    }
}

struct Wiring {
    pool: sqlx::SqlitePool,
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    orphans: Arc<dyn OrphanRepository>,
    gate: ReconciliationGateGuard,
}

async fn wiring() -> Wiring {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let risk_store = Arc::new(SqliteRiskStore::new(db.pool.clone()));
    Wiring {
        pool: db.pool.clone(),
        orders: Arc::new(SqliteOrderRepository::new(db.pool.clone())),
        positions: Arc::new(SqlitePositionRepository::new(db.pool.clone())),
        orphans: Arc::new(SqliteOrphanRepository::new(db.pool.clone())),
        gate: ReconciliationGateGuard::new(risk_store),
    }
}

fn pending_order(client_order_id: &str, symbol: &str, qty: i64) -> Order {
    let now = Utc::now();
    Order {
        client_order_id: client_order_id.to_string(),
        broker_order_id: Some(format!("b-{client_order_id}")),
        symbol: symbol.to_string(),
        side: OrderSide::Buy,
        qty,
        order_type: OrderType::Market,
        limit_price: None,
        time_in_force: "day".to_string(),
        status: OrderStatus::Submitted,
        filled_qty: 0,
        avg_fill_price: Decimal::ZERO,
        strategy_id: Some("momentum_v1".to_string()),
        created_at: now,
        updated_at: now,
        status_source: StatusSource::InternalTimer,
        status_sequence: 0,
        trade_date: now.date_naive(),
    }
}

#[tokio::test]
async fn startup_gate_stays_closed_until_the_first_cycle_succeeds() {
    let w = wiring().await;
    assert_eq!(w.gate.read().await, ReconciliationGate::Closed);

    let broker = Arc::new(ScriptedBroker {
        open_orders: vec![],
        positions: vec![],
        calls: AtomicUsize::new(0),
    });
    let risk_store = Arc::new(SqliteRiskStore::new(w.pool.clone()));
    let engine = ReconciliationEngine::new(
        w.orders.clone(),
        w.positions.clone(),
        broker,
        w.orphans.clone(),
        ReconciliationGateGuard::new(risk_store.clone()),
        QuarantineGuard::new(risk_store.clone()),
        ReservationLedger::new(risk_store),
        300,
        60,
    );

    engine.run_cycle().await.unwrap();
    assert_eq!(w.gate.read().await, ReconciliationGate::Open);
}

#[tokio::test]
async fn orphan_with_non_matching_id_is_recorded_and_quarantines_the_symbol() {
    // Spec §8 scenario 5: an open broker order with no matching
    // `client_order_id` is inserted into `orphan_orders` and its symbol is
    // quarantined, but the cycle still completes and opens the gate.
    let w = wiring().await;
    let broker = Arc::new(ScriptedBroker {
        open_orders: vec![BrokerOrderState {
            broker_order_id: "alpaca-xyz".to_string(),
            client_order_id: None,
            symbol: "NFLX".to_string(),
            side: OrderSide::Buy,
            qty: 50,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: "day".to_string(),
            status: OrderStatus::Submitted,
            filled_qty: 0,
            avg_fill_price: Decimal::ZERO,
            updated_at: Utc::now(),
        }],
        positions: vec![],
        calls: AtomicUsize::new(0),
    });
    let risk_store = Arc::new(SqliteRiskStore::new(w.pool.clone()));
    let engine = ReconciliationEngine::new(
        w.orders.clone(),
        w.positions.clone(),
        broker,
        w.orphans.clone(),
        ReconciliationGateGuard::new(risk_store.clone()),
        QuarantineGuard::new(risk_store.clone()),
        ReservationLedger::new(risk_store.clone()),
        300,
        60,
    );

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.orphaned, 1);

    let orphans = w.orphans.list().await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].symbol, "NFLX");

    let quarantine = QuarantineGuard::new(risk_store);
    assert!(quarantine.is_quarantined("NFLX").await);
}

#[tokio::test]
async fn webhook_fill_wins_the_cas_race_against_a_stale_reconciliation_write() {
    // Spec §8 scenario 3: a fill webhook advances an order to `filled`
    // before reconciliation, which read the order's prior (`submitted`)
    // state, attempts to write back `submitted`. The webhook's write bumped
    // `status_sequence`, so the reconciliation engine's `apply_transition`
    // call against the stale sequence loses the CAS and the final row stays
    // `filled`.
    let w = wiring().await;
    let order = pending_order("order-1", "AAPL", 100);
    w.orders.insert_pending(&order).await.unwrap();
    // Move the row out of `pending` so the reconciliation compare below
    // reflects a realistic post-submit state.
    w.orders
        .apply_transition(tradectl::domain::ports::OrderTransition {
            client_order_id: order.client_order_id.clone(),
            new_status: OrderStatus::Submitted,
            filled_qty: 0,
            avg_fill_price: Decimal::ZERO,
            broker_order_id: order.broker_order_id.clone(),
            source: StatusSource::InternalTimer,
            expected_sequence: 0,
        })
        .await
        .unwrap();
    let stale = w.orders.get(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(stale.status, OrderStatus::Submitted);

    let webhook = WebhookHandler::new(
        w.orders.clone(),
        w.positions.clone(),
        ReservationLedger::new(Arc::new(SqliteRiskStore::new(w.pool.clone()))),
    );
    webhook
        .apply(WebhookPayload {
            event_id: "evt-1".to_string(),
            client_order_id: order.client_order_id.clone(),
            broker_order_id: stale.broker_order_id.clone().unwrap(),
            status: OrderStatus::Filled,
            fill_qty: 100,
            fill_price: Some(dec!(151.25)),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

    let after_webhook = w.orders.get(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(after_webhook.status, OrderStatus::Filled);
    assert_eq!(after_webhook.filled_qty, 100);

    // Reconciliation now attempts a write against the sequence it observed
    // *before* the webhook applied (the `stale` snapshot above).
    let applied = w
        .orders
        .apply_transition(tradectl::domain::ports::OrderTransition {
            client_order_id: order.client_order_id.clone(),
            new_status: OrderStatus::Submitted,
            filled_qty: 0,
            avg_fill_price: Decimal::ZERO,
            broker_order_id: stale.broker_order_id.clone(),
            source: StatusSource::Reconciliation,
            expected_sequence: stale.status_sequence,
        })
        .await
        .unwrap();
    assert!(!applied, "reconciliation's stale-sequence write must lose the CAS");

    let final_row = w.orders.get(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(final_row.status, OrderStatus::Filled);
    assert_eq!(final_row.filled_qty, 100);
}

#[tokio::test]
async fn broker_order_matching_our_id_scheme_is_absorbed_into_the_ledger() {
    // Review fix: a broker order with no ledger row is only a true orphan
    // when its `client_order_id` falls outside our deterministic scheme. One
    // that matches (e.g. the gateway crashed after submitting but before
    // `insert_pending` committed) is absorbed instead of quarantined.
    let w = wiring().await;
    let id = tradectl::domain::client_order_id::compute(
        "NVDA",
        "buy",
        25,
        None,
        Some("momentum_v1"),
        Utc::now().date_naive(),
    );
    let broker = Arc::new(ScriptedBroker {
        open_orders: vec![BrokerOrderState {
            broker_order_id: "alpaca-abc".to_string(),
            client_order_id: Some(id.clone()),
            symbol: "NVDA".to_string(),
            side: OrderSide::Buy,
            qty: 25,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: "day".to_string(),
            status: OrderStatus::Filled,
            filled_qty: 25,
            avg_fill_price: dec!(450.00),
            updated_at: Utc::now(),
        }],
        positions: vec![],
        calls: AtomicUsize::new(0),
    });
    let risk_store = Arc::new(SqliteRiskStore::new(w.pool.clone()));
    let engine = ReconciliationEngine::new(
        w.orders.clone(),
        w.positions.clone(),
        broker,
        w.orphans.clone(),
        ReconciliationGateGuard::new(risk_store.clone()),
        QuarantineGuard::new(risk_store.clone()),
        ReservationLedger::new(risk_store.clone()),
        300,
        60,
    );

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.absorbed, 1);
    assert_eq!(summary.orphaned, 0);

    let absorbed = w.orders.get(&id).await.unwrap().unwrap();
    assert_eq!(absorbed.symbol, "NVDA");
    assert_eq!(absorbed.status, OrderStatus::Filled);

    assert!(w.orphans.list().await.unwrap().is_empty());
    let quarantine = QuarantineGuard::new(risk_store);
    assert!(!quarantine.is_quarantined("NVDA").await);
}

#[tokio::test]
async fn a_terminal_local_order_the_broker_still_reports_is_matched_not_orphaned() {
    // Review fix: matching must check the full ledger, not just
    // `list_non_terminal()` — a fill can terminalize the local row before
    // the next cycle re-reports the same order.
    let w = wiring().await;
    let order = pending_order("order-2", "MSFT", 40);
    w.orders.insert_pending(&order).await.unwrap();
    w.orders
        .apply_transition(tradectl::domain::ports::OrderTransition {
            client_order_id: order.client_order_id.clone(),
            new_status: OrderStatus::Filled,
            filled_qty: 40,
            avg_fill_price: dec!(310.00),
            broker_order_id: order.broker_order_id.clone(),
            source: StatusSource::Webhook,
            expected_sequence: 0,
        })
        .await
        .unwrap();

    let broker = Arc::new(ScriptedBroker {
        open_orders: vec![BrokerOrderState {
            broker_order_id: order.broker_order_id.clone().unwrap(),
            client_order_id: Some(order.client_order_id.clone()),
            symbol: "MSFT".to_string(),
            side: OrderSide::Buy,
            qty: 40,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: "day".to_string(),
            status: OrderStatus::Filled,
            filled_qty: 40,
            avg_fill_price: dec!(310.00),
            updated_at: Utc::now(),
        }],
        positions: vec![],
        calls: AtomicUsize::new(0),
    });
    let risk_store = Arc::new(SqliteRiskStore::new(w.pool.clone()));
    let engine = ReconciliationEngine::new(
        w.orders.clone(),
        w.positions.clone(),
        broker,
        w.orphans.clone(),
        ReconciliationGateGuard::new(risk_store.clone()),
        QuarantineGuard::new(risk_store.clone()),
        ReservationLedger::new(risk_store.clone()),
        300,
        60,
    );

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.orphaned, 0);

    assert!(w.orphans.list().await.unwrap().is_empty());
    let quarantine = QuarantineGuard::new(risk_store);
    assert!(!quarantine.is_quarantined("MSFT").await);
}

#[tokio::test]
async fn webhook_fill_to_a_terminal_status_releases_the_remaining_reservation() {
    // Review fix: `WebhookHandler` must release the reservation itself on a
    // webhook-driven terminalization, since neither the TTL sweeper (dry-run
    // orders only) nor the reconciliation engine (non-terminal rows it
    // itself transitions) ever touch an order a webhook fully fills first.
    let w = wiring().await;
    let order = pending_order("order-3", "AAPL", 100);
    w.orders.insert_pending(&order).await.unwrap();

    let risk_store = Arc::new(SqliteRiskStore::new(w.pool.clone()));
    let reservations = ReservationLedger::new(risk_store.clone());
    reservations.reserve("AAPL", order.signed_remaining()).await.unwrap();
    assert_eq!(reservations.current("AAPL").await.unwrap(), 100);

    let webhook = WebhookHandler::new(w.orders.clone(), w.positions.clone(), reservations);
    webhook
        .apply(WebhookPayload {
            event_id: "evt-fill".to_string(),
            client_order_id: order.client_order_id.clone(),
            broker_order_id: order.broker_order_id.clone().unwrap(),
            status: OrderStatus::Filled,
            fill_qty: 100,
            fill_price: Some(dec!(151.00)),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

    let reservations = ReservationLedger::new(risk_store);
    assert_eq!(reservations.current("AAPL").await.unwrap(), 0);
}

#[tokio::test]
async fn webhook_fill_without_a_price_does_not_advance_filled_qty() {
    // Review fix: a `Fill` row is only ever appended when `fill_price` is
    // `Some`, so `filled_qty` must not advance without one either, or
    // `sum(fills.qty) == filled_qty` breaks.
    let w = wiring().await;
    let order = pending_order("order-4", "AAPL", 100);
    w.orders.insert_pending(&order).await.unwrap();

    let risk_store = Arc::new(SqliteRiskStore::new(w.pool.clone()));
    let webhook = WebhookHandler::new(
        w.orders.clone(),
        w.positions.clone(),
        ReservationLedger::new(risk_store),
    );
    webhook
        .apply(WebhookPayload {
            event_id: "evt-nopx".to_string(),
            client_order_id: order.client_order_id.clone(),
            broker_order_id: order.broker_order_id.clone().unwrap(),
            status: OrderStatus::PartiallyFilled,
            fill_qty: 40,
            fill_price: None,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

    let updated = w.orders.get(&order.client_order_id).await.unwrap().unwrap();
    assert_eq!(updated.filled_qty, 0, "filled_qty must not advance without a fill price");
    let fills = w.orders.fills_for_order(&order.client_order_id).await.unwrap();
    let fill_total: i64 = fills.iter().map(|f| f.qty).sum();
    assert_eq!(fill_total, updated.filled_qty, "sum(fills.qty) must equal filled_qty");
}

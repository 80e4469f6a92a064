//! The reconciliation engine (spec §4.5): pulls broker truth since the last
//! high-water mark, CAS-applies matches with `StatusSource::Reconciliation`,
//! quarantines symbols behind orphaned broker orders, ages out local orders
//! the broker no longer reports, and reconciles position snapshots. Grounded
//! on `application::risk_management::order_reconciler`'s cycle shape,
//! rebuilt against the persisted ledger and `risk_kv` gate/lock instead of
//! the teacher's in-process `PendingOrder` map.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::risk::{QuarantineGuard, ReconciliationGateGuard, ReservationLedger};
use crate::domain::client_order_id::matches_deterministic_scheme;
use crate::domain::errors::AppError;
use crate::domain::order::{Order, StatusSource};
use crate::domain::ports::{
    BrokerClient, BrokerOrderState, OrderRepository, OrderTransition, OrphanOrder, OrphanRepository,
    PositionRepository,
};
use crate::domain::risk_state::ReconciliationGate;

#[derive(Debug, Clone, Default)]
pub struct ReconciliationSummary {
    pub skipped: bool,
    pub matched: u32,
    pub absorbed: u32,
    pub orphaned: u32,
    pub aged_out: u32,
    pub positions_reconciled: u32,
}

impl ReconciliationSummary {
    fn skipped_cycle() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

pub struct ReconciliationEngine {
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    broker: Arc<dyn BrokerClient>,
    orphans: Arc<dyn OrphanRepository>,
    gate: ReconciliationGateGuard,
    quarantine: QuarantineGuard,
    reservations: ReservationLedger,
    grace_seconds: i64,
    lock_ttl_seconds: i64,
}

impl ReconciliationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        positions: Arc<dyn PositionRepository>,
        broker: Arc<dyn BrokerClient>,
        orphans: Arc<dyn OrphanRepository>,
        gate: ReconciliationGateGuard,
        quarantine: QuarantineGuard,
        reservations: ReservationLedger,
        grace_seconds: i64,
        lock_ttl_seconds: i64,
    ) -> Self {
        Self {
            orders,
            positions,
            broker,
            orphans,
            gate,
            quarantine,
            reservations,
            grace_seconds,
            lock_ttl_seconds,
        }
    }

    /// Runs one cycle under the cross-instance lock. Returns a summary with
    /// `skipped = true` (not an error) if another instance already holds the
    /// lock — periodic cycles race harmlessly against each other.
    pub async fn run_cycle(&self) -> Result<ReconciliationSummary, AppError> {
        if !self.gate.try_begin_cycle(self.lock_ttl_seconds).await? {
            return Ok(ReconciliationSummary::skipped_cycle());
        }
        let result = self.run_cycle_inner().await;
        if let Err(err) = self.gate.end_cycle().await {
            warn!(%err, "failed to release reconciliation lock");
        }
        result
    }

    async fn run_cycle_inner(&self) -> Result<ReconciliationSummary, AppError> {
        let hwm = self.gate.high_water_mark().await?;
        let broker_orders = self.broker.get_orders_since(hwm).await?;

        // The aging-out pass below only ever needs non-terminal rows, but
        // matching must check the *full* ledger: a recently-filled (and
        // therefore terminal) local order still shows up in `get_orders_since`
        // after it fills, and must be recognized as present locally rather
        // than treated as an orphan.
        let local_orders = self.orders.list_non_terminal().await?;

        let mut summary = ReconciliationSummary::default();
        let mut new_hwm = hwm;
        let mut seen_ids: HashSet<String> = HashSet::new();

        for broker_order in &broker_orders {
            new_hwm = new_hwm.max(broker_order.updated_at);

            let matched_local = match &broker_order.client_order_id {
                Some(id) => self.orders.get(id).await?,
                None => None,
            };

            match matched_local {
                Some(local) => {
                    seen_ids.insert(local.client_order_id.clone());
                    let applied = self
                        .orders
                        .apply_transition(OrderTransition {
                            client_order_id: local.client_order_id.clone(),
                            new_status: broker_order.status,
                            filled_qty: broker_order.filled_qty,
                            avg_fill_price: broker_order.avg_fill_price,
                            broker_order_id: Some(broker_order.broker_order_id.clone()),
                            source: StatusSource::Reconciliation,
                            expected_sequence: local.status_sequence,
                        })
                        .await?;

                    if applied && broker_order.status.is_terminal() {
                        self.reservations
                            .release(&local.symbol, local.signed_remaining())
                            .await
                            .ok();
                    }
                    summary.matched += 1;
                }
                None => {
                    let scheme_match = broker_order
                        .client_order_id
                        .as_deref()
                        .is_some_and(matches_deterministic_scheme);

                    if scheme_match {
                        self.absorb_order(broker_order).await?;
                        summary.absorbed += 1;
                    } else {
                        self.orphans
                            .record(&OrphanOrder {
                                broker_order_id: broker_order.broker_order_id.clone(),
                                symbol: broker_order.symbol.clone(),
                                status: broker_order.status,
                                filled_qty: broker_order.filled_qty,
                                avg_fill_price: broker_order.avg_fill_price,
                                detected_at: Utc::now(),
                            })
                            .await?;
                        self.quarantine
                            .quarantine(&broker_order.symbol, "orphan broker order with no matching client_order_id")
                            .await?;
                        summary.orphaned += 1;
                    }
                }
            }
        }

        let grace = chrono::Duration::seconds(self.grace_seconds);
        let now = Utc::now();
        for local in &local_orders {
            if seen_ids.contains(&local.client_order_id) {
                continue;
            }
            if now - local.updated_at < grace {
                continue;
            }
            let applied = self
                .orders
                .apply_transition(OrderTransition {
                    client_order_id: local.client_order_id.clone(),
                    new_status: crate::domain::order::OrderStatus::Error,
                    filled_qty: local.filled_qty,
                    avg_fill_price: local.avg_fill_price,
                    broker_order_id: local.broker_order_id.clone(),
                    source: StatusSource::Reconciliation,
                    expected_sequence: local.status_sequence,
                })
                .await?;
            if applied {
                self.reservations.release(&local.symbol, local.signed_remaining()).await.ok();
                warn!(client_order_id = %local.client_order_id, "order aged out past grace window with no broker record");
                summary.aged_out += 1;
            }
        }

        for snapshot in self.broker.get_positions().await? {
            self.positions.upsert(&snapshot).await?;
            summary.positions_reconciled += 1;
        }

        if new_hwm > hwm {
            self.gate.advance_high_water_mark(new_hwm).await?;
        }

        if self.gate.read().await == ReconciliationGate::Closed {
            self.gate.set(ReconciliationGate::Open).await?;
            info!("reconciliation gate opened after first successful cycle");
        }

        Ok(summary)
    }

    /// Absorbs a broker order whose `client_order_id` matches our own
    /// deterministic scheme but has no ledger row — the gateway submitted it
    /// on a prior run and crashed, or restored from a pre-ledger backup,
    /// before the row made it into `orders` (spec §4.5 step 4). Inserted
    /// with `StatusSource::Reconciliation` and no `strategy_id`, since the
    /// broker doesn't echo that back; the insert is idempotent under
    /// `ON CONFLICT DO NOTHING`, so a re-absorb on the next cycle before the
    /// reservation below settles is harmless.
    async fn absorb_order(&self, broker_order: &BrokerOrderState) -> Result<(), AppError> {
        let client_order_id = broker_order
            .client_order_id
            .clone()
            .expect("scheme_match implies client_order_id is Some");

        let order = Order {
            client_order_id: client_order_id.clone(),
            broker_order_id: Some(broker_order.broker_order_id.clone()),
            symbol: broker_order.symbol.clone(),
            side: broker_order.side,
            qty: broker_order.qty,
            order_type: broker_order.order_type,
            limit_price: broker_order.limit_price,
            time_in_force: broker_order.time_in_force.clone(),
            status: broker_order.status,
            filled_qty: broker_order.filled_qty,
            avg_fill_price: broker_order.avg_fill_price,
            strategy_id: None,
            created_at: broker_order.updated_at,
            updated_at: broker_order.updated_at,
            status_source: StatusSource::Reconciliation,
            status_sequence: 0,
            trade_date: broker_order.updated_at.date_naive(),
        };

        self.orders.insert_pending(&order).await?;

        if !broker_order.status.is_terminal() {
            self.reservations.reserve(&order.symbol, order.signed_remaining()).await.ok();
        }

        warn!(
            client_order_id = %client_order_id,
            symbol = %order.symbol,
            "absorbed broker order matching our client_order_id scheme with no local ledger row"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::risk::test_support::InMemoryRiskStore;
    use crate::domain::order::{OrderSide, OrderStatus, OrderType};
    use crate::domain::ports::{BrokerAck, BrokerOrderState, PortResult, RiskStore};
    use crate::domain::position::PositionSnapshot;
    use async_trait::async_trait;
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryOrders {
        rows: Mutex<HashMap<String, Order>>,
    }

    impl InMemoryOrders {
        fn seed(&self, order: Order) {
            self.rows.lock().unwrap().insert(order.client_order_id.clone(), order);
        }
    }

    #[async_trait]
    impl OrderRepository for InMemoryOrders {
        async fn insert_pending(&self, order: &Order) -> PortResult<()> {
            self.rows.lock().unwrap().insert(order.client_order_id.clone(), order.clone());
            Ok(())
        }
        async fn get(&self, client_order_id: &str) -> PortResult<Option<Order>> {
            Ok(self.rows.lock().unwrap().get(client_order_id).cloned())
        }
        async fn list(&self, _filters: crate::domain::ports::OrderFilters) -> PortResult<Vec<Order>> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
        async fn list_non_terminal(&self) -> PortResult<Vec<Order>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|o| !o.status.is_terminal())
                .cloned()
                .collect())
        }
        async fn apply_transition(&self, transition: OrderTransition) -> PortResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(order) = rows.get_mut(&transition.client_order_id) {
                if order.status_sequence != transition.expected_sequence {
                    return Ok(false);
                }
                order.status = transition.new_status;
                order.filled_qty = transition.filled_qty;
                order.avg_fill_price = transition.avg_fill_price;
                if transition.broker_order_id.is_some() {
                    order.broker_order_id = transition.broker_order_id;
                }
                order.status_source = transition.source;
                order.status_sequence += 1;
                order.updated_at = Utc::now();
            }
            Ok(true)
        }
        async fn append_fill(&self, _fill: &crate::domain::fill::Fill) -> PortResult<()> {
            Ok(())
        }
        async fn fills_for_order(&self, _client_order_id: &str) -> PortResult<Vec<crate::domain::fill::Fill>> {
            Ok(Vec::new())
        }
        async fn has_webhook_event(&self, _client_order_id: &str, _broker_event_id: &str) -> PortResult<bool> {
            Ok(false)
        }
        async fn record_webhook_event(&self, _client_order_id: &str, _broker_event_id: &str) -> PortResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct InMemoryPositions {
        rows: Mutex<HashMap<String, PositionSnapshot>>,
    }

    #[async_trait]
    impl PositionRepository for InMemoryPositions {
        async fn get(&self, symbol: &str) -> PortResult<Option<PositionSnapshot>> {
            Ok(self.rows.lock().unwrap().get(symbol).cloned())
        }
        async fn list(&self) -> PortResult<Vec<PositionSnapshot>> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
        async fn upsert(&self, snapshot: &PositionSnapshot) -> PortResult<()> {
            self.rows.lock().unwrap().insert(snapshot.symbol.clone(), snapshot.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct InMemoryOrphans {
        rows: Mutex<Vec<OrphanOrder>>,
    }

    #[async_trait]
    impl OrphanRepository for InMemoryOrphans {
        async fn record(&self, orphan: &OrphanOrder) -> PortResult<()> {
            self.rows.lock().unwrap().push(orphan.clone());
            Ok(())
        }
        async fn list(&self) -> PortResult<Vec<OrphanOrder>> {
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    struct StubBroker {
        orders: Vec<BrokerOrderState>,
        positions: Vec<PositionSnapshot>,
    }

    #[async_trait]
    impl BrokerClient for StubBroker {
        async fn submit_order(&self, _order: &Order) -> PortResult<BrokerAck> {
            unimplemented!()
        }
        async fn cancel_order(&self, _broker_order_id: &str) -> PortResult<()> {
            Ok(())
        }
        async fn get_open_orders(&self) -> PortResult<Vec<BrokerOrderState>> {
            Ok(self.orders.clone())
        }
        async fn get_orders_since(&self, _since: DateTime<Utc>) -> PortResult<Vec<BrokerOrderState>> {
            Ok(self.orders.clone())
        }
        async fn get_positions(&self) -> PortResult<Vec<PositionSnapshot>> {
            Ok(self.positions.clone())
        }
    }

    fn local_order(client_order_id: &str, symbol: &str) -> Order {
        Order {
            client_order_id: client_order_id.to_string(),
            broker_order_id: Some("broker-1".into()),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            qty: 100,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: "day".into(),
            status: OrderStatus::Submitted,
            filled_qty: 0,
            avg_fill_price: Decimal::ZERO,
            strategy_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            status_source: StatusSource::InternalTimer,
            status_sequence: 0,
            trade_date: Utc::now().date_naive(),
        }
    }

    fn broker_order(broker_order_id: &str, client_order_id: Option<&str>, symbol: &str) -> BrokerOrderState {
        BrokerOrderState {
            broker_order_id: broker_order_id.to_string(),
            client_order_id: client_order_id.map(str::to_string),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            qty: 100,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: "day".into(),
            status: OrderStatus::Filled,
            filled_qty: 100,
            avg_fill_price: Decimal::from(150),
            updated_at: Utc::now(),
        }
    }

    fn engine(broker_orders: Vec<BrokerOrderState>, orders_repo: Arc<InMemoryOrders>) -> (ReconciliationEngine, Arc<dyn RiskStore>) {
        let risk_store: Arc<dyn RiskStore> = Arc::new(InMemoryRiskStore::new());
        let gate = ReconciliationGateGuard::new(risk_store.clone());
        let quarantine = QuarantineGuard::new(risk_store.clone());
        let reservations = ReservationLedger::new(risk_store.clone());
        let broker = Arc::new(StubBroker {
            orders: broker_orders,
            positions: Vec::new(),
        });
        let engine = ReconciliationEngine::new(
            orders_repo,
            Arc::new(InMemoryPositions::default()),
            broker,
            Arc::new(InMemoryOrphans::default()),
            gate,
            quarantine,
            reservations,
            300,
            60,
        );
        (engine, risk_store)
    }

    #[tokio::test]
    async fn matching_broker_order_applies_with_reconciliation_source() {
        let orders = Arc::new(InMemoryOrders::default());
        orders.seed(local_order("abc123", "AAPL"));
        let order = broker_order("broker-1", Some("abc123"), "AAPL");
        let (engine, _store) = engine(vec![order], orders.clone());
        let summary = engine.run_cycle().await.unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.orphaned, 0);
        assert_eq!(summary.absorbed, 0);
        let updated = orders.get("abc123").await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Filled);
        assert_eq!(updated.status_source, StatusSource::Reconciliation);
    }

    #[tokio::test]
    async fn a_recently_filled_terminal_local_order_is_still_matched_not_quarantined() {
        // Review fix: `list_non_terminal()` no longer backs the match lookup,
        // since a fill can terminalize the local row between a broker's
        // report and this cycle's read.
        let orders = Arc::new(InMemoryOrders::default());
        let mut order = local_order("xyz789", "AAPL");
        order.status = OrderStatus::Filled;
        order.filled_qty = 100;
        orders.seed(order);
        let broker_order = broker_order("broker-2", Some("xyz789"), "AAPL");
        let (engine, store) = engine(vec![broker_order], orders);
        let summary = engine.run_cycle().await.unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.orphaned, 0);
        let quarantine = QuarantineGuard::new(store);
        assert!(!quarantine.is_quarantined("AAPL").await);
    }

    #[tokio::test]
    async fn unmatched_broker_order_is_recorded_as_an_orphan_and_quarantines_the_symbol() {
        let orders = Arc::new(InMemoryOrders::default());
        let order = broker_order("broker-9", None, "TSLA");
        let (engine, store) = engine(vec![order], orders);
        let summary = engine.run_cycle().await.unwrap();
        assert_eq!(summary.orphaned, 1);
        assert_eq!(summary.absorbed, 0);
        let quarantine = QuarantineGuard::new(store);
        assert!(quarantine.is_quarantined("TSLA").await);
    }

    #[tokio::test]
    async fn broker_order_matching_our_id_scheme_with_no_ledger_row_is_absorbed_not_quarantined() {
        let orders = Arc::new(InMemoryOrders::default());
        let id = crate::domain::client_order_id::compute(
            "NVDA",
            "buy",
            25,
            None,
            Some("momentum_v1"),
            Utc::now().date_naive(),
        );
        let order = broker_order("broker-3", Some(&id), "NVDA");
        let (engine, store) = engine(vec![order], orders.clone());
        let summary = engine.run_cycle().await.unwrap();
        assert_eq!(summary.absorbed, 1);
        assert_eq!(summary.orphaned, 0);

        let absorbed = orders.get(&id).await.unwrap().unwrap();
        assert_eq!(absorbed.symbol, "NVDA");
        assert_eq!(absorbed.status, OrderStatus::Filled);
        assert_eq!(absorbed.status_source, StatusSource::Reconciliation);

        let quarantine = QuarantineGuard::new(store);
        assert!(!quarantine.is_quarantined("NVDA").await);
    }

    #[tokio::test]
    async fn first_successful_cycle_opens_a_closed_gate() {
        let orders = Arc::new(InMemoryOrders::default());
        let (engine, store) = engine(vec![], orders);
        engine.run_cycle().await.unwrap();
        let gate = ReconciliationGateGuard::new(store);
        assert_eq!(gate.read().await, ReconciliationGate::Open);
    }

    #[tokio::test]
    async fn concurrent_cycle_is_skipped_not_errored() {
        let orders = Arc::new(InMemoryOrders::default());
        let (engine, store) = engine(vec![], orders);
        let gate = ReconciliationGateGuard::new(store);
        assert!(gate.try_begin_cycle(60).await.unwrap());
        let summary = engine.run_cycle().await.unwrap();
        assert!(summary.skipped);
    }
}

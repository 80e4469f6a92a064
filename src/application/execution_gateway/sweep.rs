//! TTL sweep (spec §9 Open Question decision: the dry-run aging sweep
//! reuses the reservation TTL timer rather than running a second clock).
//! Ages `dry_run` orders older than the TTL to `canceled` and releases their
//! reservation, so a dry-run ledger that's never polled doesn't hold a
//! symbol's position limit hostage forever.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

use crate::application::risk::ReservationLedger;
use crate::domain::errors::AppError;
use crate::domain::order::{OrderStatus, StatusSource};
use crate::domain::ports::{OrderRepository, OrderTransition};

#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub canceled: u32,
}

pub struct TtlSweeper {
    orders: Arc<dyn OrderRepository>,
    reservations: ReservationLedger,
    ttl_seconds: i64,
}

impl TtlSweeper {
    pub fn new(orders: Arc<dyn OrderRepository>, reservations: ReservationLedger, ttl_seconds: i64) -> Self {
        Self {
            orders,
            reservations,
            ttl_seconds,
        }
    }

    pub async fn sweep(&self) -> Result<SweepSummary, AppError> {
        let mut summary = SweepSummary::default();
        let ttl = Duration::seconds(self.ttl_seconds);
        let now = Utc::now();

        for order in self.orders.list_non_terminal().await? {
            if order.status != OrderStatus::DryRun {
                continue;
            }
            if now - order.created_at < ttl {
                continue;
            }

            let applied = self
                .orders
                .apply_transition(OrderTransition {
                    client_order_id: order.client_order_id.clone(),
                    new_status: OrderStatus::Canceled,
                    filled_qty: order.filled_qty,
                    avg_fill_price: order.avg_fill_price,
                    broker_order_id: order.broker_order_id.clone(),
                    source: StatusSource::InternalTimer,
                    expected_sequence: order.status_sequence,
                })
                .await?;

            if applied {
                self.reservations
                    .release(&order.symbol, order.signed_remaining())
                    .await
                    .ok();
                info!(client_order_id = %order.client_order_id, "dry-run order aged out past TTL");
                summary.canceled += 1;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::risk::test_support::InMemoryRiskStore;
    use crate::domain::fill::Fill;
    use crate::domain::order::{Order, OrderFilters, OrderSide, OrderType};
    use crate::domain::ports::{PortResult, RiskStore};
    use async_trait::async_trait;
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
        async fn list(&self, _filters: OrderFilters) -> PortResult<Vec<Order>> {
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
                order.status = transition.new_status;
                order.status_sequence += 1;
            }
            Ok(true)
        }
        async fn append_fill(&self, _fill: &Fill) -> PortResult<()> {
            Ok(())
        }
        async fn fills_for_order(&self, _client_order_id: &str) -> PortResult<Vec<Fill>> {
            Ok(Vec::new())
        }
        async fn has_webhook_event(&self, _client_order_id: &str, _broker_event_id: &str) -> PortResult<bool> {
            Ok(false)
        }
        async fn record_webhook_event(&self, _client_order_id: &str, _broker_event_id: &str) -> PortResult<()> {
            Ok(())
        }
    }

    fn stale_dry_run_order() -> Order {
        Order {
            client_order_id: "stale-1".into(),
            broker_order_id: None,
            symbol: "AAPL".into(),
            side: OrderSide::Buy,
            qty: 10,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: "day".into(),
            status: OrderStatus::DryRun,
            filled_qty: 0,
            avg_fill_price: Decimal::ZERO,
            strategy_id: None,
            created_at: Utc::now() - Duration::seconds(1000),
            updated_at: Utc::now() - Duration::seconds(1000),
            status_source: StatusSource::InternalTimer,
            status_sequence: 0,
            trade_date: Utc::now().date_naive(),
        }
    }

    #[tokio::test]
    async fn ages_a_dry_run_order_past_ttl_to_canceled() {
        let orders = Arc::new(InMemoryOrders::default());
        orders.seed(stale_dry_run_order());
        let risk_store: Arc<dyn RiskStore> = Arc::new(InMemoryRiskStore::new());
        let reservations = ReservationLedger::new(risk_store);
        reservations.reserve("AAPL", 10).await.unwrap();

        let sweeper = TtlSweeper::new(orders.clone(), reservations, 900);
        let summary = sweeper.sweep().await.unwrap();
        assert_eq!(summary.canceled, 1);
        assert_eq!(orders.get("stale-1").await.unwrap().unwrap().status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn leaves_a_fresh_dry_run_order_untouched() {
        let orders = Arc::new(InMemoryOrders::default());
        let mut fresh = stale_dry_run_order();
        fresh.created_at = Utc::now();
        fresh.client_order_id = "fresh-1".into();
        orders.seed(fresh);
        let risk_store: Arc<dyn RiskStore> = Arc::new(InMemoryRiskStore::new());
        let reservations = ReservationLedger::new(risk_store);

        let sweeper = TtlSweeper::new(orders.clone(), reservations, 900);
        let summary = sweeper.sweep().await.unwrap();
        assert_eq!(summary.canceled, 0);
    }
}

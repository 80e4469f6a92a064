//! The Execution Gateway's order submission path (spec §4.2): the seven-step
//! pre-trade pipeline — idempotency, kill switch, circuit breaker and
//! reconciliation gate, reduce-only enforcement, position limit, fat-finger
//! band, then reservation and broker submission (or dry-run synthesis).
//! Grounded on `application::trading::executor`'s submit-then-persist
//! sequencing, rebuilt against the externalized `risk_kv` guards instead of
//! an in-process risk manager.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::risk::{read_snapshot, CircuitBreaker, KillSwitchGuard, QuarantineGuard, ReconciliationGateGuard, ReservationLedger};
use crate::config::RiskEnvConfig;
use crate::domain::client_order_id;
use crate::domain::errors::AppError;
use crate::domain::order::{Order, OrderRequest, OrderSide, OrderStatus, StatusSource};
use crate::domain::ports::{BrokerClient, OrderFilters, OrderRepository, OrderTransition, PositionRepository, RiskStore};
use crate::domain::risk_state::{CircuitBreakerState, KillSwitch, ReconciliationGate};

use super::gates;
use super::twap::{build_slices, TwapPlan};

pub struct ExecutionGatewayService {
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    broker: Arc<dyn BrokerClient>,
    risk_store: Arc<dyn RiskStore>,
    kill_switch: KillSwitchGuard,
    breaker: CircuitBreaker,
    reconciliation: ReconciliationGateGuard,
    quarantine: QuarantineGuard,
    reservations: ReservationLedger,
    risk_config: RiskEnvConfig,
    dry_run: bool,
}

impl ExecutionGatewayService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        positions: Arc<dyn PositionRepository>,
        broker: Arc<dyn BrokerClient>,
        risk_store: Arc<dyn RiskStore>,
        kill_switch: KillSwitchGuard,
        breaker: CircuitBreaker,
        reconciliation: ReconciliationGateGuard,
        quarantine: QuarantineGuard,
        reservations: ReservationLedger,
        risk_config: RiskEnvConfig,
        dry_run: bool,
    ) -> Self {
        Self {
            orders,
            positions,
            broker,
            risk_store,
            kill_switch,
            breaker,
            reconciliation,
            quarantine,
            reservations,
            risk_config,
            dry_run,
        }
    }

    pub async fn get_order(&self, client_order_id: &str) -> Result<Option<Order>, AppError> {
        self.orders.get(client_order_id).await
    }

    pub async fn list_orders(&self, filters: OrderFilters) -> Result<Vec<Order>, AppError> {
        self.orders.list(filters).await
    }

    /// Submits a TWAP plan as its constituent slices, continuing past a
    /// rejected slice so a single bad child doesn't block the rest of the
    /// schedule (spec §4.2's slicing note).
    pub async fn submit_plan(&self, plan: TwapPlan) -> Vec<(String, Result<Order, AppError>)> {
        let mut results = Vec::new();
        for (client_order_id, request) in build_slices(&plan) {
            let result = self.submit_order(request).await;
            results.push((client_order_id, result));
        }
        results
    }

    /// The seven-step pre-trade pipeline (spec §4.2):
    /// 1. compute the deterministic `client_order_id` and short-circuit if
    ///    it's already on the ledger (idempotent retry);
    /// 2. request shape validation;
    /// 3. quarantine (reduce-only override);
    /// 4. kill switch / circuit breaker / reconciliation gate;
    /// 5. reduce-only enforcement under a `reduce_only` gate;
    /// 6. position limit;
    /// 7. fat-finger band, then reserve and submit.
    pub async fn submit_order(&self, request: OrderRequest) -> Result<Order, AppError> {
        gates::validate_request(&request)?;

        let trade_date = Utc::now().date_naive();
        let client_order_id = client_order_id::compute(
            &request.symbol,
            &request.side.to_string(),
            request.qty,
            request.limit_price,
            request.strategy_id.as_deref(),
            trade_date,
        );

        if let Some(existing) = self.orders.get(&client_order_id).await? {
            return Ok(existing);
        }

        let current_position = self
            .positions
            .get(&request.symbol)
            .await?
            .map(|p| p.qty)
            .unwrap_or(0);

        if self.quarantine.is_quarantined(&request.symbol).await {
            gates::reduce_only_check(current_position, request.side, request.qty)
                .map_err(|_| AppError::Quarantine(request.symbol.clone()))?;
        }

        let snapshot = read_snapshot(&self.risk_store, &self.breaker, &self.kill_switch, &self.reconciliation).await;
        if !snapshot.submission_allowed() {
            return Err(fail_closed_reason(&snapshot));
        }

        if snapshot.reconciliation_gate == ReconciliationGate::ReduceOnly {
            gates::reduce_only_check(current_position, request.side, request.qty)?;
        }

        let signed_qty = match request.side {
            OrderSide::Buy => request.qty,
            OrderSide::Sell => -request.qty,
        };
        let reserved = self.reservations.current(&request.symbol).await?;
        let limit = self.risk_config.position_limit(&request.symbol);
        gates::position_limit_check(current_position, reserved + signed_qty, limit)?;

        let warned = gates::fat_finger_check(
            request.qty,
            request.limit_price,
            self.risk_config.fat_finger_warn_notional,
            self.risk_config.fat_finger_reject_notional,
            self.risk_config.fat_finger_reject_qty,
        )?;
        if warned {
            warn!(symbol = %request.symbol, qty = request.qty, "fat-finger warn band");
        }

        self.reservations.reserve(&request.symbol, signed_qty).await?;

        let now = Utc::now();
        let mut order = Order {
            client_order_id: client_order_id.clone(),
            broker_order_id: None,
            symbol: request.symbol.clone(),
            side: request.side,
            qty: request.qty,
            order_type: request.order_type,
            limit_price: request.limit_price,
            time_in_force: request.time_in_force.clone().unwrap_or_else(|| "day".to_string()),
            status: OrderStatus::Pending,
            filled_qty: 0,
            avg_fill_price: Decimal::ZERO,
            strategy_id: request.strategy_id.clone(),
            created_at: now,
            updated_at: now,
            status_source: StatusSource::InternalTimer,
            status_sequence: 0,
            trade_date,
        };
        self.orders.insert_pending(&order).await?;

        if self.dry_run {
            order.status = OrderStatus::DryRun;
            self.orders
                .apply_transition(OrderTransition {
                    client_order_id,
                    new_status: OrderStatus::DryRun,
                    filled_qty: 0,
                    avg_fill_price: Decimal::ZERO,
                    broker_order_id: None,
                    source: StatusSource::InternalTimer,
                    expected_sequence: 0,
                })
                .await?;
            info!(symbol = %order.symbol, qty = order.qty, "order synthesized as dry-run");
            return Ok(order);
        }

        match self.broker.submit_order(&order).await {
            Ok(ack) => {
                order.status = ack.status;
                order.broker_order_id = Some(ack.broker_order_id.clone());
                self.orders
                    .apply_transition(OrderTransition {
                        client_order_id,
                        new_status: ack.status,
                        filled_qty: 0,
                        avg_fill_price: Decimal::ZERO,
                        broker_order_id: Some(ack.broker_order_id),
                        source: StatusSource::InternalTimer,
                        expected_sequence: 0,
                    })
                    .await?;
                Ok(order)
            }
            Err(AppError::PermanentBroker(message)) => {
                self.reservations.release(&request.symbol, signed_qty).await.ok();
                self.orders
                    .apply_transition(OrderTransition {
                        client_order_id,
                        new_status: OrderStatus::Rejected,
                        filled_qty: 0,
                        avg_fill_price: Decimal::ZERO,
                        broker_order_id: None,
                        source: StatusSource::InternalTimer,
                        expected_sequence: 0,
                    })
                    .await?;
                Err(AppError::PermanentBroker(message))
            }
            Err(other) => {
                // Transient broker failure: the order stays `pending` with its
                // reservation intact. Reconciliation will reclaim it as an
                // orphan or a terminal state on the next broker truth pull.
                warn!(client_order_id = %order.client_order_id, error = %other, "broker submission failed transiently, order left pending");
                Err(other)
            }
        }
    }
}

fn fail_closed_reason(snapshot: &crate::domain::risk_state::RiskSnapshot) -> AppError {
    if snapshot.kill_switch == KillSwitch::Engaged {
        return AppError::FailClosed("kill switch engaged".into());
    }
    if snapshot.circuit_breaker != CircuitBreakerState::Open {
        return AppError::FailClosed(format!("circuit breaker is {:?}", snapshot.circuit_breaker));
    }
    AppError::FailClosed("reconciliation gate is closed".into())
}

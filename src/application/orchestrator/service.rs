//! The Orchestrator's run loop (spec §4.3): pulls ranked signals from the
//! Signal Service, sizes and submits one order per non-skipped signal
//! through the Execution Gateway, and persists the run record before
//! returning. Grounded on `application::trading::system`'s run-loop shape,
//! rebuilt as a single bounded batch rather than a continuously polling
//! scheduler, since spec §4.3 treats a run as one request/response cycle.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::application::risk::QuarantineGuard;
use crate::domain::errors::AppError;
use crate::domain::order::{OrderRequest, OrderType};
use crate::domain::orchestration::{OrchestrationRun, OrderMapping, RunStatus};
use crate::domain::ports::{self, GatewayClient, MarketDataPort, OrchestrationRunRepository, SignalClient};

use super::sizing::{size_signal, Sized};

pub struct OrchestratorService {
    signals: Arc<dyn SignalClient>,
    gateway: Arc<dyn GatewayClient>,
    market_data: Arc<dyn MarketDataPort>,
    quarantine: QuarantineGuard,
    runs: Arc<dyn OrchestrationRunRepository>,
    top_n: usize,
    bottom_n: usize,
    strategy_id: String,
}

impl OrchestratorService {
    pub fn new(
        signals: Arc<dyn SignalClient>,
        gateway: Arc<dyn GatewayClient>,
        market_data: Arc<dyn MarketDataPort>,
        quarantine: QuarantineGuard,
        runs: Arc<dyn OrchestrationRunRepository>,
        top_n: usize,
        bottom_n: usize,
        strategy_id: String,
    ) -> Self {
        Self {
            signals,
            gateway,
            market_data,
            quarantine,
            runs,
            top_n,
            bottom_n,
            strategy_id,
        }
    }

    /// Runs one batch: `capital` and `max_notional_per_symbol` come in per
    /// request (spec §6's `POST /api/v1/orchestration/run` body), not from
    /// static configuration, so the same deployed service can be driven at
    /// different allocation sizes run to run.
    pub async fn run(
        &self,
        symbols: &[String],
        capital: Decimal,
        max_notional_per_symbol: Decimal,
    ) -> Result<OrchestrationRun, AppError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();

        let signals = self.signals.generate_signals(symbols, self.top_n, self.bottom_n).await?;
        let num_signals = signals.len();

        let mut mappings = Vec::with_capacity(num_signals);
        let mut num_orders_submitted = 0usize;
        let mut num_orders_accepted = 0usize;
        let mut num_orders_rejected = 0usize;

        for signal in &signals {
            let quarantined = self.quarantine.is_quarantined(&signal.symbol).await;
            let price = self.market_data.get_price(&signal.symbol).await.unwrap_or(None);

            let sized = match size_signal(
                signal.target_weight,
                capital,
                max_notional_per_symbol,
                price,
                quarantined,
            ) {
                Ok(sized) => sized,
                Err(reason) => {
                    mappings.push(OrderMapping {
                        symbol: signal.symbol.clone(),
                        order_qty: 0,
                        order_price: price,
                        client_order_id: None,
                        skip_reason: Some(reason.as_str().to_string()),
                    });
                    continue;
                }
            };

            num_orders_submitted += 1;
            match self.submit(&signal.symbol, sized).await {
                Ok(client_order_id) => {
                    num_orders_accepted += 1;
                    mappings.push(OrderMapping {
                        symbol: signal.symbol.clone(),
                        order_qty: sized.qty,
                        order_price: Some(sized.price),
                        client_order_id: Some(client_order_id),
                        skip_reason: None,
                    });
                }
                Err(err) => {
                    num_orders_rejected += 1;
                    warn!(symbol = %signal.symbol, %err, "order submission rejected by execution gateway");
                    mappings.push(OrderMapping {
                        symbol: signal.symbol.clone(),
                        order_qty: sized.qty,
                        order_price: Some(sized.price),
                        client_order_id: None,
                        skip_reason: Some(err.code().to_string()),
                    });
                }
            }
        }

        let duration_seconds = clock.elapsed().as_secs_f64();
        let status = if num_orders_rejected == 0 {
            RunStatus::Completed
        } else if num_orders_accepted > 0 {
            RunStatus::Partial
        } else if num_orders_submitted > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        let run = OrchestrationRun {
            run_id: run_id.clone(),
            status,
            num_signals,
            num_orders_submitted,
            num_orders_accepted,
            num_orders_rejected,
            mappings,
            started_at,
            duration_seconds,
        };

        self.persist(&run).await?;
        Ok(run)
    }

    async fn submit(&self, symbol: &str, sized: Sized) -> Result<String, AppError> {
        let request = OrderRequest {
            symbol: symbol.to_string(),
            side: sized.side,
            qty: sized.qty,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: None,
            strategy_id: Some(self.strategy_id.clone()),
        };
        let outcome = self.gateway.submit_order(&request).await?;
        Ok(outcome.client_order_id)
    }

    async fn persist(&self, run: &OrchestrationRun) -> Result<(), AppError> {
        let status = match run.status {
            RunStatus::Completed => "completed",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        };
        let mappings = serde_json::to_string(&run.mappings).map_err(|e| AppError::Internal(e.to_string()))?;
        self.runs
            .insert(&ports::OrchestrationRun {
                run_id: run.run_id.clone(),
                status: status.to_string(),
                num_signals: run.num_signals as i64,
                num_orders_submitted: run.num_orders_submitted as i64,
                num_orders_accepted: run.num_orders_accepted as i64,
                num_orders_rejected: run.num_orders_rejected as i64,
                mappings,
                started_at: run.started_at,
                duration_seconds: run.duration_seconds,
            })
            .await
    }
}

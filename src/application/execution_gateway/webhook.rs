//! Broker webhook ingestion (spec §4.2, §6 `POST /api/v1/webhooks/broker`):
//! HMAC-SHA256 signature verification, delivery idempotency, and the CAS
//! status transition with `StatusSource::Webhook` — the highest-priority
//! writer in the status-source priority table. Grounded on
//! `infrastructure::binance::execution`'s request-signing helper, reused
//! here to verify rather than produce a signature.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::risk::ReservationLedger;
use crate::domain::errors::AppError;
use crate::domain::fill::{weighted_avg_price, Fill};
use crate::domain::order::{OrderStatus, StatusSource};
use crate::domain::ports::{OrderRepository, OrderTransition, PositionRepository};
use crate::domain::position::PositionSnapshot;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event_id: String,
    pub client_order_id: String,
    pub broker_order_id: String,
    pub status: OrderStatus,
    pub fill_qty: i64,
    pub fill_price: Option<Decimal>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Verifies `signature` (hex-encoded HMAC-SHA256 over the raw request body)
/// against `secret`. A broker with no configured secret can't be verified,
/// which the caller treats as a startup-time configuration error, not a
/// per-request bypass (spec §9's webhook secret gating REDESIGN FLAG).
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub struct WebhookHandler {
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    reservations: ReservationLedger,
}

impl WebhookHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        positions: Arc<dyn PositionRepository>,
        reservations: ReservationLedger,
    ) -> Self {
        Self {
            orders,
            positions,
            reservations,
        }
    }

    /// Applies a verified webhook delivery. Idempotent: a delivery already
    /// recorded under `event_id` is a no-op, since brokers redeliver on
    /// timeout without any guarantee of exactly-once.
    pub async fn apply(&self, payload: WebhookPayload) -> Result<(), AppError> {
        if self
            .orders
            .has_webhook_event(&payload.client_order_id, &payload.event_id)
            .await?
        {
            info!(event_id = %payload.event_id, "duplicate webhook delivery, ignored");
            return Ok(());
        }

        let Some(order) = self.orders.get(&payload.client_order_id).await? else {
            warn!(client_order_id = %payload.client_order_id, "webhook for unknown order");
            return Err(AppError::NotFound(payload.client_order_id));
        };

        if order.status.is_terminal() {
            self.orders
                .record_webhook_event(&payload.client_order_id, &payload.event_id)
                .await?;
            return Ok(());
        }

        // `filled_qty` only advances in lockstep with an appended `Fill` row
        // below, both gated on `fill_price` being present — a fill without a
        // price can't be recorded as a `Fill` (which always carries one), so
        // it can't advance `filled_qty` either, or `sum(fills.qty) ==
        // filled_qty` breaks.
        let (new_filled_qty, avg_fill_price) = match payload.fill_price {
            Some(price) if payload.fill_qty > 0 => (
                order.filled_qty + payload.fill_qty,
                weighted_avg_price(order.filled_qty, order.avg_fill_price, payload.fill_qty, price),
            ),
            _ => (order.filled_qty, order.avg_fill_price),
        };

        let applied = self
            .orders
            .apply_transition(OrderTransition {
                client_order_id: payload.client_order_id.clone(),
                new_status: payload.status,
                filled_qty: new_filled_qty,
                avg_fill_price,
                broker_order_id: Some(payload.broker_order_id.clone()),
                source: StatusSource::Webhook,
                expected_sequence: order.status_sequence,
            })
            .await?;

        if !applied {
            warn!(client_order_id = %payload.client_order_id, "webhook transition lost the CAS race");
        } else {
            if payload.fill_qty > 0 {
                if let Some(price) = payload.fill_price {
                    self.orders
                        .append_fill(&Fill {
                            fill_id: payload.event_id.clone(),
                            client_order_id: payload.client_order_id.clone(),
                            qty: payload.fill_qty,
                            price,
                            timestamp: payload.timestamp,
                        })
                        .await?;
                }
                self.reflect_position(&order.symbol, &order.side, payload.fill_qty).await?;
            }

            if payload.status.is_terminal() {
                let remaining = crate::domain::order::Order {
                    filled_qty: new_filled_qty,
                    ..order.clone()
                }
                .signed_remaining();
                self.reservations.release(&order.symbol, remaining).await.ok();
            }
        }

        self.orders
            .record_webhook_event(&payload.client_order_id, &payload.event_id)
            .await?;
        Ok(())
    }

    async fn reflect_position(
        &self,
        symbol: &str,
        side: &crate::domain::order::OrderSide,
        fill_qty: i64,
    ) -> Result<(), AppError> {
        let signed = match side {
            crate::domain::order::OrderSide::Buy => fill_qty,
            crate::domain::order::OrderSide::Sell => -fill_qty,
        };
        let mut snapshot = self
            .positions
            .get(symbol)
            .await?
            .unwrap_or_else(|| PositionSnapshot::flat(symbol));
        snapshot.qty += signed;
        snapshot.last_reconciled_at = chrono::Utc::now();
        self.positions.upsert(&snapshot).await
    }
}

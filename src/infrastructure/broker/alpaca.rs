//! Alpaca broker adapter: the only broker the control plane submits to
//! (spec §6). Grounded on `infrastructure::alpaca::execution`'s REST client
//! shape (API-key headers, JSON order request/response DTOs, 404-as-
//! already-closed cancel semantics) and
//! `infrastructure::core::http_client_factory` for the retry-middleware
//! client construction, generalized from the teacher's fire-and-forget
//! `execute()` into the ack-returning `BrokerClient` the pre-trade gate
//! pipeline needs to persist `broker_order_id` and initial status.

use crate::domain::errors::AppError;
use crate::domain::order::{Order, OrderSide, OrderStatus, OrderType};
use crate::domain::ports::{BrokerAck, BrokerClient, BrokerOrderState, PortResult};
use crate::domain::position::PositionSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub struct AlpacaBroker {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl AlpacaBroker {
    pub fn new(api_key: String, api_secret: String, base_url: String) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let inner = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            api_key,
            api_secret,
            base_url,
        }
    }

    fn auth(&self, req: reqwest_middleware::RequestBuilder) -> reqwest_middleware::RequestBuilder {
        req.header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }
}

#[derive(Debug, Serialize)]
struct AlpacaOrderRequest {
    symbol: String,
    qty: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    time_in_force: String,
    client_order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaOrderResponse {
    id: String,
    symbol: String,
    side: String,
    qty: String,
    #[serde(rename = "type")]
    order_type: String,
    time_in_force: String,
    #[serde(default)]
    limit_price: Option<String>,
    status: String,
    #[serde(default)]
    filled_qty: Option<String>,
    #[serde(default)]
    filled_avg_price: Option<String>,
    #[serde(default)]
    client_order_id: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

fn map_alpaca_status(raw: &str) -> OrderStatus {
    match raw {
        "filled" => OrderStatus::Filled,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "canceled" | "expired" | "stopped" => OrderStatus::Canceled,
        "rejected" | "suspended" => OrderStatus::Rejected,
        "new" | "accepted" | "pending_new" | "accepted_for_bidding" | "calculated" => {
            OrderStatus::Submitted
        }
        _ => OrderStatus::Submitted,
    }
}

fn transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status.as_u16() == 429
}

impl From<AlpacaOrderResponse> for BrokerAck {
    fn from(resp: AlpacaOrderResponse) -> Self {
        BrokerAck {
            broker_order_id: resp.id,
            status: map_alpaca_status(&resp.status),
        }
    }
}

#[async_trait]
impl BrokerClient for AlpacaBroker {
    async fn submit_order(&self, order: &Order) -> PortResult<BrokerAck> {
        let side = match order.side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let order_type = match order.order_type {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        };

        let body = AlpacaOrderRequest {
            symbol: order.symbol.clone(),
            qty: order.qty.to_string(),
            side: side.to_string(),
            order_type: order_type.to_string(),
            time_in_force: order.time_in_force.clone(),
            client_order_id: order.client_order_id.clone(),
            limit_price: order.limit_price.map(|p| p.to_string()),
        };

        let url = format!("{}/v2/orders", self.base_url);
        let response = self
            .auth(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let parsed: AlpacaOrderResponse = response
                .json()
                .await
                .map_err(|e| AppError::PermanentBroker(format!("unparseable order response: {e}")))?;
            info!(client_order_id = %order.client_order_id, broker_order_id = %parsed.id, "order submitted to alpaca");
            Ok(parsed.into())
        } else if transient_status(status) {
            let text = response.text().await.unwrap_or_default();
            Err(AppError::TransientBroker(format!("alpaca {status}: {text}")))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(AppError::PermanentBroker(format!("alpaca {status}: {text}")))
        }
    }

    async fn cancel_order(&self, broker_order_id: &str) -> PortResult<()> {
        let url = format!("{}/v2/orders/{}", self.base_url, broker_order_id);
        let response = self
            .auth(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        if response.status().is_success() || response.status().as_u16() == 404 {
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(AppError::PermanentBroker(format!("alpaca cancel {status}: {text}")))
        }
    }

    async fn get_open_orders(&self) -> PortResult<Vec<BrokerOrderState>> {
        let url = format!("{}/v2/orders?status=open", self.base_url);
        self.fetch_orders(&url).await
    }

    async fn get_orders_since(&self, since: DateTime<Utc>) -> PortResult<Vec<BrokerOrderState>> {
        let url = format!(
            "{}/v2/orders?status=all&after={}",
            self.base_url,
            since.to_rfc3339()
        );
        self.fetch_orders(&url).await
    }

    async fn get_positions(&self) -> PortResult<Vec<PositionSnapshot>> {
        let url = format!("{}/v2/positions", self.base_url);
        let response = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::TransientBroker(format!("alpaca positions {status}: {text}")));
        }

        #[derive(Deserialize)]
        struct AlpacaPosition {
            symbol: String,
            qty: String,
            avg_entry_price: String,
        }

        let positions: Vec<AlpacaPosition> = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("unparseable positions response: {e}")))?;

        positions
            .into_iter()
            .map(|p| {
                Ok(PositionSnapshot {
                    symbol: p.symbol,
                    qty: p.qty.parse().map_err(|e| AppError::Internal(format!("bad qty: {e}")))?,
                    avg_entry_price: Decimal::from_str(&p.avg_entry_price)
                        .map_err(|e| AppError::Internal(e.to_string()))?,
                    last_reconciled_at: Utc::now(),
                })
            })
            .collect()
    }
}

impl AlpacaBroker {
    async fn fetch_orders(&self, url: &str) -> PortResult<Vec<BrokerOrderState>> {
        let response = self
            .auth(self.client.get(url))
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::TransientBroker(format!("alpaca orders {status}: {text}")));
        }

        let orders: Vec<AlpacaOrderResponse> = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("unparseable orders response: {e}")))?;

        orders
            .into_iter()
            .map(|o| {
                let filled_qty = o
                    .filled_qty
                    .as_deref()
                    .unwrap_or("0")
                    .parse()
                    .unwrap_or(0);
                let avg_fill_price = o
                    .filled_avg_price
                    .as_deref()
                    .map(Decimal::from_str)
                    .transpose()
                    .map_err(|e| AppError::Internal(e.to_string()))?
                    .unwrap_or(Decimal::ZERO);
                let updated_at = o
                    .updated_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                let side = OrderSide::from_str(&o.side).map_err(AppError::Internal)?;
                let order_type = OrderType::from_str(&o.order_type).map_err(AppError::Internal)?;
                let qty = o.qty.parse().map_err(|e| AppError::Internal(format!("bad qty: {e}")))?;
                let limit_price = o
                    .limit_price
                    .as_deref()
                    .map(Decimal::from_str)
                    .transpose()
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                let client_order_id = o.client_order_id.filter(|id| !id.is_empty());

                Ok(BrokerOrderState {
                    broker_order_id: o.id,
                    client_order_id,
                    symbol: o.symbol,
                    side,
                    qty,
                    order_type,
                    limit_price,
                    time_in_force: o.time_in_force,
                    status: map_alpaca_status(&o.status),
                    filled_qty,
                    avg_fill_price,
                    updated_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpaca_status_maps_to_order_status() {
        assert_eq!(map_alpaca_status("filled"), OrderStatus::Filled);
        assert_eq!(map_alpaca_status("partially_filled"), OrderStatus::PartiallyFilled);
        assert_eq!(map_alpaca_status("canceled"), OrderStatus::Canceled);
        assert_eq!(map_alpaca_status("rejected"), OrderStatus::Rejected);
        assert_eq!(map_alpaca_status("new"), OrderStatus::Submitted);
    }

    #[test]
    fn server_errors_and_429_are_transient() {
        assert!(transient_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(transient_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!transient_status(reqwest::StatusCode::BAD_REQUEST));
    }
}

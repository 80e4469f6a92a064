//! HTTP-backed `GatewayClient` (spec §2's service boundary): the
//! Orchestrator's view of the Execution Gateway across the process
//! boundary. Grounded on `infrastructure::broker::alpaca::AlpacaBroker`'s
//! retry-middleware client construction, pointed at an internal service
//! instead of a broker.

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::errors::AppError;
use crate::domain::order::{OrderRequest, OrderStatus};
use crate::domain::ports::{GatewayClient, GatewaySubmitOutcome, PortResult};

pub struct HttpGatewayClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl HttpGatewayClient {
    pub fn new(base_url: String, request_deadline: Duration) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let inner = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(request_deadline)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self { client, base_url }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    client_order_id: String,
    status: OrderStatus,
    broker_order_id: Option<String>,
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn submit_order(&self, request: &OrderRequest) -> PortResult<GatewaySubmitOutcome> {
        let url = format!("{}/api/v1/orders", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let parsed: SubmitResponse = response
                .json()
                .await
                .map_err(|e| AppError::Internal(format!("unparseable gateway response: {e}")))?;
            Ok(GatewaySubmitOutcome {
                client_order_id: parsed.client_order_id,
                status: parsed.status,
                broker_order_id: parsed.broker_order_id,
            })
        } else if status.is_server_error() || status.as_u16() == 429 {
            let text = response.text().await.unwrap_or_default();
            Err(AppError::TransientBroker(format!("gateway {status}: {text}")))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(AppError::risk_violation("gateway_rejected", format!("gateway {status}: {text}")))
        }
    }
}

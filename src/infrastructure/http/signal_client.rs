//! HTTP-backed `SignalClient`: the Orchestrator's view of the Signal
//! Service across the process boundary. Mirrors `HttpGatewayClient`'s
//! retry-middleware construction.

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;
use std::time::Duration;

use crate::domain::errors::AppError;
use crate::domain::ports::{PortResult, SignalClient};
use crate::domain::signal::Signal;

pub struct HttpSignalClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl HttpSignalClient {
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

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    symbols: &'a [String],
    top_n: usize,
    bottom_n: usize,
}

#[async_trait]
impl SignalClient for HttpSignalClient {
    async fn generate_signals(&self, symbols: &[String], top_n: usize, bottom_n: usize) -> PortResult<Vec<Signal>> {
        let url = format!("{}/api/v1/signals/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest { symbols, top_n, bottom_n })
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| AppError::Internal(format!("unparseable signal service response: {e}")))
        } else if status.is_server_error() || status.as_u16() == 429 {
            let text = response.text().await.unwrap_or_default();
            Err(AppError::TransientBroker(format!("signal service {status}: {text}")))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(AppError::FailClosed(format!("signal service {status}: {text}")))
        }
    }
}

//! Alpaca market data adapter: latest price and recent bar history.
//!
//! Grounded on `infrastructure::alpaca::market_data`'s REST bar-fetching
//! shape (`AlpacaBar` DTO with `t/o/h/l/c/v` serde renames, chunked multi-
//! symbol queries) but trimmed to the single-symbol REST calls the Signal
//! Service's feature pipeline and the Orchestrator's sizing rule need —
//! the teacher's WebSocket streaming, candle repository and spread cache
//! are out of scope here; nothing in this control plane consumes a live
//! tick stream.

use crate::domain::errors::AppError;
use crate::domain::ports::{MarketDataPort, PortResult, PriceBar};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::time::Duration;

pub struct AlpacaMarketData {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    data_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
struct AlpacaBar {
    #[serde(rename = "t")]
    timestamp: String,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Vec<AlpacaBar>,
}

#[derive(Debug, Deserialize)]
struct LatestTradeResponse {
    trade: LatestTrade,
}

#[derive(Debug, Deserialize)]
struct LatestTrade {
    p: f64,
}

#[derive(Debug, Deserialize)]
struct LatestQuoteResponse {
    quote: LatestQuote,
}

#[derive(Debug, Deserialize)]
struct LatestQuote {
    bp: f64,
    ap: f64,
}

impl AlpacaMarketData {
    pub fn new(api_key: String, api_secret: String, data_base_url: String) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            api_key,
            api_secret,
            data_base_url,
        }
    }

    fn auth(&self, req: reqwest_middleware::RequestBuilder) -> reqwest_middleware::RequestBuilder {
        req.header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    async fn latest_quote(&self, symbol: &str) -> PortResult<Option<(Decimal, Decimal)>> {
        let url = format!("{}/v2/stocks/{}/quotes/latest", self.data_base_url, symbol);
        let response = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let parsed: LatestQuoteResponse = match response.json().await {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };

        let bid = Decimal::from_f64(parsed.quote.bp);
        let ask = Decimal::from_f64(parsed.quote.ap);
        Ok(bid.zip(ask))
    }
}

#[async_trait]
impl MarketDataPort for AlpacaMarketData {
    async fn get_price(&self, symbol: &str) -> PortResult<Option<Decimal>> {
        let url = format!("{}/v2/stocks/{}/trades/latest", self.data_base_url, symbol);
        let response = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::TransientBroker(format!(
                "alpaca latest trade {status}: {text}"
            )));
        }

        let parsed: LatestTradeResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("unparseable trade response: {e}")))?;

        Ok(Decimal::from_f64(parsed.trade.p))
    }

    async fn get_recent_bars(&self, symbol: &str, lookback: usize) -> PortResult<Vec<PriceBar>> {
        let url = format!("{}/v2/stocks/{}/bars", self.data_base_url, symbol);
        let response = self
            .auth(
                self.client
                    .get(&url)
                    .query(&[("timeframe", "1Day"), ("limit", &lookback.to_string())]),
            )
            .send()
            .await
            .map_err(|e| AppError::TransientBroker(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::TransientBroker(format!(
                "alpaca bars {status}: {text}"
            )));
        }

        let parsed: BarsResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("unparseable bars response: {e}")))?;

        let (bid, ask) = self.latest_quote(symbol).await.unwrap_or(None).map_or((None, None), |(b, a)| (Some(b), Some(a)));

        let bars = parsed
            .bars
            .into_iter()
            .map(|b| {
                let timestamp = DateTime::parse_from_rfc3339(&b.timestamp)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap());
                PriceBar {
                    timestamp,
                    open: Decimal::from_f64(b.open).unwrap_or(Decimal::ZERO),
                    high: Decimal::from_f64(b.high).unwrap_or(Decimal::ZERO),
                    low: Decimal::from_f64(b.low).unwrap_or(Decimal::ZERO),
                    close: Decimal::from_f64(b.close).unwrap_or(Decimal::ZERO),
                    volume: Decimal::from_f64(b.volume).unwrap_or(Decimal::ZERO),
                    bid,
                    ask,
                }
            })
            .collect();

        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_timestamp_parses_rfc3339() {
        let ts = "2024-01-15T09:30:00Z";
        let parsed = DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc);
        assert_eq!(parsed.timestamp(), 1705311000);
    }
}

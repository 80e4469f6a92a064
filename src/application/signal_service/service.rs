//! Signal generation service: the `generate` entry point spec §4.1's
//! feature-parity pipeline feeds into. Pulls bar history per symbol,
//! computes features, asks the model registry for a prediction, and
//! converts the resulting per-symbol returns into ranked/weighted signals
//! via `domain::signal::rank_and_weight`.

use crate::application::signal_service::feature_pipeline::compute_features;
use crate::application::signal_service::model_registry::ModelRegistry;
use crate::domain::errors::AppError;
use crate::domain::ports::MarketDataPort;
use crate::domain::signal::{Signal, rank_and_weight};
use std::sync::Arc;
use tracing::warn;

pub struct SignalGenerationService {
    market_data: Arc<dyn MarketDataPort>,
    registry: Arc<ModelRegistry>,
    bar_lookback: usize,
}

impl SignalGenerationService {
    pub fn new(market_data: Arc<dyn MarketDataPort>, registry: Arc<ModelRegistry>, bar_lookback: usize) -> Self {
        Self {
            market_data,
            registry,
            bar_lookback,
        }
    }

    /// Computes a prediction per symbol, then ranks and weights the whole
    /// universe. A symbol whose bar history or prediction fails is dropped
    /// from the ranking rather than failing the entire batch — one bad
    /// feed shouldn't blank out every other signal in the run.
    pub async fn generate(
        &self,
        symbols: &[String],
        top_n: usize,
        bottom_n: usize,
    ) -> Result<Vec<Signal>, AppError> {
        if self.registry.is_degraded() {
            return Err(AppError::FailClosed("signal service has no active model loaded".into()));
        }

        let mut predictions = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.predict_one(symbol).await {
                Ok(predicted_return) => predictions.push((symbol.clone(), predicted_return)),
                Err(err) => warn!(symbol, %err, "skipping symbol in signal generation"),
            }
        }

        Ok(rank_and_weight(predictions, top_n, bottom_n))
    }

    async fn predict_one(&self, symbol: &str) -> Result<f64, AppError> {
        let bars = self.market_data.get_recent_bars(symbol, self.bar_lookback).await?;
        let features = compute_features(&bars);
        self.registry.predict(&features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::signal_service::model_registry::ModelRegistry;
    use crate::domain::model::{ModelMetadata, ModelStatus};
    use crate::domain::ports::{PortResult, PriceBar};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryModelRepo {
        rows: Mutex<Vec<ModelMetadata>>,
    }

    #[async_trait]
    impl crate::domain::ports::ModelRepository for InMemoryModelRepo {
        async fn get_active(&self, strategy_name: &str) -> PortResult<Option<ModelMetadata>> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.strategy_name == strategy_name).cloned())
        }
        async fn get(&self, id: &str) -> PortResult<Option<ModelMetadata>> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }
        async fn activate(&self, _strategy_name: &str, _id: &str) -> PortResult<()> {
            Ok(())
        }
        async fn insert(&self, model: &ModelMetadata) -> PortResult<()> {
            self.rows.lock().unwrap().push(model.clone());
            Ok(())
        }
    }

    struct FixedMarketData;

    #[async_trait]
    impl MarketDataPort for FixedMarketData {
        async fn get_price(&self, _symbol: &str) -> PortResult<Option<Decimal>> {
            Ok(Some(dec!(100)))
        }
        async fn get_recent_bars(&self, _symbol: &str, lookback: usize) -> PortResult<Vec<PriceBar>> {
            Ok((0..lookback)
                .map(|i| PriceBar {
                    timestamp: Utc::now(),
                    open: Decimal::from(100 + i as i64),
                    high: Decimal::from(100 + i as i64),
                    low: Decimal::from(100 + i as i64),
                    close: Decimal::from(100 + i as i64),
                    volume: Decimal::from(1000),
                    bid: None,
                    ask: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn generate_fails_closed_with_no_model_loaded() {
        let repo = Arc::new(InMemoryModelRepo::default());
        let registry = Arc::new(ModelRegistry::new(repo, 60));
        let service = SignalGenerationService::new(Arc::new(FixedMarketData), registry, 30);

        let err = service.generate(&["AAPL".into()], 1, 1).await.unwrap_err();
        assert!(matches!(err, AppError::FailClosed(_)));
    }

    #[tokio::test]
    async fn generate_ranks_after_model_loads() {
        let repo = Arc::new(InMemoryModelRepo::default());
        repo.insert(&ModelMetadata {
            id: "m1".into(),
            strategy_name: "momentum".into(),
            version: "v1".into(),
            model_path: "does-not-exist.onnx".into(),
            status: ModelStatus::Active,
            performance_metrics: serde_json::json!({}),
            config: serde_json::json!({}),
            created_at: Utc::now(),
            activated_at: Some(Utc::now()),
            deactivated_at: None,
        })
        .await
        .unwrap();

        let registry = Arc::new(ModelRegistry::new(repo, 60));
        registry.reload_if_changed("momentum").await.unwrap();

        let service = SignalGenerationService::new(Arc::new(FixedMarketData), registry, 30);
        let signals = service.generate(&["AAPL".into(), "MSFT".into()], 1, 1).await.unwrap();
        assert_eq!(signals.len(), 2);
    }
}

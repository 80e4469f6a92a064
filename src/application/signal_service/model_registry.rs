//! Hot-swappable model registry (spec §4.1). Holds the active predictor
//! behind `arc_swap::ArcSwapOption` so concurrent `generate` calls never
//! observe a torn or null model during a reload — the same atomic-pointer
//! swap pattern the teacher used for its `AlpacaWebSocketManager` connection
//! handle, applied here to model artifacts instead of a socket.

use crate::application::signal_service::predictor::{MLPredictor, OnnxPredictor};
use crate::domain::errors::AppError;
use crate::domain::features::probe_features;
use crate::domain::model::ModelMetadata;
use crate::domain::ports::ModelRepository;
use arc_swap::ArcSwapOption;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A loaded model artifact paired with the metadata row it was loaded from.
/// `version` is compared against the repository's active row to decide
/// whether a reload is needed.
struct LoadedModel {
    metadata: ModelMetadata,
    predictor: Arc<dyn MLPredictor>,
}

pub struct ModelRegistry {
    repo: Arc<dyn ModelRepository>,
    active: ArcSwapOption<LoadedModel>,
    sequence_length: usize,
}

impl ModelRegistry {
    pub fn new(repo: Arc<dyn ModelRepository>, sequence_length: usize) -> Self {
        Self {
            repo,
            active: ArcSwapOption::from(None),
            sequence_length,
        }
    }

    /// Currently active model metadata, or `NotFound` if none has ever
    /// loaded. Distinct from "degraded" (a model loaded but stale) — callers
    /// needing the predictor itself should go through `predict`.
    pub fn current_metadata(&self) -> Option<ModelMetadata> {
        self.active.load().as_ref().map(|m| m.metadata.clone())
    }

    pub fn is_degraded(&self) -> bool {
        self.active.load().is_none()
    }

    /// Runs a prediction through whatever model is currently active. Fails
    /// closed with `FailClosed` if no model has ever loaded — callers must
    /// not silently treat a missing model as a neutral prediction at the
    /// generation boundary, even though the predictor itself degrades to
    /// neutral once loaded (spec §4.1's two distinct failure semantics).
    pub fn predict(&self, features: &crate::domain::features::FeatureSet) -> Result<f64, AppError> {
        let guard = self.active.load();
        let loaded = guard
            .as_ref()
            .ok_or_else(|| AppError::FailClosed("no model ever loaded for this strategy".into()))?;
        loaded
            .predictor
            .predict(features)
            .map_err(|e| AppError::Internal(format!("prediction failed: {e}")))
    }

    /// Fetches the repository's active row for `strategy_name`; if its
    /// version differs from what's currently loaded, loads the artifact from
    /// `model_path`, validates it against a fixed probe input, and swaps it
    /// in atomically. Returns whether a swap occurred. Never propagates a
    /// load failure fatally once a prior model is loaded — the in-memory
    /// model is left untouched and the failure is only logged.
    pub async fn reload_if_changed(&self, strategy_name: &str) -> Result<bool, AppError> {
        let row = match self.repo.get_active(strategy_name).await? {
            Some(row) => row,
            None => {
                warn!(strategy_name, "no active model row in repository");
                return Ok(false);
            }
        };

        let current_version = self.active.load().as_ref().map(|m| m.metadata.version.clone());
        if current_version.as_deref() == Some(row.version.as_str()) {
            return Ok(false);
        }

        let predictor = OnnxPredictor::load(&PathBuf::from(&row.model_path), self.sequence_length);

        // Validate with a single deterministic probe prediction before the
        // swap. A predictor that panics or errors here never replaces a
        // working model.
        let probe = probe_features();
        if let Err(e) = predictor.predict(&probe) {
            error!(strategy_name, version = %row.version, error = %e, "model failed probe validation, keeping prior model");
            return Ok(false);
        }

        info!(strategy_name, version = %row.version, "swapping in newly loaded model");
        self.active.store(Some(Arc::new(LoadedModel {
            metadata: row,
            predictor: Arc::new(predictor),
        })));
        Ok(true)
    }

    pub async fn activate(&self, strategy_name: &str, version_id: &str) -> Result<(), AppError> {
        self.repo.activate(strategy_name, version_id).await?;
        self.reload_if_changed(strategy_name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ModelStatus;
    use crate::domain::ports::PortResult;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryModelRepo {
        rows: Mutex<Vec<ModelMetadata>>,
    }

    #[async_trait::async_trait]
    impl ModelRepository for InMemoryModelRepo {
        async fn get_active(&self, strategy_name: &str) -> PortResult<Option<ModelMetadata>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.strategy_name == strategy_name && r.status == ModelStatus::Active)
                .cloned())
        }

        async fn get(&self, id: &str) -> PortResult<Option<ModelMetadata>> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }

        async fn activate(&self, strategy_name: &str, id: &str) -> PortResult<()> {
            let mut rows = self.rows.lock().unwrap();
            for r in rows.iter_mut() {
                if r.strategy_name == strategy_name {
                    r.status = if r.id == id { ModelStatus::Active } else { ModelStatus::Inactive };
                }
            }
            Ok(())
        }

        async fn insert(&self, model: &ModelMetadata) -> PortResult<()> {
            self.rows.lock().unwrap().push(model.clone());
            Ok(())
        }
    }

    fn sample_model(id: &str, version: &str) -> ModelMetadata {
        ModelMetadata {
            id: id.into(),
            strategy_name: "momentum".into(),
            version: version.into(),
            model_path: "does-not-exist.onnx".into(),
            status: ModelStatus::Active,
            performance_metrics: serde_json::json!({}),
            config: serde_json::json!({}),
            created_at: Utc::now(),
            activated_at: Some(Utc::now()),
            deactivated_at: None,
        }
    }

    #[tokio::test]
    async fn degraded_until_first_successful_reload() {
        let repo = Arc::new(InMemoryModelRepo::default());
        let registry = ModelRegistry::new(repo.clone(), 60);
        assert!(registry.is_degraded());

        repo.insert(&sample_model("m1", "v1")).await.unwrap();
        let swapped = registry.reload_if_changed("momentum").await.unwrap();
        assert!(swapped);
        assert!(!registry.is_degraded());
        assert_eq!(registry.current_metadata().unwrap().version, "v1");
    }

    #[tokio::test]
    async fn reload_is_a_noop_when_version_unchanged() {
        let repo = Arc::new(InMemoryModelRepo::default());
        repo.insert(&sample_model("m1", "v1")).await.unwrap();
        let registry = ModelRegistry::new(repo, 60);

        assert!(registry.reload_if_changed("momentum").await.unwrap());
        assert!(!registry.reload_if_changed("momentum").await.unwrap());
    }

    #[tokio::test]
    async fn predict_fails_closed_with_no_model_loaded() {
        let repo = Arc::new(InMemoryModelRepo::default());
        let registry = ModelRegistry::new(repo, 60);
        let err = registry.predict(&probe_features()).unwrap_err();
        assert!(matches!(err, AppError::FailClosed(_)));
    }
}

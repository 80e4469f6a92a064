//! ONNX model wrapper. Adapted from the teacher's `OnnxPredictor`
//! (`application::ml::onnx_predictor`): same stateful history buffer for
//! sequence models and the same graceful-neutral fallback when no model is
//! loaded, retargeted from the teacher's `FeatureSet`/single-signal output
//! onto this system's `domain::features::FeatureSet` and a plain
//! `predicted_return: f64`.

use crate::domain::features::{FeatureSet, to_vector};
use ort::session::Session;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Interface for model implementations. Kept as a trait (rather than
/// hard-wiring `OnnxPredictor` everywhere) so tests can substitute a fixed
/// predictor without touching `ort`.
pub trait MLPredictor: Send + Sync {
    fn predict(&self, features: &FeatureSet) -> Result<f64, String>;
    fn warmup(&self, _features: &FeatureSet) {}
}

pub struct OnnxPredictor {
    session: Option<Mutex<Session>>,
    history_buffer: Mutex<VecDeque<Vec<f32>>>,
    sequence_length: usize,
}

impl OnnxPredictor {
    /// Loads the ONNX artifact at `model_path`. A missing or unreadable file
    /// is not fatal here — `predict` degrades to a neutral `0.0` return,
    /// matching the teacher's cold-start/missing-model behavior, so a bad
    /// `model_path` on one strategy doesn't take the whole registry down.
    pub fn load(model_path: &Path, sequence_length: usize) -> Self {
        let session = if !model_path.exists() {
            warn!(path = %model_path.display(), "onnx model file not found, predictor will return neutral");
            None
        } else {
            match Session::builder().and_then(|b| b.commit_from_file(model_path)) {
                Ok(session) => {
                    info!(path = %model_path.display(), "loaded onnx model");
                    Some(Mutex::new(session))
                }
                Err(e) => {
                    error!(path = %model_path.display(), error = %e, "failed to load onnx model");
                    None
                }
            }
        };

        Self {
            session,
            history_buffer: Mutex::new(VecDeque::new()),
            sequence_length,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }
}

impl MLPredictor for OnnxPredictor {
    fn warmup(&self, features: &FeatureSet) {
        let input_vec = to_vector(features);
        if let Ok(mut buffer) = self.history_buffer.lock() {
            if buffer.len() >= self.sequence_length {
                buffer.pop_front();
            }
            buffer.push_back(input_vec);
        }
    }

    fn predict(&self, features: &FeatureSet) -> Result<f64, String> {
        self.warmup(features);

        let mut session = match &self.session {
            Some(m) => m.lock().map_err(|e| format!("session lock poisoned: {e}"))?,
            None => return Ok(0.0),
        };

        let buffer = self
            .history_buffer
            .lock()
            .map_err(|e| format!("history buffer lock poisoned: {e}"))?;

        if buffer.len() < self.sequence_length {
            return Ok(0.0);
        }

        let flat_data: Vec<f32> = buffer.iter().flatten().cloned().collect();
        let feature_dim = buffer[0].len();
        let shape = vec![1, self.sequence_length, feature_dim];

        let input_value = ort::value::Value::from_array((shape.as_slice(), flat_data))
            .map_err(|e| format!("input tensor construction failed: {e}"))?;

        let inputs = ort::inputs![input_value];

        match session.run(inputs) {
            Ok(outputs) => {
                let output_value = outputs
                    .iter()
                    .next()
                    .map(|(_, v)| v)
                    .ok_or("model produced no output")?;
                let data = output_value
                    .try_extract_tensor::<f32>()
                    .map_err(|e| e.to_string())?;
                Ok(*data.1.iter().next().ok_or("model output was empty")? as f64)
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

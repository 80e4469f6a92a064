pub mod feature_pipeline;
pub mod model_registry;
pub mod predictor;
pub mod service;
pub mod statistical_features;

pub use model_registry::ModelRegistry;
pub use service::SignalGenerationService;

pub mod database;
pub mod model_repository;
pub mod orchestration_run_repository;
pub mod order_repository;
pub mod orphan_repository;
pub mod position_repository;
pub mod risk_kv_repository;

pub use database::Database;
pub use model_repository::SqliteModelRepository;
pub use orchestration_run_repository::SqliteOrchestrationRunRepository;
pub use order_repository::SqliteOrderRepository;
pub use orphan_repository::SqliteOrphanRepository;
pub use position_repository::SqlitePositionRepository;
pub use risk_kv_repository::SqliteRiskStore;

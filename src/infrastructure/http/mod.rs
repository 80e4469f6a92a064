//! The HTTP layer shared by all three services: axum routers, the
//! `AppError` → response mapping, and the reqwest-backed clients the
//! Orchestrator uses to call the other two over the wire (spec §2, §6).

pub mod error_response;
pub mod gateway_client;
pub mod gateway_router;
pub mod orchestrator_router;
pub mod signal_client;
pub mod signal_router;

pub use gateway_client::HttpGatewayClient;
pub use gateway_router::GatewayState;
pub use orchestrator_router::OrchestratorState;
pub use signal_client::HttpSignalClient;
pub use signal_router::SignalState;

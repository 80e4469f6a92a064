//! Orchestrator (spec §4.3): pulls signals, sizes orders by capital
//! allocation, submits through the Execution Gateway, and persists the run
//! record. Grounded on `application::trading::system`'s run-loop shape,
//! generalized from a continuously polling scheduler to the bounded
//! request/response batch spec §4.3 describes.

pub mod service;
pub mod sizing;

pub use service::OrchestratorService;

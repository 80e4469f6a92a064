//! Execution Gateway (spec §4.2): idempotent order submission, pre-trade
//! safety gates, webhook ingestion, and the reconciliation engine that
//! keeps the ledger aligned with broker truth. Grounded on
//! `domain::risk::filters::validator_trait`'s gate-chain shape and
//! `application::risk_management::order_reconciler`'s reconciliation
//! mechanics, rebuilt against the persisted ledger and `risk_kv` rather
//! than the teacher's single-process state.

pub mod gates;
pub mod reconciliation;
pub mod service;
pub mod sweep;
pub mod twap;
pub mod webhook;

pub use service::ExecutionGatewayService;

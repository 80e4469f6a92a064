//! Adapters implementing the domain's ports (spec §2): the Alpaca broker and
//! market data clients, SQLite-backed persistence, and the axum/reqwest HTTP
//! layer the three services run on.

pub mod broker;
pub mod http;
pub mod market_data;
pub mod observability;
pub mod persistence;

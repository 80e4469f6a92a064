//! SQLite pool setup and schema migration.
//!
//! Grounded on the teacher's `Database` wrapper (WAL journal mode, pool
//! sizing, `CREATE TABLE IF NOT EXISTS` migration style) — the schema below
//! replaces the teacher's candle/strategy tables with the control plane's
//! ledger (`orders`, `order_fills`, `positions`, `model_registry`) and the
//! `risk_kv` binding for the shared key-value store (SPEC_FULL.md §3).

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("failed to connect to SQLite database")?;

        info!(db_url, "connected to ledger database");

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                client_order_id TEXT PRIMARY KEY,
                broker_order_id TEXT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                qty INTEGER NOT NULL,
                order_type TEXT NOT NULL,
                limit_price TEXT,
                time_in_force TEXT NOT NULL,
                status TEXT NOT NULL,
                filled_qty INTEGER NOT NULL DEFAULT 0,
                avg_fill_price TEXT NOT NULL DEFAULT '0',
                strategy_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                status_source TEXT NOT NULL,
                status_sequence INTEGER NOT NULL DEFAULT 0,
                trade_date TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create orders table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_symbol ON orders (symbol);")
            .execute(&mut *conn)
            .await
            .context("failed to create orders symbol index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status);")
            .execute(&mut *conn)
            .await
            .context("failed to create orders status index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS order_fills (
                fill_id TEXT PRIMARY KEY,
                client_order_id TEXT NOT NULL REFERENCES orders(client_order_id),
                qty INTEGER NOT NULL,
                price TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create order_fills table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_fills_client_order_id ON order_fills (client_order_id);",
        )
        .execute(&mut *conn)
        .await
        .context("failed to create order_fills index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webhook_events (
                client_order_id TEXT NOT NULL,
                broker_event_id TEXT NOT NULL,
                received_at TEXT NOT NULL,
                PRIMARY KEY (client_order_id, broker_event_id)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create webhook_events table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                symbol TEXT PRIMARY KEY,
                qty INTEGER NOT NULL,
                avg_entry_price TEXT NOT NULL,
                last_reconciled_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create positions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_registry (
                id TEXT PRIMARY KEY,
                strategy_name TEXT NOT NULL,
                version TEXT NOT NULL,
                model_path TEXT NOT NULL,
                status TEXT NOT NULL,
                performance_metrics TEXT NOT NULL DEFAULT '{}',
                config TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                activated_at TEXT,
                deactivated_at TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create model_registry table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_model_registry_active \
             ON model_registry (strategy_name, status);",
        )
        .execute(&mut *conn)
        .await
        .context("failed to create model_registry index")?;

        // risk_kv: this implementation's binding for the shared key-value
        // store (SPEC_FULL.md §3). `version` backs single-key CAS; `expires_at`
        // backs the short-lived lock rows (e.g. `reconciliation:running`).
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                expires_at TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create risk_kv table")?;

        // A single TEXT value cannot hold an appendable sorted set, so the
        // spec's `circuit_breaker:history` key is realized as its own table.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS circuit_breaker_trips (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reason TEXT NOT NULL,
                tripped_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create circuit_breaker_trips table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orphan_orders (
                broker_order_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                status TEXT NOT NULL,
                filled_qty INTEGER NOT NULL,
                avg_fill_price TEXT NOT NULL,
                detected_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create orphan_orders table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orchestration_runs (
                run_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                num_signals INTEGER NOT NULL,
                num_orders_submitted INTEGER NOT NULL,
                num_orders_accepted INTEGER NOT NULL,
                num_orders_rejected INTEGER NOT NULL,
                mappings TEXT NOT NULL,
                started_at TEXT NOT NULL,
                duration_seconds REAL NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create orchestration_runs table")?;

        info!("ledger schema migrated");
        Ok(())
    }
}

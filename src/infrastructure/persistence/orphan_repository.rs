//! Orphan order persistence (spec §4.5 step 4): broker orders reconciliation
//! could not match to a ledger row by the deterministic `client_order_id`
//! scheme, kept for operator attention alongside the quarantine flag set on
//! the same symbol.

use crate::domain::errors::AppError;
use crate::domain::order::OrderStatus;
use crate::domain::ports::{OrphanOrder, OrphanRepository, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

pub struct SqliteOrphanRepository {
    pool: SqlitePool,
}

impl SqliteOrphanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrphanRepository for SqliteOrphanRepository {
    async fn record(&self, orphan: &OrphanOrder) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orphan_orders (
                broker_order_id, symbol, status, filled_qty, avg_fill_price, detected_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(broker_order_id) DO UPDATE SET
                status = excluded.status,
                filled_qty = excluded.filled_qty,
                avg_fill_price = excluded.avg_fill_price
            "#,
        )
        .bind(&orphan.broker_order_id)
        .bind(&orphan.symbol)
        .bind(orphan.status.to_string())
        .bind(orphan.filled_qty)
        .bind(orphan.avg_fill_price.to_string())
        .bind(orphan.detected_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn list(&self) -> PortResult<Vec<OrphanOrder>> {
        let rows = sqlx::query("SELECT * FROM orphan_orders ORDER BY detected_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.try_get("status").map_err(AppError::from)?;
                let avg_fill_price: String = row.try_get("avg_fill_price").map_err(AppError::from)?;
                let detected_at: String = row.try_get("detected_at").map_err(AppError::from)?;
                Ok(OrphanOrder {
                    broker_order_id: row.try_get("broker_order_id").map_err(AppError::from)?,
                    symbol: row.try_get("symbol").map_err(AppError::from)?,
                    status: OrderStatus::from_str(&status).map_err(AppError::Internal)?,
                    filled_qty: row.try_get("filled_qty").map_err(AppError::from)?,
                    avg_fill_price: Decimal::from_str(&avg_fill_price)
                        .map_err(|e| AppError::Internal(e.to_string()))?,
                    detected_at: DateTime::parse_from_rfc3339(&detected_at)
                        .map_err(|e| AppError::Internal(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn repo() -> SqliteOrphanRepository {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::infrastructure::persistence::database::Database { pool: pool.clone() }
            .migrate()
            .await
            .unwrap();
        SqliteOrphanRepository::new(pool)
    }

    #[tokio::test]
    async fn record_then_list_round_trips() {
        let repo = repo().await;
        repo.record(&OrphanOrder {
            broker_order_id: "brk-1".into(),
            symbol: "AAPL".into(),
            status: OrderStatus::Submitted,
            filled_qty: 0,
            avg_fill_price: Decimal::ZERO,
            detected_at: Utc::now(),
        })
        .await
        .unwrap();

        let orphans = repo.list().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].broker_order_id, "brk-1");
    }
}

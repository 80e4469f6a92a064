//! Position snapshot persistence. Upserted by webhook fills incrementally
//! and overwritten wholesale by reconciliation (spec §4.5 step 6).

use crate::domain::errors::AppError;
use crate::domain::ports::{PortResult, PositionRepository};
use crate::domain::position::PositionSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

pub struct SqlitePositionRepository {
    pool: SqlitePool,
}

impl SqlitePositionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionRepository for SqlitePositionRepository {
    async fn get(&self, symbol: &str) -> PortResult<Option<PositionSnapshot>> {
        let row = sqlx::query("SELECT * FROM positions WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        row.map(|r| {
            let qty: i64 = r.try_get("qty").map_err(AppError::from)?;
            let avg_entry_price: String = r.try_get("avg_entry_price").map_err(AppError::from)?;
            let last_reconciled_at: String =
                r.try_get("last_reconciled_at").map_err(AppError::from)?;
            Ok(PositionSnapshot {
                symbol: r.try_get("symbol").map_err(AppError::from)?,
                qty,
                avg_entry_price: Decimal::from_str(&avg_entry_price)
                    .map_err(|e| AppError::Internal(e.to_string()))?,
                last_reconciled_at: DateTime::parse_from_rfc3339(&last_reconciled_at)
                    .map_err(|e| AppError::Internal(e.to_string()))?
                    .with_timezone(&Utc),
            })
        })
        .transpose()
    }

    async fn list(&self) -> PortResult<Vec<PositionSnapshot>> {
        let rows = sqlx::query("SELECT * FROM positions")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;
        rows.into_iter()
            .map(|r| {
                let avg_entry_price: String = r.try_get("avg_entry_price").map_err(AppError::from)?;
                let last_reconciled_at: String =
                    r.try_get("last_reconciled_at").map_err(AppError::from)?;
                Ok(PositionSnapshot {
                    symbol: r.try_get("symbol").map_err(AppError::from)?,
                    qty: r.try_get("qty").map_err(AppError::from)?,
                    avg_entry_price: Decimal::from_str(&avg_entry_price)
                        .map_err(|e| AppError::Internal(e.to_string()))?,
                    last_reconciled_at: DateTime::parse_from_rfc3339(&last_reconciled_at)
                        .map_err(|e| AppError::Internal(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    async fn upsert(&self, snapshot: &PositionSnapshot) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (symbol, qty, avg_entry_price, last_reconciled_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                qty = excluded.qty,
                avg_entry_price = excluded.avg_entry_price,
                last_reconciled_at = excluded.last_reconciled_at
            "#,
        )
        .bind(&snapshot.symbol)
        .bind(snapshot.qty)
        .bind(snapshot.avg_entry_price.to_string())
        .bind(snapshot.last_reconciled_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}

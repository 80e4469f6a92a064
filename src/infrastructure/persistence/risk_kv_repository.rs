//! `risk_kv`-backed `RiskStore` (SPEC_FULL.md §3): the shared key-value
//! store realized as a SQLite table instead of an external KV system.
//!
//! Grounded on `risk_state_repository.rs`'s upsert-via-`ON CONFLICT` idiom,
//! generalized to single-key CAS (`version` column) and atomic add, plus
//! the short-lived lock rows the reconciliation engine needs.

use crate::domain::errors::AppError;
use crate::domain::ports::{BreakerHistory, PortResult, RiskStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct SqliteRiskStore {
    pool: SqlitePool,
}

impl SqliteRiskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RiskStore for SqliteRiskStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM risk_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.map(|(v,)| v))
    }

    async fn get_with_version(&self, key: &str) -> PortResult<Option<(String, i64)>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, version FROM risk_kv WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(AppError::from)?;
        Ok(row)
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_kv (key, value, version) VALUES (?, ?, 1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, version = risk_kv.version + 1
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn cas(&self, key: &str, expected_version: i64, new_value: &str) -> PortResult<bool> {
        if expected_version == 0 {
            // Key doesn't exist yet from the caller's point of view: only
            // succeeds if nobody beat us to creating it.
            let result = sqlx::query(
                "INSERT INTO risk_kv (key, value, version) VALUES (?, ?, 1) \
                 ON CONFLICT(key) DO NOTHING",
            )
            .bind(key)
            .bind(new_value)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
            return Ok(result.rows_affected() == 1);
        }

        let result = sqlx::query(
            "UPDATE risk_kv SET value = ?, version = version + 1 WHERE key = ? AND version = ?",
        )
        .bind(new_value)
        .bind(key)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(result.rows_affected() == 1)
    }

    async fn atomic_add(&self, key: &str, delta: i64) -> PortResult<i64> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        sqlx::query(
            "INSERT INTO risk_kv (key, value, version) VALUES (?, '0', 0) \
             ON CONFLICT(key) DO NOTHING",
        )
        .bind(key)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        sqlx::query(
            "UPDATE risk_kv SET value = CAST(CAST(value AS INTEGER) + ? AS TEXT), \
             version = version + 1 WHERE key = ?",
        )
        .bind(delta)
        .bind(key)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let (value,): (String,) = sqlx::query_as("SELECT value FROM risk_kv WHERE key = ?")
            .bind(key)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;

        value
            .parse::<i64>()
            .map_err(|e| AppError::Internal(format!("corrupt risk_kv counter {key}: {e}")))
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM risk_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn try_lock(&self, key: &str, ttl_seconds: i64) -> PortResult<bool> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds);

        let result = sqlx::query(
            r#"
            INSERT INTO risk_kv (key, value, version, expires_at)
            VALUES (?, 'locked', 1, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = 'locked',
                version = risk_kv.version + 1,
                expires_at = excluded.expires_at
            WHERE risk_kv.expires_at IS NULL OR risk_kv.expires_at < ?
            "#,
        )
        .bind(key)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn unlock(&self, key: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM risk_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }
}

#[async_trait]
impl BreakerHistory for SqliteRiskStore {
    async fn record_trip(&self, reason: &str, tripped_at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("INSERT INTO circuit_breaker_trips (reason, tripped_at) VALUES (?, ?)")
            .bind(reason)
            .bind(tripped_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_trips(&self, limit: i64) -> PortResult<Vec<(String, DateTime<Utc>)>> {
        let rows = sqlx::query(
            "SELECT reason, tripped_at FROM circuit_breaker_trips ORDER BY tripped_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        rows.into_iter()
            .map(|row| {
                let reason: String = row.try_get("reason").map_err(AppError::from)?;
                let tripped_at: String = row.try_get("tripped_at").map_err(AppError::from)?;
                let tripped_at = DateTime::parse_from_rfc3339(&tripped_at)
                    .map_err(|e| AppError::Internal(e.to_string()))?
                    .with_timezone(&Utc);
                Ok((reason, tripped_at))
            })
            .collect()
    }
}

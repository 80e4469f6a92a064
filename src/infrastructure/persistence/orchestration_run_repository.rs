//! Orchestration run record persistence (spec §4.3: "the run record ...
//! is persisted before returning").

use crate::domain::errors::AppError;
use crate::domain::ports::{OrchestrationRun, OrchestrationRunRepository, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct SqliteOrchestrationRunRepository {
    pool: SqlitePool,
}

impl SqliteOrchestrationRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrchestrationRunRepository for SqliteOrchestrationRunRepository {
    async fn insert(&self, run: &OrchestrationRun) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orchestration_runs (
                run_id, status, num_signals, num_orders_submitted, num_orders_accepted,
                num_orders_rejected, mappings, started_at, duration_seconds
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                status = excluded.status,
                num_signals = excluded.num_signals,
                num_orders_submitted = excluded.num_orders_submitted,
                num_orders_accepted = excluded.num_orders_accepted,
                num_orders_rejected = excluded.num_orders_rejected,
                mappings = excluded.mappings,
                duration_seconds = excluded.duration_seconds
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.status)
        .bind(run.num_signals)
        .bind(run.num_orders_submitted)
        .bind(run.num_orders_accepted)
        .bind(run.num_orders_rejected)
        .bind(&run.mappings)
        .bind(run.started_at.to_rfc3339())
        .bind(run.duration_seconds)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> PortResult<Option<OrchestrationRun>> {
        let row = sqlx::query("SELECT * FROM orchestration_runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        row.map(|row| {
            let started_at: String = row.try_get("started_at").map_err(AppError::from)?;
            Ok(OrchestrationRun {
                run_id: row.try_get("run_id").map_err(AppError::from)?,
                status: row.try_get("status").map_err(AppError::from)?,
                num_signals: row.try_get("num_signals").map_err(AppError::from)?,
                num_orders_submitted: row.try_get("num_orders_submitted").map_err(AppError::from)?,
                num_orders_accepted: row.try_get("num_orders_accepted").map_err(AppError::from)?,
                num_orders_rejected: row.try_get("num_orders_rejected").map_err(AppError::from)?,
                mappings: row.try_get("mappings").map_err(AppError::from)?,
                started_at: DateTime::parse_from_rfc3339(&started_at)
                    .map_err(|e| AppError::Internal(e.to_string()))?
                    .with_timezone(&Utc),
                duration_seconds: row.try_get("duration_seconds").map_err(AppError::from)?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn repo() -> SqliteOrchestrationRunRepository {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::infrastructure::persistence::database::Database { pool: pool.clone() }
            .migrate()
            .await
            .unwrap();
        SqliteOrchestrationRunRepository::new(pool)
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let repo = repo().await;
        let run = OrchestrationRun {
            run_id: "run-1".into(),
            status: "completed".into(),
            num_signals: 5,
            num_orders_submitted: 5,
            num_orders_accepted: 5,
            num_orders_rejected: 0,
            mappings: "[]".into(),
            started_at: Utc::now(),
            duration_seconds: 1.23,
        };
        repo.insert(&run).await.unwrap();
        let fetched = repo.get("run-1").await.unwrap().unwrap();
        assert_eq!(fetched.num_orders_submitted, 5);
    }
}

//! Model registry persistence: enforces at-most-one-active-row per
//! strategy (spec §3) transactionally in `activate`.

use crate::domain::errors::AppError;
use crate::domain::model::{ModelMetadata, ModelStatus};
use crate::domain::ports::{ModelRepository, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

pub struct SqliteModelRepository {
    pool: SqlitePool,
}

impl SqliteModelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_model(row: sqlx::sqlite::SqliteRow) -> Result<ModelMetadata, AppError> {
    let status: String = row.try_get("status").map_err(AppError::from)?;
    let performance_metrics: String = row.try_get("performance_metrics").map_err(AppError::from)?;
    let config: String = row.try_get("config").map_err(AppError::from)?;
    let created_at: String = row.try_get("created_at").map_err(AppError::from)?;
    let activated_at: Option<String> = row.try_get("activated_at").map_err(AppError::from)?;
    let deactivated_at: Option<String> = row.try_get("deactivated_at").map_err(AppError::from)?;

    let parse_ts = |s: &str| -> Result<DateTime<Utc>, AppError> {
        Ok(DateTime::parse_from_rfc3339(s)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .with_timezone(&Utc))
    };

    Ok(ModelMetadata {
        id: row.try_get("id").map_err(AppError::from)?,
        strategy_name: row.try_get("strategy_name").map_err(AppError::from)?,
        version: row.try_get("version").map_err(AppError::from)?,
        model_path: row.try_get("model_path").map_err(AppError::from)?,
        status: status.parse::<ModelStatus>().map_err(AppError::Internal)?,
        performance_metrics: serde_json::from_str::<Value>(&performance_metrics)
            .map_err(|e| AppError::Internal(e.to_string()))?,
        config: serde_json::from_str::<Value>(&config).map_err(|e| AppError::Internal(e.to_string()))?,
        created_at: parse_ts(&created_at)?,
        activated_at: activated_at.map(|s| parse_ts(&s)).transpose()?,
        deactivated_at: deactivated_at.map(|s| parse_ts(&s)).transpose()?,
    })
}

#[async_trait]
impl ModelRepository for SqliteModelRepository {
    async fn get_active(&self, strategy_name: &str) -> PortResult<Option<ModelMetadata>> {
        let row = sqlx::query(
            "SELECT * FROM model_registry WHERE strategy_name = ? AND status = 'active'",
        )
        .bind(strategy_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        row.map(row_to_model).transpose()
    }

    async fn get(&self, id: &str) -> PortResult<Option<ModelMetadata>> {
        let row = sqlx::query("SELECT * FROM model_registry WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        row.map(row_to_model).transpose()
    }

    async fn activate(&self, strategy_name: &str, id: &str) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE model_registry SET status = 'inactive', deactivated_at = ? \
             WHERE strategy_name = ? AND status = 'active'",
        )
        .bind(&now)
        .bind(strategy_name)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let result = sqlx::query(
            "UPDATE model_registry SET status = 'active', activated_at = ? \
             WHERE id = ? AND strategy_name = ?",
        )
        .bind(&now)
        .bind(id)
        .bind(strategy_name)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() != 1 {
            return Err(AppError::NotFound(format!(
                "model {id} not found for strategy {strategy_name}"
            )));
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    async fn insert(&self, model: &ModelMetadata) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO model_registry (
                id, strategy_name, version, model_path, status,
                performance_metrics, config, created_at, activated_at, deactivated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&model.id)
        .bind(&model.strategy_name)
        .bind(&model.version)
        .bind(&model.model_path)
        .bind(model.status.to_string())
        .bind(model.performance_metrics.to_string())
        .bind(model.config.to_string())
        .bind(model.created_at.to_rfc3339())
        .bind(model.activated_at.map(|t| t.to_rfc3339()))
        .bind(model.deactivated_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}

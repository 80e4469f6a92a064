//! Model registry records. At most one `(strategy_name, status = Active)`
//! row may exist at any instant — enforced transactionally by
//! `ModelRepository::activate`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Active,
    Inactive,
    Testing,
    Failed,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelStatus::Active => "active",
            ModelStatus::Inactive => "inactive",
            ModelStatus::Testing => "testing",
            ModelStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ModelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "active" => ModelStatus::Active,
            "inactive" => ModelStatus::Inactive,
            "testing" => ModelStatus::Testing,
            "failed" => ModelStatus::Failed,
            other => return Err(format!("invalid model status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub id: String,
    pub strategy_name: String,
    pub version: String,
    pub model_path: String,
    pub status: ModelStatus,
    pub performance_metrics: Value,
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

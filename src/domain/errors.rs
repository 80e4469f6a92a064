//! Domain error taxonomy. One variant per error kind in spec §7; each maps
//! 1-to-1 to an HTTP status and a stable machine-readable `code` consulted by
//! the axum error layer (`infrastructure::http::error_response`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("risk violation ({code}): {message}")]
    RiskViolation { code: String, message: String },

    #[error("fail-closed: {0}")]
    FailClosed(String),

    #[error("transient broker error: {0}")]
    TransientBroker(String),

    #[error("permanent broker error: {0}")]
    PermanentBroker(String),

    #[error("database conflict after {attempts} attempts: {message}")]
    DbConflict { attempts: u32, message: String },

    #[error("symbol quarantined: {0}")]
    Quarantine(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error kind maps to, per spec §7.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation(_) => 422,
            AppError::RiskViolation { .. } => 422,
            AppError::FailClosed(_) => 503,
            AppError::TransientBroker(_) => 503,
            AppError::PermanentBroker(_) => 422,
            AppError::DbConflict { .. } => 409,
            AppError::Quarantine(_) => 422,
            AppError::NotFound(_) => 404,
            AppError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code. Clients key behavior off this, never
    /// off the human-readable message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::RiskViolation { .. } => "risk_violation",
            AppError::FailClosed(_) => "fail_closed",
            AppError::TransientBroker(_) => "transient_broker",
            AppError::PermanentBroker(_) => "permanent_broker",
            AppError::DbConflict { .. } => "db_conflict",
            AppError::Quarantine(_) => "quarantine",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn risk_violation(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::RiskViolation {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_violation_formats_code_and_message() {
        let err = AppError::risk_violation("position_limit", "exceeds 10000 shares");
        assert_eq!(
            err.to_string(),
            "risk violation (position_limit): exceeds 10000 shares"
        );
        assert_eq!(err.code(), "risk_violation");
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn fail_closed_maps_to_503() {
        let err = AppError::FailClosed("risk store unreachable".into());
        assert_eq!(err.http_status(), 503);
        assert_eq!(err.code(), "fail_closed");
    }

    #[test]
    fn quarantine_maps_to_422() {
        let err = AppError::Quarantine("AAPL".into());
        assert_eq!(err.http_status(), 422);
        assert_eq!(err.code(), "quarantine");
    }

    #[test]
    fn db_conflict_carries_attempt_count() {
        let err = AppError::DbConflict {
            attempts: 3,
            message: "status_sequence mismatch".into(),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(err.http_status(), 409);
    }
}

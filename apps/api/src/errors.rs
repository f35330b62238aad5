use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ledger::{LedgerError, UsageSnapshot};
use crate::llm_client::LlmError;
use crate::principal::Principal;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),

    #[error("Quota exceeded ({used} used of {limit})", used = .snapshot.used, limit = .snapshot.limit)]
    QuotaExceeded {
        snapshot: Box<UsageSnapshot>,
        anonymous: bool,
    },

    #[error("Usage counter under contention")]
    Contention,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps ledger failures onto HTTP-facing errors. The principal decides
    /// the quota status code: anonymous callers are being rate limited,
    /// authenticated ones are out of paid credits.
    pub fn from_ledger(err: LedgerError, principal: &Principal) -> Self {
        match err {
            LedgerError::QuotaExceeded(snapshot) => AppError::QuotaExceeded {
                snapshot,
                anonymous: principal.is_anonymous(),
            },
            LedgerError::InvalidPrincipal(msg) => AppError::InvalidPrincipal(msg),
            LedgerError::Contention => AppError::Contention,
            LedgerError::Storage(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidPrincipal(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_PRINCIPAL", msg.clone())
            }
            AppError::QuotaExceeded { anonymous, .. } => {
                if *anonymous {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        "DAILY_LIMIT_REACHED",
                        "You've used today's free allowance. Sign in to keep going.".to_string(),
                    )
                } else {
                    (
                        StatusCode::PAYMENT_REQUIRED,
                        "QUOTA_EXCEEDED",
                        "No credits left this period. Upgrade or add bonus credits to continue."
                            .to_string(),
                    )
                }
            }
            AppError::Contention => (
                StatusCode::SERVICE_UNAVAILABLE,
                "LEDGER_CONTENTION",
                "Usage accounting is busy, please retry".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut body = json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        // Quota rejections carry the balance so clients can render what is
        // left without a second request.
        if let AppError::QuotaExceeded { snapshot, .. } = &self {
            body["usage"] = serde_json::to_value(snapshot.as_ref()).unwrap_or_default();
        }

        (status, Json(body)).into_response()
    }
}

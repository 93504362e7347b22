use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::models::{LogStatus, Role};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("week {week} already has a log for this team")]
    DuplicateWeek { week: u32 },

    #[error("date range overlaps an existing log for this team")]
    OverlappingRange,

    #[error("activity dated {date} falls outside the log's date range")]
    ActivityOutOfRange { date: String },

    #[error("{role} cannot move a log from {from} to {to}")]
    IllegalTransition {
        role: Role,
        from: LogStatus,
        to: LogStatus,
    },

    #[error("no team matches this code")]
    InvalidCode,

    #[error("invalid calendar date: {0}")]
    InvalidDate(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("not signed in")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Serialize)]
struct ErrorDetails {
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(what.to_string())
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateWeek { .. } => "DUPLICATE_WEEK",
            AppError::OverlappingRange => "OVERLAPPING_RANGE",
            AppError::ActivityOutOfRange { .. } => "ACTIVITY_OUT_OF_RANGE",
            AppError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            AppError::InvalidCode => "INVALID_CODE",
            AppError::InvalidDate(_) => "INVALID_DATE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Session(_) => "SESSION_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateWeek { .. }
            | AppError::OverlappingRange
            | AppError::IllegalTransition { .. }
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ActivityOutOfRange { .. } | AppError::Validation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InvalidCode | AppError::InvalidDate(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Store(_) | AppError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the failure came from a concurrent writer and the whole
    /// transaction body may be replayed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Store(StoreError::Conflict))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                "Internal server error".to_string()
            }
            AppError::Session(e) => {
                tracing::error!("Session error: {e}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetails {
                code: self.error_code(),
                message,
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fastfit_types::domain::errors::DomainError;
use fastfit_types::ports::order_repository::RepoError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    OptimisticLock,
    DuplicateEntry,
    NotFound,
    InvariantViolation,
    BadRequest,
    Unauthorized,
    Forbidden,
    Repository,
    Internal,
}

/// One row of the HTTP error table.
#[derive(Debug, Clone, Copy)]
pub struct ErrorMapping {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub name: &'static str,
}

/// Checked top to bottom; the first row matching the error's kind wins.
pub const ERROR_TABLE: [ErrorMapping; 9] = [
    ErrorMapping {
        kind: ErrorKind::OptimisticLock,
        status: StatusCode::CONFLICT,
        name: "OptimisticLockError",
    },
    ErrorMapping {
        kind: ErrorKind::DuplicateEntry,
        status: StatusCode::CONFLICT,
        name: "DuplicateEntryError",
    },
    ErrorMapping {
        kind: ErrorKind::NotFound,
        status: StatusCode::NOT_FOUND,
        name: "NotFoundError",
    },
    ErrorMapping {
        kind: ErrorKind::InvariantViolation,
        status: StatusCode::BAD_REQUEST,
        name: "InvariantViolationError",
    },
    ErrorMapping {
        kind: ErrorKind::BadRequest,
        status: StatusCode::BAD_REQUEST,
        name: "BadRequest",
    },
    ErrorMapping {
        kind: ErrorKind::Unauthorized,
        status: StatusCode::UNAUTHORIZED,
        name: "Unauthorized",
    },
    ErrorMapping {
        kind: ErrorKind::Forbidden,
        status: StatusCode::FORBIDDEN,
        name: "Forbidden",
    },
    ErrorMapping {
        kind: ErrorKind::Repository,
        status: StatusCode::INTERNAL_SERVER_ERROR,
        name: "RepositoryError",
    },
    ErrorMapping {
        kind: ErrorKind::Internal,
        status: StatusCode::INTERNAL_SERVER_ERROR,
        name: "InternalError",
    },
];

pub fn mapping_for(kind: ErrorKind) -> ErrorMapping {
    ERROR_TABLE
        .iter()
        .copied()
        .find(|m| m.kind == kind)
        .unwrap_or(ERROR_TABLE[ERROR_TABLE.len() - 1])
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Retry later: {0}")]
    OptimisticLock(String),

    #[error("duplicate value '{value}' for {field}")]
    DuplicateEntry { field: String, value: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("repository failure: {0}")]
    Repository(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::OptimisticLock(_) => ErrorKind::OptimisticLock,
            AppError::DuplicateEntry { .. } => ErrorKind::DuplicateEntry,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::Repository(_) => ErrorKind::Repository,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether running the same operation again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::OptimisticLock | ErrorKind::Repository)
    }
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::InvariantViolation(msg) => AppError::InvariantViolation(msg),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(id) => AppError::NotFound(format!("order {id} not found")),
            RepoError::DuplicateEntry { field, value } => AppError::DuplicateEntry { field, value },
            RepoError::OptimisticLock => {
                AppError::OptimisticLock("the order was modified concurrently".into())
            }
            RepoError::DbError(msg) => AppError::Repository(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mapping = mapping_for(self.kind());
        let detail = if mapping.status.is_server_error() {
            tracing::error!(error = ?self, kind = mapping.name, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (
            mapping.status,
            Json(ErrorBody {
                error: mapping.name,
                detail,
            }),
        )
            .into_response()
    }
}

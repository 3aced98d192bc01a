use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error produced by a batch that another caller started.
    #[error(transparent)]
    Shared(#[from] Arc<Error>),
}

impl Error {
    /// Failures of an external collaborator that are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Generation(_)
            | Error::ParseFailure(_)
            | Error::EmbeddingUnavailable(_)
            | Error::Reqwest(_) => true,
            Error::Shared(inner) => inner.is_transient(),
            _ => false,
        }
    }

    /// Short machine-readable label used in batch error lists.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Generation(_) | Error::Reqwest(_) => "generation",
            Error::EmbeddingUnavailable(_) => "embedding_unavailable",
            Error::ParseFailure(_) => "parse_failure",
            Error::Persistence(_) | Error::Database(_) => "persistence",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "bad_request",
            Error::NotFound(_) => "not_found",
            Error::Shared(inner) => inner.kind(),
            _ => "internal",
        }
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Error::Configuration(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Generation(msg) | Error::ParseFailure(msg) | Error::EmbeddingUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, format!("External service error: {}", msg))
            }
            Error::Reqwest(err) => (StatusCode::BAD_GATEWAY, format!("External service error: {}", err)),
            Error::Persistence(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Error::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Error::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Error::Shared(inner) => inner.status_and_message(),
            Error::Anyhow(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred".to_string(),
            ),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = self.status_and_message();
        let body = Json(json!({ "error": error_message, "kind": self.kind() }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_errors_keep_their_kind() {
        let inner = Arc::new(Error::Persistence("disk full".to_string()));
        let err = Error::from(inner);
        assert_eq!(err.kind(), "persistence");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Persistence error: disk full");
    }

    #[test]
    fn generator_failures_are_transient() {
        assert!(Error::Generation("timeout".into()).is_transient());
        assert!(Error::ParseFailure("not json".into()).is_transient());
        assert!(!Error::Configuration("zero weight".into()).is_transient());
    }
}

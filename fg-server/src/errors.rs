use axum::{
    extract::rejection::JsonRejection,
    http,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::ffi;
use serde_json::json;

pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Internal Server Error: {0:#}")]
    Internal(#[from] anyhow::Error),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Not found")]
    NotFound,
    #[error("You do not have permission to perform this action")]
    PermissionDenied,
    #[error("Authentication error: {0}")]
    Unauthenticated(&'static str),
}

impl WebError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WebError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        WebError::Conflict(msg.into())
    }

    pub fn status(&self) -> http::StatusCode {
        match self {
            WebError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            WebError::Validation(_) | WebError::Conflict(_) => http::StatusCode::BAD_REQUEST,
            WebError::NotFound => http::StatusCode::NOT_FOUND,
            WebError::PermissionDenied => http::StatusCode::FORBIDDEN,
            WebError::Unauthenticated(_) => http::StatusCode::UNAUTHORIZED,
        }
    }
}

/// Unique constraint violations mean someone got there first, so they surface as conflicts.
/// Check constraints guard input ranges, so they surface as validation errors.
/// A foreign key violation means the referenced row is gone.
impl From<rusqlite::Error> for WebError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, msg)
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                WebError::Conflict(msg.clone().unwrap_or_else(|| "Already exists".into()))
            }
            rusqlite::Error::SqliteFailure(failure, msg)
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_CHECK =>
            {
                WebError::Validation(msg.clone().unwrap_or_else(|| "Invalid value".into()))
            }
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                WebError::NotFound
            }
            _ => WebError::Internal(e.into()),
        }
    }
}

impl From<r2d2::Error> for WebError {
    fn from(e: r2d2::Error) -> Self {
        WebError::Internal(e.into())
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        WebError::Validation(rejection.body_text())
    }
}

impl From<axum_extra::extract::QueryRejection> for WebError {
    fn from(rejection: axum_extra::extract::QueryRejection) -> Self {
        WebError::Validation(rejection.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            WebError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                // In development, we want to return the error message
                // In production, we want to return a generic error message
                if cfg!(debug_assertions) {
                    self.to_string()
                } else {
                    "Internal Server Error".into()
                }
            }
            _ => self.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_becomes_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err: WebError = conn
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, WebError::Conflict(_)), "{:?}", err);
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn check_violation_becomes_validation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER CHECK (x >= 1));")
            .unwrap();
        let err: WebError = conn
            .execute("INSERT INTO t VALUES (0)", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, WebError::Validation(_)), "{:?}", err);
    }

    #[test]
    fn foreign_key_violation_becomes_not_found() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE parent (id INTEGER PRIMARY KEY);
            CREATE TABLE child (parent_id INTEGER REFERENCES parent(id));",
        )
        .unwrap();
        let err: WebError = conn
            .execute("INSERT INTO child VALUES (7)", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, WebError::NotFound), "{:?}", err);
    }

    #[test]
    fn other_store_errors_are_internal() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: WebError = conn
            .execute("INSERT INTO missing VALUES (1)", [])
            .unwrap_err()
            .into();
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}

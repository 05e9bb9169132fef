//! Error taxonomy for compilation and execution.
//!
//! Every failure surfaced by this crate is a [`QueryError`]. Errors fall into
//! five categories:
//!
//! - Grammar: the request cannot be compiled. Raised before any backend call.
//! - Invariant: a compiled statement failed an internal consistency check.
//! - Backend: the backend refused, timed out or returned something undecodable.
//! - Transaction: commit or rollback failed; both causes are preserved.
//! - Decode: a backend value could not be mapped onto a record field.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on backend payload text carried inside an error message.
pub const MAX_ERROR_PAYLOAD: usize = 5000;

/// Result type used across the crate
pub type QueryResult<T> = Result<T, QueryError>;

/// Broad error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Grammar,
    Invariant,
    Backend,
    Transaction,
    Decode,
}

/// Stable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnsupportedField,
    MalformedCondition,
    InvalidValue,
    UnsupportedParam,
    MissingParam,
    InvalidRequest,
    ParamMismatch,
    Backend,
    Commit,
    Rollback,
    Decode,
    Internal,
}

impl ErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedField => "ORM_UNSUPPORTED_FIELD",
            ErrorCode::MalformedCondition => "ORM_MALFORMED_CONDITION",
            ErrorCode::InvalidValue => "ORM_INVALID_VALUE",
            ErrorCode::UnsupportedParam => "ORM_UNSUPPORTED_PARAM",
            ErrorCode::MissingParam => "ORM_MISSING_PARAM",
            ErrorCode::InvalidRequest => "ORM_INVALID_REQUEST",
            ErrorCode::ParamMismatch => "ORM_PARAM_MISMATCH",
            ErrorCode::Backend => "ORM_BACKEND_FAILED",
            ErrorCode::Commit => "ORM_COMMIT_FAILED",
            ErrorCode::Rollback => "ORM_ROLLBACK_FAILED",
            ErrorCode::Decode => "ORM_DECODE_FAILED",
            ErrorCode::Internal => "ORM_INTERNAL",
        }
    }

    /// Category of this code
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::UnsupportedField
            | ErrorCode::MalformedCondition
            | ErrorCode::InvalidValue
            | ErrorCode::UnsupportedParam
            | ErrorCode::MissingParam
            | ErrorCode::InvalidRequest => ErrorCategory::Grammar,
            ErrorCode::ParamMismatch | ErrorCode::Internal => ErrorCategory::Invariant,
            ErrorCode::Backend => ErrorCategory::Backend,
            ErrorCode::Commit | ErrorCode::Rollback => ErrorCategory::Transaction,
            ErrorCode::Decode => ErrorCategory::Decode,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a backend failure, independent of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    Timeout,
    ConnectionRefused,
    QueryRejected,
    DecodeFailed,
    Other,
}

impl BackendErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::ConnectionRefused => "connection_refused",
            BackendErrorKind::QueryRejected => "query_rejected",
            BackendErrorKind::DecodeFailed => "decode_failed",
            BackendErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crate error type
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// A condition key that resolves to no usable operator
    #[error("unsupported field `{0}`")]
    UnsupportedField(String),

    /// A condition whose shape does not fit its key
    #[error("malformed condition: {0}")]
    MalformedCondition(String),

    /// A value of the wrong kind or arity for its operator or field
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A parameter outside a closed parameter set
    #[error("[{query}] query does not support field [{field}]")]
    UnsupportedParam { query: String, field: String },

    /// A required parameter that was not supplied
    #[error("missing required parameter `{param}` for `{context}`")]
    MissingParam { param: String, context: String },

    /// A request that cannot be routed or compiled as a whole
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Compiled text and bound parameters disagree
    #[error("statement has {placeholders} placeholders but {params} parameters")]
    ParamMismatch { placeholders: usize, params: usize },

    /// Failure reported by (or while talking to) a backend
    #[error("{backend} {kind} error (code {code}): {message}")]
    Backend {
        backend: String,
        kind: BackendErrorKind,
        code: i64,
        message: String,
    },

    /// Commit failed; the rollback outcome is attached when one was attempted
    #[error("commit error: [{error}]{}", .rollback.as_ref().map(|r| format!(", rollback error: [{}]", r)).unwrap_or_default())]
    Commit {
        error: Box<QueryError>,
        rollback: Option<Box<QueryError>>,
    },

    /// Rollback failed after the unit of work had already failed
    #[error("rollback error: [{error}], source error: [{cause}]")]
    Rollback {
        error: Box<QueryError>,
        cause: Box<QueryError>,
    },

    /// A backend value could not be decoded into a record field
    #[error("decode column `{column}`: {message}")]
    Decode { column: String, message: String },

    /// Broken internal state (poisoned lock and the like)
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn unsupported_field(key: impl Into<String>) -> Self {
        Self::UnsupportedField(key.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedCondition(msg.into())
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub fn unsupported_param(query: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnsupportedParam {
            query: query.into(),
            field: field.into(),
        }
    }

    pub fn missing_param(param: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingParam {
            param: param.into(),
            context: context.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Build a backend error. The message is truncated to [`MAX_ERROR_PAYLOAD`].
    pub fn backend(
        backend: impl Into<String>,
        kind: BackendErrorKind,
        code: i64,
        message: impl AsRef<str>,
    ) -> Self {
        Self::Backend {
            backend: backend.into(),
            kind,
            code,
            message: truncate_payload(message.as_ref()),
        }
    }

    /// Deadline expiry on a backend call
    pub fn timeout(backend: impl Into<String>, elapsed_ms: u128) -> Self {
        Self::backend(
            backend,
            BackendErrorKind::Timeout,
            0,
            format!("deadline exceeded after {}ms", elapsed_ms),
        )
    }

    pub fn decode(column: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the stable error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedField(_) => ErrorCode::UnsupportedField,
            Self::MalformedCondition(_) => ErrorCode::MalformedCondition,
            Self::InvalidValue(_) => ErrorCode::InvalidValue,
            Self::UnsupportedParam { .. } => ErrorCode::UnsupportedParam,
            Self::MissingParam { .. } => ErrorCode::MissingParam,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::ParamMismatch { .. } => ErrorCode::ParamMismatch,
            Self::Backend { .. } => ErrorCode::Backend,
            Self::Commit { .. } => ErrorCode::Commit,
            Self::Rollback { .. } => ErrorCode::Rollback,
            Self::Decode { .. } => ErrorCode::Decode,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Backend failure kind, if this is a backend error
    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            Self::Backend { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Timeouts and refused connections may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.backend_kind(),
            Some(BackendErrorKind::Timeout) | Some(BackendErrorKind::ConnectionRefused)
        )
    }
}

/// Cut `text` down to [`MAX_ERROR_PAYLOAD`] bytes on a char boundary.
pub fn truncate_payload(text: &str) -> String {
    if text.len() <= MAX_ERROR_PAYLOAD {
        return text.to_string();
    }
    let mut end = MAX_ERROR_PAYLOAD;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

//! Structured error metadata attached to `anyhow::Error` values as they
//! cross component boundaries, so the frontend can recover a short code, an
//! HTTP-shaped severity, and a human-readable message without downcasting to
//! every possible concrete error type.
use std::fmt;

use http::StatusCode;
use serde::Serialize;

/// Coarse severity used to pick an HTTP status and a retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMetadataKind {
    /// The request itself is malformed; retrying unchanged will not help.
    BadRequest,
    /// The referenced resource (user, cohort, queued job) does not exist.
    NotFound,
    /// Like `NotFound`, but the caller should retry because the resource
    /// may appear shortly (e.g. a job still draining into the cache).
    TransientNotFound,
    /// The caller is not allowed to perform this operation.
    Forbidden,
    /// The system is at capacity; the caller should back off and retry.
    Overloaded,
}

impl ErrorMetadataKind {
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorMetadataKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorMetadataKind::NotFound | ErrorMetadataKind::TransientNotFound => {
                StatusCode::NOT_FOUND
            },
            ErrorMetadataKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorMetadataKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// A short code plus a human-readable message, attached to an `anyhow::Error`
/// via `.context(...)` and recovered at the boundary that renders a response.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorMetadata {
    pub kind: ErrorMetadataKind,
    pub short_code: String,
    pub message: String,
}

impl ErrorMetadata {
    pub fn bad_request(short_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorMetadataKind::BadRequest,
            short_code: short_code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(short_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorMetadataKind::NotFound,
            short_code: short_code.into(),
            message: message.into(),
        }
    }

    pub fn transient_not_found(short_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorMetadataKind::TransientNotFound,
            short_code: short_code.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(short_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorMetadataKind::Forbidden,
            short_code: short_code.into(),
            message: message.into(),
        }
    }

    pub fn overloaded(short_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorMetadataKind::Overloaded,
            short_code: short_code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.short_code, self.message)
    }
}

impl std::error::Error for ErrorMetadata {}

/// Extension methods for recovering `ErrorMetadata` from an `anyhow::Error`
/// that may or may not have one attached.
pub trait ErrorMetadataAnyhowExt {
    fn metadata(&self) -> Option<&ErrorMetadata>;
    fn is_bad_request(&self) -> bool;
    fn is_not_found(&self) -> bool;
    fn is_overloaded(&self) -> bool;
    fn http_status(&self) -> StatusCode;
    fn short_code(&self) -> String;
}

impl ErrorMetadataAnyhowExt for anyhow::Error {
    fn metadata(&self) -> Option<&ErrorMetadata> {
        self.chain().find_map(|e| e.downcast_ref::<ErrorMetadata>())
    }

    fn is_bad_request(&self) -> bool {
        matches!(
            self.metadata().map(|m| m.kind),
            Some(ErrorMetadataKind::BadRequest)
        )
    }

    fn is_not_found(&self) -> bool {
        matches!(
            self.metadata().map(|m| m.kind),
            Some(ErrorMetadataKind::NotFound) | Some(ErrorMetadataKind::TransientNotFound)
        )
    }

    fn is_overloaded(&self) -> bool {
        matches!(
            self.metadata().map(|m| m.kind),
            Some(ErrorMetadataKind::Overloaded)
        )
    }

    fn http_status(&self) -> StatusCode {
        self.metadata()
            .map(|m| m.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn short_code(&self) -> String {
        self.metadata()
            .map(|m| m.short_code.clone())
            .unwrap_or_else(|| "InternalError".to_string())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn recovers_metadata_through_context_chain() {
        let base = ErrorMetadata::bad_request("BadCohortExpression", "malformed expression");
        let wrapped: anyhow::Error = anyhow::Error::new(base).context("while parsing request");
        assert!(wrapped.is_bad_request());
        assert_eq!(wrapped.short_code(), "BadCohortExpression");
        assert_eq!(wrapped.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_metadata_defaults_to_internal_error() {
        let err = anyhow::anyhow!("boom");
        assert!(!err.is_bad_request());
        assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.short_code(), "InternalError");
    }
}

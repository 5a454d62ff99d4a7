//! Maps `anyhow::Error` to an HTTP response, so handlers can return
//! `Result<impl IntoResponse, HttpResponseError>` rather than matching on
//! error variants in every handler.
use axum::response::{
    IntoResponse,
    Response,
};
use errors::ErrorMetadataAnyhowExt;
use http::StatusCode;
use serde::Serialize;

/// Small numeric codes kept only for the JSON payload's `error_code` field
/// (older API clients switch on it); `HttpResponseError`'s HTTP status
/// comes from `ErrorMetadataKind` instead.
fn legacy_error_code(short_code: &str) -> i32 {
    match short_code {
        "BadTimestamp" => 1,
        "RequestNotFound" => 2,
        "UserNotFound" => 3,
        "UnknownMetric" => 4,
        "UserLookupFailed" => 5,
        _ => -1,
    }
}

pub struct HttpResponseError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for HttpResponseError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for HttpResponseError {
    fn into_response(self) -> Response {
        let status = self.0.http_status();
        let short_code = self.0.short_code();
        let error_code = legacy_error_code(&short_code);
        tracing::warn!(short_code, status = %status, "request rejected: {:#}", self.0);

        #[derive(Serialize)]
        struct Body {
            error_code: i32,
            short_code: String,
            message: String,
        }
        (
            status,
            axum::Json(Body {
                error_code,
                short_code,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}


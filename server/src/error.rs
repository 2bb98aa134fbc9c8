//! API error type and HTTP conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use boxlift_common::Error;

/// Wrapper giving the common error an HTTP rendering.
#[derive(Debug)]
pub struct ApiError(pub Error);

/// JSON error body: human-readable message plus a stable taxonomy code.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::AuthExpired { .. } => StatusCode::UNAUTHORIZED,
            Error::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::AuthExchangeFailed { .. }
            | Error::AuthRefreshFailed { .. }
            | Error::IdentityLookupFailed { .. }
            | Error::RevokeFailed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            Error::AuthExchangeFailed { .. } => "auth_exchange_failed",
            Error::AuthRefreshFailed { .. } => "auth_refresh_failed",
            Error::IdentityLookupFailed { .. } => "identity_lookup_failed",
            Error::RevokeFailed { .. } => "revoke_failed",
            Error::AuthExpired { .. } => "auth_expired",
            Error::AccessDenied { .. } => "access_denied",
            Error::BadRequest { .. } | Error::InvalidInput(_) => "bad_request",
            Error::NameConflictUnresolved(_) => "name_conflict_unresolved",
            Error::UploadFailed { .. } => "upload_failed",
            Error::ReauthRequired(_) => "reauth_required",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

//! Common error types for Boxlift.

use thiserror::Error;

/// Top-level error type for Boxlift operations.
///
/// Variants produced from provider responses carry the upstream HTTP status
/// and the raw error body for operator diagnosis.
#[derive(Debug, Error)]
pub enum Error {
    /// Authorization-code exchange rejected by the provider.
    #[error("token exchange failed ({status}): {body}")]
    AuthExchangeFailed { status: u16, body: String },

    /// Refresh-token grant rejected by the provider.
    #[error("token refresh failed ({status}): {body}")]
    AuthRefreshFailed { status: u16, body: String },

    /// Identity endpoint rejected the access token.
    #[error("identity lookup failed ({status}): {body}")]
    IdentityLookupFailed { status: u16, body: String },

    /// Token revocation rejected; callers treat this as best-effort.
    #[error("token revocation failed ({status}): {body}")]
    RevokeFailed { status: u16, body: String },

    /// Access token expired mid-operation (provider 401).
    ///
    /// Recoverable: callers refresh and resubmit the whole file.
    #[error("access token expired: {body}")]
    AuthExpired { body: String },

    /// Folder not shared with this identity or token scope insufficient
    /// (provider 403).
    #[error("access denied: {body}")]
    AccessDenied { body: String },

    /// Malformed attributes, oversize name, unsupported characters
    /// (provider 400).
    #[error("bad request: {body}")]
    BadRequest { body: String },

    /// Name-conflict resolution itself failed; terminal, never retried.
    #[error("name conflict unresolved: {0}")]
    NameConflictUnresolved(String),

    /// Upload rejected with a status outside the handled set.
    #[error("upload failed ({status}): {body}")]
    UploadFailed { status: u16, body: String },

    /// Refresh token rejected mid-batch; the user must log in again.
    #[error("re-authentication required: {0}")]
    ReauthRequired(String),

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this failure is the recoverable token-expiry signal.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Error::AuthExpired { .. })
    }

    /// Upstream HTTP status, for variants that carry one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::AuthExchangeFailed { status, .. }
            | Error::AuthRefreshFailed { status, .. }
            | Error::IdentityLookupFailed { status, .. }
            | Error::RevokeFailed { status, .. }
            | Error::UploadFailed { status, .. } => Some(*status),
            Error::AuthExpired { .. } => Some(401),
            Error::AccessDenied { .. } => Some(403),
            Error::BadRequest { .. } => Some(400),
            _ => None,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_expired_detection() {
        let err = Error::AuthExpired {
            body: "token expired".to_string(),
        };
        assert!(err.is_auth_expired());

        let err = Error::AccessDenied {
            body: "folder not shared".to_string(),
        };
        assert!(!err.is_auth_expired());
    }

    #[test]
    fn test_status_mapping() {
        let err = Error::UploadFailed {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(err.status(), Some(503));

        let err = Error::AuthExpired {
            body: String::new(),
        };
        assert_eq!(err.status(), Some(401));

        let err = Error::Network("timeout".to_string());
        assert_eq!(err.status(), None);
    }
}

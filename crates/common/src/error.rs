//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::Unauthenticated`], [`ServiceError::TokenExpired`] → 401
/// - [`ServiceError::Forbidden`] → 403
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Conflict`] → 409
/// - [`ServiceError::EncryptionFailure`], [`ServiceError::Internal`] → 500
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed (bad identifier, scope or base64).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Credentials or bearer token could not be verified.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The bearer token was valid but has passed its expiry time.
    #[error("token expired")]
    TokenExpired,

    /// The caller is authenticated but may not perform this operation.
    #[error("forbidden")]
    Forbidden,

    /// The targeted user, group, or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent transaction changed the targeted record first.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored ciphertext failed authentication.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// A required resource is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Unauthenticated | ServiceError::TokenExpired => 401,
            ServiceError::Forbidden => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::TokenExpired => "token_expired",
            ServiceError::Forbidden => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::EncryptionFailure(_) => "encryption_failure",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

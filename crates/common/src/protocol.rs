//! Request and response types exchanged over the public HTTP API.
//!
//! Binary payloads travel as standard base64 strings; identifiers travel in
//! their canonical hyphenated UUID form.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Users and groups
// ---------------------------------------------------------------------------

/// Request body for `POST /users` and `POST /groups`.
///
/// `scopes` lists capability names (`"read"`, `"create"`, `"update"`,
/// `"delete"`, `"index"`, `"manage_object_permissions"`, `"manage_users"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopesRequest {
    pub scopes: Vec<String>,
}

/// Response body for `POST /users`.
///
/// The password is only ever returned here; it is not recoverable later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserResponse {
    pub user_id: String,
    pub password: String,
}

/// Response body for `POST /groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGroupResponse {
    pub group_id: String,
}

/// Request body for `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsResponse {
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

/// Response body for `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token to send as `Authorization: Bearer <token>`.
    pub access_token: String,
    /// Unix timestamp (seconds) after which the token is rejected.
    pub expires_at: i64,
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Request body for `POST /objects` and `PUT /objects/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRequest {
    /// Base64-encoded confidential payload.
    pub plaintext: String,
    /// Base64-encoded associated data. Stored unencrypted but integrity-protected.
    #[serde(default)]
    pub associated_data: String,
}

/// Response body for `POST /objects`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreResponse {
    pub object_id: String,
}

/// Response body for `GET /objects/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub plaintext: String,
    pub associated_data: String,
}

/// Response body for `GET /objects/:id/permissions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub principals: Vec<String>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"`.
    pub status: String,
}

//! Axum request handlers for all service endpoints.
//!
//! Each protected handler validates its path and body first, then calls
//! [`authenticate`] with the scope its operation requires, then runs the
//! core operation against the shared state. Payloads and associated data
//! travel as standard base64 in JSON.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use common::protocol::{
    ErrorResponse, GroupsResponse, HealthResponse, LoginRequest, LoginResponse, NewGroupResponse,
    NewUserResponse, ObjectRequest, PermissionsResponse, RetrieveResponse, ScopesRequest,
    StoreResponse,
};
use common::ServiceError;
use tracing::{error, warn};

use super::middleware::authenticate;
use super::state::AppState;
use crate::access::AccessError;
use crate::blob::BlobError;
use crate::identity::{
    IdentityError, ObjectId, PrincipalId, ScopeError, ScopeSet, TokenError,
};
use crate::objects::ObjectError;
use crate::storage::{with_transaction, StorageError};

/// A [`ServiceError`] rendered as a JSON [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

fn storage_error(err: StorageError) -> ServiceError {
    match err {
        StorageError::NotFound => ServiceError::NotFound("record".into()),
        StorageError::Conflict(msg) => ServiceError::Conflict(msg),
        StorageError::Internal(msg) => {
            error!(error = %msg, "storage failure");
            ServiceError::Internal("storage failure".into())
        }
    }
}

fn tampered(what: &str) -> ServiceError {
    error!(record = what, "stored ciphertext failed verification");
    ServiceError::EncryptionFailure(format!("{what} failed verification"))
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        Self(match err {
            IdentityError::InvalidId(e) => ServiceError::BadRequest(e.to_string()),
            IdentityError::Unauthenticated => ServiceError::Unauthenticated,
            IdentityError::Token(TokenError::Expired) => ServiceError::TokenExpired,
            IdentityError::Token(TokenError::Invalid) => ServiceError::Unauthenticated,
            IdentityError::Token(TokenError::ExpiryOutOfRange) => {
                error!("token ttl pushes expiry out of range");
                ServiceError::Internal("token expiry out of range".into())
            }
            IdentityError::NotFound(what) => ServiceError::NotFound(what.into()),
            IdentityError::Crypto(_) => tampered("identity record"),
            IdentityError::Encoding(msg) => ServiceError::Internal(msg),
            IdentityError::Storage(e) => storage_error(e),
        })
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        Self(match err {
            AccessError::Denied => ServiceError::Forbidden,
            AccessError::NotFound => ServiceError::NotFound("object".into()),
            AccessError::Conflict(msg) => ServiceError::Conflict(msg),
            AccessError::Crypto(_) => tampered("access record"),
            AccessError::Encoding(msg) => ServiceError::Internal(msg),
            AccessError::Storage(e) => storage_error(e),
        })
    }
}

impl From<ObjectError> for ApiError {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::Access(e) => e.into(),
            ObjectError::Crypto(_) => Self(tampered("object payload")),
            ObjectError::Blob(BlobError::NotFound(key)) => {
                error!(blob = %key, "blob missing for existing object");
                Self(ServiceError::Internal("object payload missing".into()))
            }
            ObjectError::Blob(BlobError::Internal(msg)) => {
                warn!(error = %msg, "blob store failure");
                Self(ServiceError::Unavailable("blob store".into()))
            }
        }
    }
}

impl From<ScopeError> for ApiError {
    fn from(err: ScopeError) -> Self {
        Self(ServiceError::BadRequest(err.to_string()))
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn principal_id(raw: &str) -> ApiResult<PrincipalId> {
    PrincipalId::parse(raw)
        .map_err(|e| ApiError(ServiceError::BadRequest(format!("principal id: {e}"))))
}

fn object_id(raw: &str) -> ApiResult<ObjectId> {
    ObjectId::parse(raw).map_err(|e| ApiError(ServiceError::BadRequest(format!("object id: {e}"))))
}

/// Password hashing runs on the blocking pool; a lost task is an internal error.
fn join_error(err: tokio::task::JoinError) -> ApiError {
    error!(error = %err, "blocking task failed");
    ApiError(ServiceError::Internal("worker task failed".into()))
}

fn decode_b64(field: &str, value: &str) -> ApiResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|_| ApiError(ServiceError::BadRequest(format!("{field} is not valid base64"))))
}

// ---------------------------------------------------------------------------
// Users and groups
// ---------------------------------------------------------------------------

/// `POST /users`: create a user with a default group carrying `scopes`.
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScopesRequest>,
) -> ApiResult<(StatusCode, Json<NewUserResponse>)> {
    let scopes = ScopeSet::from_names(&req.scopes)?;
    authenticate(&state, &headers, ScopeSet::MANAGE_USERS)?;
    let (user_id, password) = tokio::task::spawn_blocking(move || {
        with_transaction(&state.db, |tx| {
            state.identity.create_user_with_default_group(tx, scopes)
        })
    })
    .await
    .map_err(join_error)??;
    Ok((
        StatusCode::CREATED,
        Json(NewUserResponse {
            user_id: user_id.to_string(),
            password,
        }),
    ))
}

/// `DELETE /users/:id`
pub async fn remove_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let user_id = principal_id(&id)?;
    authenticate(&state, &headers, ScopeSet::MANAGE_USERS)?;
    with_transaction(&state.db, |tx| state.identity.remove_user(tx, user_id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /users/:id/groups`
pub async fn list_user_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<GroupsResponse>> {
    let user_id = principal_id(&id)?;
    authenticate(&state, &headers, ScopeSet::MANAGE_USERS)?;
    let groups = with_transaction(&state.db, |tx| state.identity.user_groups(tx, user_id))?;
    Ok(Json(GroupsResponse {
        groups: groups.iter().map(ToString::to_string).collect(),
    }))
}

/// `PUT /users/:id/groups/:group_id`
pub async fn add_user_to_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, group)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (user_id, group_id) = (principal_id(&id)?, principal_id(&group)?);
    authenticate(&state, &headers, ScopeSet::MANAGE_USERS)?;
    with_transaction(&state.db, |tx| {
        state.identity.add_user_to_group(tx, user_id, group_id)
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /users/:id/groups/:group_id`
pub async fn remove_user_from_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, group)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (user_id, group_id) = (principal_id(&id)?, principal_id(&group)?);
    authenticate(&state, &headers, ScopeSet::MANAGE_USERS)?;
    with_transaction(&state.db, |tx| {
        state.identity.remove_user_from_group(tx, user_id, group_id)
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /groups`
pub async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScopesRequest>,
) -> ApiResult<(StatusCode, Json<NewGroupResponse>)> {
    let scopes = ScopeSet::from_names(&req.scopes)?;
    authenticate(&state, &headers, ScopeSet::MANAGE_USERS)?;
    let group_id = with_transaction(&state.db, |tx| state.identity.new_group(tx, scopes))?;
    Ok((
        StatusCode::CREATED,
        Json(NewGroupResponse {
            group_id: group_id.to_string(),
        }),
    ))
}

/// `POST /login`: exchange a password for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user_id = principal_id(&req.user_id)?;
    let token = tokio::task::spawn_blocking({
        let state = state.clone();
        move || {
            with_transaction(&state.db, |tx| {
                state.identity.login_user(tx, user_id, &req.password, Utc::now())
            })
        }
    })
    .await
    .map_err(join_error)??;
    let access_token = state.identity.serialize_access_token(&token)?;
    Ok(Json(LoginResponse {
        access_token,
        expires_at: token.expiry.timestamp(),
    }))
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// `POST /objects`
pub async fn store_object(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ObjectRequest>,
) -> ApiResult<(StatusCode, Json<StoreResponse>)> {
    let plaintext = decode_b64("plaintext", &req.plaintext)?;
    let aad = decode_b64("associated_data", &req.associated_data)?;
    let token = authenticate(&state, &headers, ScopeSet::CREATE)?;
    let id = state.objects.store(token.principal_id, &plaintext, &aad)?;
    Ok((
        StatusCode::CREATED,
        Json(StoreResponse {
            object_id: id.to_string(),
        }),
    ))
}

/// `GET /objects/:id`
pub async fn retrieve_object(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<RetrieveResponse>> {
    let id = object_id(&id)?;
    let token = authenticate(&state, &headers, ScopeSet::READ)?;
    let got = state.objects.retrieve(token.principal_id, id)?;
    Ok(Json(RetrieveResponse {
        plaintext: STANDARD.encode(&got.plaintext),
        associated_data: STANDARD.encode(&got.associated_data),
    }))
}

/// `PUT /objects/:id`
pub async fn update_object(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ObjectRequest>,
) -> ApiResult<StatusCode> {
    let id = object_id(&id)?;
    let plaintext = decode_b64("plaintext", &req.plaintext)?;
    let aad = decode_b64("associated_data", &req.associated_data)?;
    let token = authenticate(&state, &headers, ScopeSet::UPDATE)?;
    state
        .objects
        .update(token.principal_id, id, &plaintext, &aad)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /objects/:id`: succeeds for objects that are already gone.
pub async fn delete_object(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = object_id(&id)?;
    let token = authenticate(&state, &headers, ScopeSet::DELETE)?;
    state.objects.delete(token.principal_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /objects/:id/permissions`
pub async fn list_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<PermissionsResponse>> {
    let id = object_id(&id)?;
    let token = authenticate(&state, &headers, ScopeSet::MANAGE_OBJECT_PERMISSIONS)?;
    let principals = state.objects.permissions(token.principal_id, id)?;
    Ok(Json(PermissionsResponse {
        principals: principals.iter().map(ToString::to_string).collect(),
    }))
}

/// `PUT /objects/:id/permissions/:pid`
pub async fn add_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, pid)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (id, target) = (object_id(&id)?, principal_id(&pid)?);
    let token = authenticate(&state, &headers, ScopeSet::MANAGE_OBJECT_PERMISSIONS)?;
    state.objects.add_permission(token.principal_id, id, target)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /objects/:id/permissions/:pid`
pub async fn remove_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, pid)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (id, target) = (object_id(&id)?, principal_id(&pid)?);
    let token = authenticate(&state, &headers, ScopeSet::MANAGE_OBJECT_PERMISSIONS)?;
    state
        .objects
        .remove_permission(token.principal_id, id, target)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Operational
// ---------------------------------------------------------------------------

/// `GET /health`: liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

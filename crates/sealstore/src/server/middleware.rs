//! Request guards and middleware settings shared by the router.
//!
//! Tracing, timeout enforcement, and response compression are attached as
//! tower layers in [`super::router`]; bearer-token authentication is a plain
//! function each protected handler calls with the scope it requires.

use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::Utc;
use common::ServiceError;
use tracing::debug;

use super::state::AppState;
use crate::identity::{AccessToken, IdentityError, ScopeSet, TokenError};

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const BEARER_PREFIX: &str = "Bearer ";

/// Verify the request's bearer token and check it grants `required`.
///
/// # Errors
///
/// - [`ServiceError::Unauthenticated`] for a missing, malformed or forged token.
/// - [`ServiceError::TokenExpired`] for an authentic token past its expiry.
/// - [`ServiceError::Forbidden`] when the token lacks a required scope.
pub fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    required: ScopeSet,
) -> Result<AccessToken, ServiceError> {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ServiceError::Unauthenticated)?;

    let token = state
        .identity
        .parse_access_token(raw, Utc::now())
        .map_err(|e| match e {
            IdentityError::Token(TokenError::Expired) => ServiceError::TokenExpired,
            _ => ServiceError::Unauthenticated,
        })?;

    if !token.scopes.contains(required) {
        debug!(principal = %token.principal_id, required = %required, "missing scope");
        return Err(ServiceError::Forbidden);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn issue(state: &AppState, scopes: ScopeSet, ttl: chrono::Duration) -> String {
        let token = AccessToken::mint(
            crate::identity::PrincipalId::new(),
            scopes,
            Utc::now(),
            ttl,
        )
        .unwrap();
        state.identity.serialize_access_token(&token).unwrap()
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let state = AppState::ephemeral();
        assert!(matches!(
            authenticate(&state, &HeaderMap::new(), ScopeSet::READ),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn non_bearer_scheme_is_unauthenticated() {
        let state = AppState::ephemeral();
        let token = issue(&state, ScopeSet::READ, chrono::Duration::hours(1));
        assert!(matches!(
            authenticate(&state, &bearer(&format!("Basic {token}")), ScopeSet::READ),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn forged_token_is_unauthenticated() {
        let state = AppState::ephemeral();
        assert!(matches!(
            authenticate(&state, &bearer("Bearer abc.def"), ScopeSet::READ),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn token_from_other_deployment_is_unauthenticated() {
        let other = AppState::ephemeral();
        let token = issue(&other, ScopeSet::ALL, chrono::Duration::hours(1));
        assert!(matches!(
            authenticate(&AppState::ephemeral(), &bearer(&format!("Bearer {token}")), ScopeSet::READ),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let state = AppState::ephemeral();
        let token = issue(&state, ScopeSet::READ, chrono::Duration::seconds(-10));
        assert!(matches!(
            authenticate(&state, &bearer(&format!("Bearer {token}")), ScopeSet::READ),
            Err(ServiceError::TokenExpired)
        ));
    }

    #[test]
    fn insufficient_scope_is_forbidden() {
        let state = AppState::ephemeral();
        let token = issue(&state, ScopeSet::READ | ScopeSet::CREATE, chrono::Duration::hours(1));
        let headers = bearer(&format!("Bearer {token}"));
        assert!(authenticate(&state, &headers, ScopeSet::READ).is_ok());
        assert!(matches!(
            authenticate(&state, &headers, ScopeSet::READ | ScopeSet::DELETE),
            Err(ServiceError::Forbidden)
        ));
    }
}

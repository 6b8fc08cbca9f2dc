//! Axum router construction.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/users", post(handlers::create_user))
        .route("/users/:id", delete(handlers::remove_user))
        .route("/users/:id/groups", get(handlers::list_user_groups))
        .route(
            "/users/:id/groups/:group_id",
            put(handlers::add_user_to_group).delete(handlers::remove_user_from_group),
        )
        .route("/groups", post(handlers::create_group))
        .route("/login", post(handlers::login))
        .route("/objects", post(handlers::store_object))
        .route(
            "/objects/:id",
            get(handlers::retrieve_object)
                .put(handlers::update_object)
                .delete(handlers::delete_object),
        )
        .route("/objects/:id/permissions", get(handlers::list_permissions))
        .route(
            "/objects/:id/permissions/:pid",
            put(handlers::add_permission).delete(handlers::remove_permission),
        )
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, HeaderValue, Request, StatusCode},
    };
    use axum_test::TestServer;
    use common::protocol::{
        ErrorResponse, GroupsResponse, LoginResponse, NewGroupResponse, NewUserResponse, PermissionsResponse,
        RetrieveResponse, StoreResponse,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use crate::identity::ScopeSet;
    use crate::storage::with_transaction;

    /// A server plus a logged-in administrator holding every scope.
    struct Harness {
        server: TestServer,
        state: AppState,
        admin: String,
    }

    impl Harness {
        async fn new() -> Self {
            let state = AppState::ephemeral();
            let server = TestServer::new(build(state.clone())).unwrap();
            let (id, password) = with_transaction(&state.db, |tx| {
                state
                    .identity
                    .create_user_with_default_group(tx, ScopeSet::ALL)
            })
            .unwrap();
            let mut harness = Self {
                server,
                state,
                admin: String::new(),
            };
            harness.admin = harness.login(&id.to_string(), &password).await;
            harness
        }

        async fn login(&self, user_id: &str, password: &str) -> String {
            let resp = self
                .server
                .post("/login")
                .json(&json!({ "user_id": user_id, "password": password }))
                .await;
            assert_eq!(resp.status_code(), StatusCode::OK);
            resp.json::<LoginResponse>().access_token
        }

        /// Create a user holding `scopes` and return its bearer token and ID.
        async fn user(&self, scopes: &[&str]) -> (String, String) {
            let resp = self
                .server
                .post("/users")
                .add_header(AUTHORIZATION, bearer(&self.admin))
                .json(&json!({ "scopes": scopes }))
                .await;
            assert_eq!(resp.status_code(), StatusCode::CREATED);
            let created = resp.json::<NewUserResponse>();
            let token = self.login(&created.user_id, &created.password).await;
            (token, created.user_id)
        }
    }

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build(AppState::ephemeral());
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn health_route_exists() {
        let app = build(AppState::ephemeral());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn object_routes_require_a_token() {
        let app = build(AppState::ephemeral());
        let req = Request::builder()
            .method("POST")
            .uri("/objects")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"plaintext":"Zm9v"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected_before_authentication() {
        let app = build(AppState::ephemeral());
        let req = Request::builder()
            .uri("/objects/not-a-uuid")
            .header("authorization", "Bearer garbage.token")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn store_and_retrieve_round_trip() {
        let h = Harness::new().await;
        let (u, _) = h.user(&["read", "create"]).await;

        let resp = h
            .server
            .post("/objects")
            .add_header(AUTHORIZATION, bearer(&u))
            .json(&json!({ "plaintext": "Zm9v", "associated_data": "YmFy" }))
            .await;
        assert_eq!(resp.status_code(), StatusCode::CREATED);
        let id = resp.json::<StoreResponse>().object_id;

        let resp = h
            .server
            .get(&format!("/objects/{id}"))
            .add_header(AUTHORIZATION, bearer(&u))
            .await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        let got = resp.json::<RetrieveResponse>();
        assert_eq!(got.plaintext, "Zm9v");
        assert_eq!(got.associated_data, "YmFy");

        let (v, _) = h.user(&["read", "create"]).await;
        let resp = h
            .server
            .get(&format!("/objects/{id}"))
            .add_header(AUTHORIZATION, bearer(&v))
            .await;
        assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(resp.json::<ErrorResponse>().code, "forbidden");
    }

    #[tokio::test]
    async fn missing_scope_is_forbidden() {
        let h = Harness::new().await;
        let (reader, _) = h.user(&["read"]).await;
        let resp = h
            .server
            .post("/objects")
            .add_header(AUTHORIZATION, bearer(&reader))
            .json(&json!({ "plaintext": "Zm9v" }))
            .await;
        assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);

        let resp = h
            .server
            .post("/users")
            .add_header(AUTHORIZATION, bearer(&reader))
            .json(&json!({ "scopes": ["read"] }))
            .await;
        assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn double_delete_then_not_found() {
        let h = Harness::new().await;
        let resp = h
            .server
            .post("/objects")
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .json(&json!({ "plaintext": "Zm9v" }))
            .await;
        let id = resp.json::<StoreResponse>().object_id;
        let path = format!("/objects/{id}");

        for _ in 0..2 {
            let resp = h
                .server
                .delete(&path)
                .add_header(AUTHORIZATION, bearer(&h.admin))
                .await;
            assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);
        }
        let resp = h
            .server
            .get(&path)
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sharing_and_self_removal() {
        let h = Harness::new().await;
        let (a, _) = h.user(&["read", "create", "manage_object_permissions"]).await;
        let (b, b_id) = h.user(&["read", "manage_object_permissions"]).await;

        let id = h
            .server
            .post("/objects")
            .add_header(AUTHORIZATION, bearer(&a))
            .json(&json!({ "plaintext": "c2hhcmVk" }))
            .await
            .json::<StoreResponse>()
            .object_id;

        let resp = h
            .server
            .put(&format!("/objects/{id}/permissions/{b_id}"))
            .add_header(AUTHORIZATION, bearer(&a))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);

        let listed = h
            .server
            .get(&format!("/objects/{id}/permissions"))
            .add_header(AUTHORIZATION, bearer(&b))
            .await
            .json::<PermissionsResponse>();
        assert_eq!(listed.principals.len(), 2);
        assert!(listed.principals.contains(&b_id));

        let resp = h
            .server
            .delete(&format!("/objects/{id}/permissions/{b_id}"))
            .add_header(AUTHORIZATION, bearer(&b))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);

        let resp = h
            .server
            .get(&format!("/objects/{id}"))
            .add_header(AUTHORIZATION, bearer(&b))
            .await;
        assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn update_replaces_payload() {
        let h = Harness::new().await;
        let id = h
            .server
            .post("/objects")
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .json(&json!({ "plaintext": "djE=" }))
            .await
            .json::<StoreResponse>()
            .object_id;

        let resp = h
            .server
            .put(&format!("/objects/{id}"))
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .json(&json!({ "plaintext": "djI=", "associated_data": "bWV0YQ==" }))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);

        let got = h
            .server
            .get(&format!("/objects/{id}"))
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .await
            .json::<RetrieveResponse>();
        assert_eq!(got.plaintext, "djI=");
        assert_eq!(got.associated_data, "bWV0YQ==");
    }

    #[tokio::test]
    async fn group_membership_grants_scopes_at_next_login() {
        let h = Harness::new().await;
        let resp = h
            .server
            .post("/users")
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .json(&json!({ "scopes": [] }))
            .await;
        let user = resp.json::<NewUserResponse>();

        let group = h
            .server
            .post("/groups")
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .json(&json!({ "scopes": ["create"] }))
            .await
            .json::<NewGroupResponse>();

        let before = h.login(&user.user_id, &user.password).await;
        let resp = h
            .server
            .put(&format!("/users/{}/groups/{}", user.user_id, group.group_id))
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);
        let after = h.login(&user.user_id, &user.password).await;

        let listed = h
            .server
            .get(&format!("/users/{}/groups", user.user_id))
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .await
            .json::<GroupsResponse>();
        assert_eq!(listed.groups.len(), 2);
        assert!(listed.groups.contains(&group.group_id));

        let store = |token: String| {
            h.server
                .post("/objects")
                .add_header(AUTHORIZATION, bearer(&token))
                .json(&json!({ "plaintext": "Zm9v" }))
        };
        // Tokens are stateless: the earlier token keeps its original scopes.
        assert_eq!(store(before).await.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(store(after).await.status_code(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn removed_user_cannot_log_in() {
        let h = Harness::new().await;
        let created = h
            .server
            .post("/users")
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .json(&json!({ "scopes": ["read"] }))
            .await
            .json::<NewUserResponse>();

        let path = format!("/users/{}", created.user_id);
        let resp = h
            .server
            .delete(&path)
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);

        let resp = h
            .server
            .delete(&path)
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);

        let resp = h
            .server
            .post("/login")
            .json(&json!({ "user_id": created.user_id, "password": created.password }))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(h.state.db.live_users(), 1);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let h = Harness::new().await;
        let created = h
            .server
            .post("/users")
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .json(&json!({ "scopes": ["read"] }))
            .await
            .json::<NewUserResponse>();
        let resp = h
            .server
            .post("/login")
            .json(&json!({ "user_id": created.user_id, "password": "guess" }))
            .await;
        assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.json::<ErrorResponse>().code, "unauthenticated");
    }

    #[tokio::test]
    async fn unknown_scope_name_is_bad_request() {
        let h = Harness::new().await;
        let resp = h
            .server
            .post("/groups")
            .add_header(AUTHORIZATION, bearer(&h.admin))
            .json(&json!({ "scopes": ["teleport"] }))
            .await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    }
}

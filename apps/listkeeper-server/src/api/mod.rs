// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info_span, Span};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{csrf::csrf_guard, AuthenticatedUser},
    error::{method_not_allowed, route_not_found},
    models::{
        AuthResponse, CsrfTokenResponse, LoginRequest, LogoutAllResponse, LogoutResponse,
        SignupRequest, UserProfile,
    },
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod users;

pub fn router(state: AppState) -> Router {
    // CSRF applies to every non-safe method under /api/users
    let user_routes = Router::new()
        .route("/csrf-token", get(auth::csrf_token))
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/me", get(users::get_current_user))
        .route_layer(from_fn_with_state(state.clone(), csrf_guard));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api/users", user_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::csrf_token,
        auth::signup,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::logout_all,
        users::get_current_user,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            UserProfile,
            AuthResponse,
            CsrfTokenResponse,
            LogoutResponse,
            LogoutAllResponse,
            AuthenticatedUser,
            health::ComponentStatus,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Signup, login and session lifecycle"),
        (name = "Users", description = "Current user"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthSettings;
    use crate::testing::{test_settings, test_state, test_state_with};
    use axum::{
        body::to_bytes,
        http::{
            header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
            Method, Response, StatusCode,
        },
    };
    use tower::ServiceExt;

    /// Client-side cookie jar for the two auth cookies.
    #[derive(Default, Clone)]
    struct Client {
        csrf: Option<String>,
        refresh: Option<String>,
    }

    impl Client {
        fn absorb(&mut self, response: &Response<Body>) {
            for value in response.headers().get_all(SET_COOKIE) {
                let value = value.to_str().unwrap();
                let (pair, _) = value.split_once(';').unwrap();
                let (name, cookie) = pair.split_once('=').unwrap();
                let cookie = (!cookie.is_empty()).then(|| cookie.to_string());
                match name {
                    "csrf-token" => self.csrf = cookie,
                    "refresh-token" => self.refresh = cookie,
                    other => panic!("unexpected cookie {other}"),
                }
            }
        }

        fn request(&self, method: Method, uri: &str, json: Option<serde_json::Value>) -> Request<Body> {
            let mut builder = Request::builder().method(method).uri(uri);
            let mut cookies = Vec::new();
            if let Some(csrf) = &self.csrf {
                cookies.push(format!("csrf-token={csrf}"));
                builder = builder.header("x-csrf-token", csrf);
            }
            if let Some(refresh) = &self.refresh {
                cookies.push(format!("refresh-token={refresh}"));
            }
            if !cookies.is_empty() {
                builder = builder.header(COOKIE, cookies.join("; "));
            }
            match json {
                Some(body) => builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            }
        }
    }

    async fn send(app: &Router, client: &mut Client, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        client.absorb(&response);
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, body)
    }

    async fn fetch_csrf(app: &Router, client: &mut Client) {
        let request = client.request(Method::GET, "/api/users/csrf-token", None);
        let (status, body) = send(app, client, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["csrfToken"].as_str(), client.csrf.as_deref());
    }

    async fn signup(app: &Router, client: &mut Client, email: &str, password: &str) -> (StatusCode, serde_json::Value) {
        let payload = serde_json::json!({ "email": email, "password": password });
        let request = client.request(Method::POST, "/api/users/signup", Some(payload));
        send(app, client, request).await
    }

    fn app_with(settings: AuthSettings) -> (Router, AppState, tempfile::TempDir) {
        let (state, dir) = test_state_with(settings);
        (router(state.clone()), state, dir)
    }

    #[tokio::test]
    async fn signup_refresh_me_logout_flow() {
        let (app, _state, _dir) = app_with(test_settings());
        let mut client = Client::default();
        fetch_csrf(&app, &mut client).await;

        let (status, body) = signup(&app, &mut client, " Alice@X.com ", "secret1").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "alice@x.com");
        assert!(body.get("refreshToken").is_none());
        assert!(client.refresh.is_some());
        assert_eq!(body["csrfToken"].as_str(), client.csrf.as_deref());

        // Refresh rotates both cookies
        let old_refresh = client.refresh.clone();
        let request = client.request(Method::POST, "/api/users/refresh", None);
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(client.refresh, old_refresh);
        let access = body["accessToken"].as_str().unwrap().to_string();

        // Bearer access token resolves the user
        let me = Request::builder()
            .uri("/api/users/me")
            .header(AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, &mut client.clone(), me).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "alice@x.com");

        // Logout clears cookies and kills the session
        let refresh_before_logout = client.refresh.clone();
        let request = client.request(Method::POST, "/api/users/logout", None);
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logout successful");
        assert!(client.refresh.is_none());
        assert!(client.csrf.is_none());

        fetch_csrf(&app, &mut client).await;
        client.refresh = refresh_before_logout;
        let request = client.request(Method::POST, "/api/users/refresh", None);
        let (status, _) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn state_changing_routes_require_csrf() {
        let (app, _state, _dir) = app_with(test_settings());
        let mut client = Client::default();

        let (status, body) = signup(&app, &mut client, "alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_code"], "csrf_rejected");

        // Cookie present but header forged
        fetch_csrf(&app, &mut client).await;
        let mut request = client.request(
            Method::POST,
            "/api/users/login",
            Some(serde_json::json!({ "email": "alice@x.com", "password": "secret1" })),
        );
        request
            .headers_mut()
            .insert("x-csrf-token", "forged".parse().unwrap());
        let (status, _) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn signup_validation_and_duplicates() {
        let (app, _state, _dir) = app_with(test_settings());
        let mut client = Client::default();
        fetch_csrf(&app, &mut client).await;

        let (status, body) = signup(&app, &mut client, "not-an-email", "secret1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "invalid_input");

        let (status, _) = signup(&app, &mut client, "alice@x.com", "short").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = client.request(Method::POST, "/api/users/signup", None);
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "invalid_input");

        let (status, _) = signup(&app, &mut client, "alice@x.com", "secret1").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = signup(&app, &mut client, "ALICE@x.com", "secret2").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "duplicate_email");
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (app, _state, _dir) = app_with(test_settings());
        let mut client = Client::default();
        fetch_csrf(&app, &mut client).await;
        signup(&app, &mut client, "alice@x.com", "secret1").await;

        let mut bodies = Vec::new();
        for (email, password) in [("alice@x.com", "wrong-pass"), ("nobody@x.com", "secret1")] {
            let payload = serde_json::json!({ "email": email, "password": password });
            let request = client.request(Method::POST, "/api/users/login", Some(payload));
            let (status, body) = send(&app, &mut client, request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            bodies.push(body);
        }
        assert_eq!(bodies[0], bodies[1]);

        let payload = serde_json::json!({ "email": "alice@x.com", "password": "secret1" });
        let request = client.request(Method::POST, "/api/users/login", Some(payload));
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["accessToken"].is_string());
    }

    #[tokio::test]
    async fn replayed_refresh_token_revokes_the_family() {
        // Zero grace: any replay is treated as theft
        let settings = AuthSettings {
            refresh_grace: chrono::Duration::zero(),
            ..test_settings()
        };
        let (app, _state, _dir) = app_with(settings);
        let mut client = Client::default();
        fetch_csrf(&app, &mut client).await;
        signup(&app, &mut client, "alice@x.com", "secret1").await;
        let r1 = client.refresh.clone();

        let request = client.request(Method::POST, "/api/users/refresh", None);
        let (status, _) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        let r2 = client.refresh.clone();

        let mut attacker = client.clone();
        attacker.refresh = r1;
        let request = attacker.request(Method::POST, "/api/users/refresh", None);
        let (status, body) = send(&app, &mut attacker, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "reuse_detected");

        // The legitimate branch was revoked too
        client.refresh = r2;
        let request = client.request(Method::POST, "/api/users/refresh", None);
        let (status, _) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn retry_within_grace_yields_a_rotatable_token() {
        let (app, state, _dir) = app_with(test_settings());
        let mut client = Client::default();
        fetch_csrf(&app, &mut client).await;
        signup(&app, &mut client, "alice@x.com", "secret1").await;
        let r1 = client.refresh.clone();

        let request = client.request(Method::POST, "/api/users/refresh", None);
        let (status, _) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        let r2 = client.refresh.clone().unwrap();
        let r2_session = state.tokens.verify_refresh(&r2).unwrap().jti;

        // Lost response: the client retries with the token it still holds
        client.refresh = r1;
        let request = client.request(Method::POST, "/api/users/refresh", None);
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["accessToken"].is_string());
        let resigned = client.refresh.clone().unwrap();
        assert_eq!(state.tokens.verify_refresh(&resigned).unwrap().jti, r2_session);

        // The re-signed token rotates like any live one
        let request = client.request(Method::POST, "/api/users/refresh", None);
        let (status, _) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        let r3 = client.refresh.clone().unwrap();
        assert_ne!(state.tokens.verify_refresh(&r3).unwrap().jti, r2_session);

        let request = client.request(Method::POST, "/api/users/refresh", None);
        let (status, _) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_all_requires_bearer_and_revokes_everything() {
        let (app, state, _dir) = app_with(test_settings());
        let mut client = Client::default();
        fetch_csrf(&app, &mut client).await;
        let (_, body) = signup(&app, &mut client, "alice@x.com", "secret1").await;
        let access = body["accessToken"].as_str().unwrap().to_string();
        let user_id = body["user"]["id"].as_str().unwrap().to_string();

        // Second device
        let payload = serde_json::json!({ "email": "alice@x.com", "password": "secret1" });
        let request = client.clone().request(Method::POST, "/api/users/login", Some(payload));
        send(&app, &mut client.clone(), request).await;

        let request = client.request(Method::POST, "/api/users/logout-all", None);
        let (status, _) = send(&app, &mut client.clone(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut request = client.request(Method::POST, "/api/users/logout-all", None);
        request
            .headers_mut()
            .insert(AUTHORIZATION, format!("Bearer {access}").parse().unwrap());
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["revoked"], 2);
        assert!(!crate::storage::SessionRepository::new(&state.db)
            .has_live_session(&user_id, chrono::Utc::now())
            .unwrap());

        // Strict mode: the access token dies with the sessions
        let me = Request::builder()
            .uri("/api/users/me")
            .header(AUTHORIZATION, format!("Bearer {access}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, &mut Client::default(), me).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_docs_and_fallback() {
        let (state, _dir) = test_state();
        let app = router(state);
        let mut client = Client::default();

        let request = client.request(Method::GET, "/health", None);
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["database"], "ok");

        let request = client.request(Method::GET, "/api-doc/openapi.json", None);
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/users/refresh"].is_object());

        let request = client.request(Method::GET, "/nope", None);
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found");

        let request = client.request(Method::DELETE, "/health", None);
        let (status, body) = send(&app, &mut client, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error_code"], "method_not_allowed");
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CSRF guard (double-submit cookie).
//!
//! State-changing requests must carry the CSRF cookie and an `x-csrf-token`
//! header with the same value. GET, HEAD and OPTIONS pass unchecked.
//!
//! ```rust,ignore
//! let router = Router::new()
//!     .route("/logout", post(logout))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), csrf_guard));
//! ```

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use subtle::ConstantTimeEq;

use super::cookies::read_cookie;
use super::error::AuthError;
use crate::state::AppState;

/// Header echoing the CSRF cookie value.
pub const CSRF_HEADER: &str = "x-csrf-token";

pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Length check, then a comparison whose time does not depend on where the
/// inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Both values present, non-empty and equal.
pub fn verify_double_submit(cookie: Option<&str>, header: Option<&str>) -> Result<(), AuthError> {
    match (cookie, header) {
        (Some(c), Some(h)) if !c.is_empty() && constant_time_eq(c.as_bytes(), h.as_bytes()) => Ok(()),
        _ => Err(AuthError::CsrfRejected),
    }
}

fn header_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// CSRF middleware for state-changing routes.
pub async fn csrf_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_safe_method(request.method()) {
        return next.run(request).await;
    }

    let headers = request.headers();
    let cookie = read_cookie(headers, state.cookies.csrf_cookie_name());
    if let Err(e) = verify_double_submit(cookie.as_deref(), header_token(headers)) {
        tracing::warn!(
            target: "auth.csrf.rejected",
            method = %request.method(),
            path = %request.uri().path(),
            has_cookie = cookie.is_some(),
            "CSRF check failed"
        );
        return e.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_state;
    use axum::{
        body::Body,
        http::{header::COOKIE, Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
        assert!(!constant_time_eq(b"token-a", b"token-b"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn double_submit_requires_both_and_equal() {
        assert!(verify_double_submit(Some("abc"), Some("abc")).is_ok());
        assert!(verify_double_submit(Some("abc"), Some("abd")).is_err());
        assert!(verify_double_submit(None, Some("abc")).is_err());
        assert!(verify_double_submit(Some("abc"), None).is_err());
        assert!(verify_double_submit(Some(""), Some("")).is_err());
    }

    #[test]
    fn safe_methods() {
        assert!(is_safe_method(&Method::GET));
        assert!(is_safe_method(&Method::HEAD));
        assert!(is_safe_method(&Method::OPTIONS));
        assert!(!is_safe_method(&Method::POST));
        assert!(!is_safe_method(&Method::DELETE));
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/action", post(|| async { "ok" }).get(|| async { "ok" }))
            .route_layer(from_fn_with_state(state.clone(), csrf_guard))
            .with_state(state)
    }

    fn request(method: Method, cookie: Option<&str>, header: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method(method).uri("/action");
        if let Some(value) = cookie {
            builder = builder.header(COOKIE, format!("csrf-token={value}"));
        }
        if let Some(value) = header {
            builder = builder.header(CSRF_HEADER, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn matching_cookie_and_header_pass() {
        let (state, _dir) = test_state();
        let response = app(state)
            .oneshot(request(Method::POST, Some("tok"), Some("tok")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mismatched_missing_or_swapped_values_fail() {
        let (state, _dir) = test_state();
        let cases = [
            (Some("tok"), Some("other")),
            (Some("tok"), None),
            (None, Some("tok")),
            (None, None),
        ];
        for (cookie, header) in cases {
            let response = app(state.clone())
                .oneshot(request(Method::POST, cookie, header))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{cookie:?}/{header:?}");
        }
    }

    #[tokio::test]
    async fn safe_method_bypasses_check() {
        let (state, _dir) = test_state();
        let response = app(state)
            .oneshot(request(Method::GET, None, Some("anything")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

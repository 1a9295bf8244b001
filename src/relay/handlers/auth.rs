//! Auth endpoints relayed to the gateway.
//!
//! Each handler forwards the browser's `Cookie` header (and JSON body where the
//! operation takes one), answers with the gateway's status and JSON body, and
//! re-issues the gateway's cookies under the relay's own attributes.

use super::types::{ErrorBody, LoginRequest, RegisterRequest};
use crate::relay::{
    RelayState,
    cookies::{CookiePolicy, clear_session_cookies, write_cookies},
    gateway::{GatewayBody, GatewayResponse, SERVICE_UNAVAILABLE_MESSAGE},
};
use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{
        HeaderMap, Method, StatusCode,
        header::{COOKIE, LOCATION},
    },
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

const LOGOUT_FAILED_MESSAGE: &str = "Logout failed";
const INVALID_BODY_MESSAGE: &str = "Invalid request body";

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookies set"),
        (status = 400, description = "Malformed request body", body = ErrorBody),
        (status = 401, description = "Rejected by the gateway"),
        (status = 502, description = "Gateway unreachable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    relay: Extension<Arc<RelayState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, INVALID_BODY_MESSAGE);
    };
    forward(&relay, Method::POST, "auth/login", &headers, GatewayBody::Json(body)).await
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "Malformed request body", body = ErrorBody),
        (status = 409, description = "Account already exists"),
        (status = 502, description = "Gateway unreachable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    relay: Extension<Arc<RelayState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, INVALID_BODY_MESSAGE);
    };
    forward(
        &relay,
        Method::POST,
        "auth/register",
        &headers,
        GatewayBody::Json(body),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "Access token renewed"),
        (status = 401, description = "Refresh token missing or expired"),
        (status = 502, description = "Gateway unreachable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(headers: HeaderMap, relay: Extension<Arc<RelayState>>) -> Response {
    forward(&relay, Method::POST, "auth/refresh", &headers, GatewayBody::Empty).await
}

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Profile of the signed-in user"),
        (status = 401, description = "Not signed in"),
        (status = 502, description = "Gateway unreachable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn profile(headers: HeaderMap, relay: Extension<Arc<RelayState>>) -> Response {
    forward(&relay, Method::GET, "auth/profile", &headers, GatewayBody::Empty).await
}

#[utoipa::path(
    get,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Signed out; session cookies cleared"),
        (status = 500, description = "Gateway unreachable; cookies cleared anyway", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, relay: Extension<Arc<RelayState>>) -> Response {
    sign_out(&relay, &headers).await
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Signed out; session cookies cleared"),
        (status = 500, description = "Gateway unreachable; cookies cleared anyway", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout_post(headers: HeaderMap, relay: Extension<Arc<RelayState>>) -> Response {
    sign_out(&relay, &headers).await
}

async fn sign_out(relay: &RelayState, headers: &HeaderMap) -> Response {
    let policy = relay.config().cookie_policy();
    let mut response = match relay
        .gateway()
        .forward(
            Method::GET,
            "auth/logout",
            None,
            headers.get(COOKIE),
            GatewayBody::Empty,
        )
        .await
    {
        Ok(upstream) => relay_response(upstream, &policy),
        Err(err) => {
            error!("Gateway logout failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, LOGOUT_FAILED_MESSAGE)
        }
    };

    // Clearing happens last so it wins over anything the gateway sent.
    clear_session_cookies(response.headers_mut(), &policy);
    response
}

async fn forward(
    relay: &RelayState,
    method: Method,
    upstream_path: &str,
    headers: &HeaderMap,
    body: GatewayBody,
) -> Response {
    match relay
        .gateway()
        .forward(method, upstream_path, None, headers.get(COOKIE), body)
        .await
    {
        Ok(upstream) => relay_response(upstream, &relay.config().cookie_policy()),
        Err(err) => {
            error!("Gateway {upstream_path} failed: {err}");
            error_response(StatusCode::BAD_GATEWAY, SERVICE_UNAVAILABLE_MESSAGE)
        }
    }
}

/// Build the browser response from a gateway answer; cookies only on 2xx,
/// `Location` only on 3xx.
pub(crate) fn relay_response(upstream: GatewayResponse, policy: &CookiePolicy) -> Response {
    let mut headers = HeaderMap::new();
    if upstream.is_success() {
        let written = write_cookies(&mut headers, &upstream.cookies, policy);
        if written < upstream.cookies.len() {
            warn!(
                "Relayed {written} of {} gateway cookies",
                upstream.cookies.len()
            );
        }
    }
    if let Some(location) = upstream.location {
        headers.insert(LOCATION, location);
    }
    (upstream.status, headers, Json(upstream.body)).into_response()
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

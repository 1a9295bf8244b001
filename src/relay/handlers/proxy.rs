//! Same-origin pass-through to the franchise, catalog and command services.

use super::auth::{error_response, relay_response};
use crate::relay::{
    RelayState,
    gateway::{GatewayBody, SERVICE_UNAVAILABLE_MESSAGE, gateway_segments},
};
use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::{
        HeaderMap, Method, StatusCode, Uri,
        header::{CONTENT_TYPE, COOKIE},
    },
    response::Response,
};
use std::sync::Arc;
use tracing::error;

pub async fn proxy(
    method: Method,
    uri: Uri,
    Path(path): Path<String>,
    headers: HeaderMap,
    relay: Extension<Arc<RelayState>>,
    body: Bytes,
) -> Response {
    // `auth/*` has dedicated handlers with logout and refresh semantics.
    let forwardable = gateway_segments(&path)
        .and_then(|segments| segments.first().map(|first| !first.eq_ignore_ascii_case("auth")))
        .unwrap_or(false);
    if !forwardable {
        return error_response(StatusCode::NOT_FOUND, "Not found");
    }

    let body = if body.is_empty() {
        GatewayBody::Empty
    } else {
        GatewayBody::Raw {
            bytes: body,
            content_type: headers.get(CONTENT_TYPE).cloned(),
        }
    };

    match relay
        .gateway()
        .forward(method, &path, uri.query(), headers.get(COOKIE), body)
        .await
    {
        Ok(upstream) => relay_response(upstream, &relay.config().cookie_policy()),
        Err(err) => {
            error!("Gateway pass-through to {path} failed: {err}");
            error_response(StatusCode::BAD_GATEWAY, SERVICE_UNAVAILABLE_MESSAGE)
        }
    }
}

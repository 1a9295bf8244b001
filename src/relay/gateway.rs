//! HTTP client for the upstream auth/franchise gateway.

use super::{
    config::RelayConfig,
    cookies::{ACCESS_TOKEN_COOKIE, CookieDescriptor, find_cookie, parse_set_cookie_headers},
};
use crate::APP_USER_AGENT;
use axum::{
    body::Bytes,
    http::{
        HeaderValue, Method, StatusCode,
        header::{CONTENT_TYPE, COOKIE, LOCATION},
    },
};
use reqwest::{Client, redirect::Policy};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{Instrument, debug, info_span, warn};
use url::Url;

pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable";
pub const OPERATION_FAILED_MESSAGE: &str = "operation failed";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway path not allowed: {0}")]
    Disallowed(String),
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Request body forwarded upstream.
#[derive(Debug, Clone, Default)]
pub enum GatewayBody {
    #[default]
    Empty,
    Json(Value),
    Raw {
        bytes: Bytes,
        content_type: Option<HeaderValue>,
    },
}

/// Upstream answer with the body already negotiated into JSON.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: Value,
    pub cookies: Vec<CookieDescriptor>,
    /// Target of an upstream 3xx, relayed as-is.
    pub location: Option<HeaderValue>,
}

impl GatewayResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Outcome of a successful silent refresh.
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    pub access_token: String,
    pub cookies: Vec<CookieDescriptor>,
}

#[derive(Clone, Debug)]
pub struct GatewayClient {
    client: Client,
    base_url: Url,
}

impl GatewayClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &RelayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.gateway_timeout())
            // Redirects from the gateway are relayed, not followed.
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: config.gateway_url().clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Forward one request to `path` (relative to the gateway base URL).
    ///
    /// # Errors
    /// Returns an error only for transport failures; upstream error statuses are
    /// returned as a normal [`GatewayResponse`].
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        cookie: Option<&HeaderValue>,
        body: GatewayBody,
    ) -> Result<GatewayResponse, GatewayError> {
        let url = self.upstream_url(path, query)?;

        let span = info_span!(
            "gateway.request",
            http.method = %method,
            url.path = url.path(),
            http.status_code = tracing::field::Empty
        );

        let mut request = self.client.request(method, url);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie.clone());
        }
        request = match body {
            GatewayBody::Empty => request,
            GatewayBody::Json(value) => request.json(&value),
            GatewayBody::Raw {
                bytes,
                content_type,
            } => {
                let request = match content_type {
                    Some(content_type) => request.header(CONTENT_TYPE, content_type),
                    None => request,
                };
                request.body(bytes)
            }
        };

        async move {
            let response = request.send().await?;
            let status = response.status();
            tracing::Span::current().record("http.status_code", status.as_u16());

            let cookies = parse_set_cookie_headers(response.headers());
            let location = status
                .is_redirection()
                .then(|| response.headers().get(LOCATION).cloned())
                .flatten();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = match response.bytes().await {
                Ok(bytes) => negotiate_body(status, content_type.as_deref(), &bytes),
                Err(err) => {
                    warn!("Failed to read gateway response body: {err}");
                    json!({ "error": SERVICE_UNAVAILABLE_MESSAGE })
                }
            };

            Ok::<_, GatewayError>(GatewayResponse {
                status,
                body,
                cookies,
                location,
            })
        }
        .instrument(span)
        .await
    }

    /// Gateway URL for `path`, built segment by segment under the base path.
    fn upstream_url(&self, path: &str, query: Option<&str>) -> Result<Url, GatewayError> {
        let disallowed = || GatewayError::Disallowed(path.to_string());
        let segments = gateway_segments(path).ok_or_else(disallowed)?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| disallowed())?
            .pop_if_empty()
            .extend(segments);
        url.set_query(query.filter(|q| !q.is_empty()));

        if url.origin() != self.base_url.origin() {
            return Err(disallowed());
        }
        Ok(url)
    }

    /// Ask the gateway for a new access token using the caller's cookies.
    ///
    /// Any failure (transport, non-2xx, no `accessToken` cookie) yields `None`.
    pub async fn refresh(&self, cookie: Option<&HeaderValue>) -> Option<RefreshedSession> {
        let response = match self
            .forward(Method::POST, "auth/refresh", None, cookie, GatewayBody::Empty)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!("Silent refresh failed: {err}");
                return None;
            }
        };

        if !response.is_success() {
            debug!("Silent refresh rejected with status {}", response.status);
            return None;
        }

        let Some(access_token) =
            find_cookie(&response.cookies, ACCESS_TOKEN_COOKIE).map(|c| c.value.clone())
        else {
            debug!("Silent refresh returned no access token cookie");
            return None;
        };

        Some(RefreshedSession {
            access_token,
            cookies: response.cookies,
        })
    }

    /// True when the gateway answers at all (any status).
    pub async fn reachable(&self) -> bool {
        match self.client.get(self.base_url.clone()).send().await {
            Ok(_) => true,
            Err(err) => {
                debug!("Gateway unreachable: {err}");
                false
            }
        }
    }
}

/// Split a relative gateway path into segments.
///
/// `None` for paths that could step outside the gateway base path: `.` or `..`
/// segments, empty segments other than a trailing slash, backslashes, or an
/// empty path.
#[must_use]
pub fn gateway_segments(path: &str) -> Option<Vec<&str>> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len() - 1;
    segments
        .iter()
        .enumerate()
        .all(|(index, segment)| {
            !matches!(*segment, "." | "..")
                && !segment.contains('\\')
                && (!segment.is_empty() || index == last)
        })
        .then_some(segments)
}

/// Turn an upstream body into JSON, synthesizing an error object when it is not JSON.
#[must_use]
pub fn negotiate_body(status: StatusCode, content_type: Option<&str>, bytes: &[u8]) -> Value {
    let declared_json = content_type.is_some_and(is_json_content_type);
    let mut parse_failed = false;

    if !bytes.is_empty() && (declared_json || content_type.is_none()) {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => return value,
            Err(err) => {
                debug!("Gateway body is not valid JSON: {err}");
                parse_failed = declared_json;
            }
        }
    }

    if status.is_server_error() || parse_failed {
        json!({ "error": SERVICE_UNAVAILABLE_MESSAGE })
    } else if status.is_success() {
        json!({ "success": true })
    } else {
        json!({ "error": OPERATION_FAILED_MESSAGE })
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

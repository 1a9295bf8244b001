//! Shared helpers for the relay integration suites.
//!
//! Tokens are signed with the fixture key in `tests/fixtures`; the relay under
//! test is configured with the matching public key and pointed at a wiremock
//! gateway.

#![allow(dead_code, clippy::unwrap_used)]

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header::SET_COOKIE},
};
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use rsa::{
    RsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::DecodePrivateKey,
    signature::{SignatureEncoding, Signer},
};
use serde_json::{Value, json};
use session_relay::relay::{self, RelayState, config::RelayConfig, token::TokenCodec};
use sha2::Sha256;
use std::{
    net::TcpListener,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

const PRIVATE_KEY_PEM: &str = include_str!("../fixtures/relay_test_key.pem");
const PUBLIC_KEY_PEM: &str = include_str!("../fixtures/relay_test_key.pub.pem");

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .get("location")
            .and_then(|value| value.to_str().ok())
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_string())
            .collect()
    }
}

pub fn now() -> i64 {
    i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs(),
    )
    .unwrap()
}

pub fn claims(role: Value, exp: i64) -> Value {
    json!({
        "sub": "user-42",
        "role": role,
        "username": "marco",
        "email": "marco@franchise.dev",
        "franchiseId": "fr-7",
        "iat": exp - 300,
        "exp": exp,
    })
}

pub fn sign(claims: &Value) -> String {
    let header = Base64UrlUnpadded::encode_string(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
    let signing_input = format!("{header}.{payload}");
    let key = RsaPrivateKey::from_pkcs8_pem(PRIVATE_KEY_PEM).unwrap();
    let signature = SigningKey::<Sha256>::new(key).sign(signing_input.as_bytes());
    format!(
        "{signing_input}.{}",
        Base64UrlUnpadded::encode_string(&signature.to_vec())
    )
}

/// Valid token for `role` expiring in five minutes.
pub fn valid_token(role: &str) -> String {
    sign(&claims(json!(role), now() + 300))
}

pub fn expired_token(role: &str) -> String {
    sign(&claims(json!(role), now() - 60))
}

pub fn config(gateway_url: &str) -> RelayConfig {
    RelayConfig::new(gateway_url)
        .unwrap()
        .with_gateway_timeout(Duration::from_secs(2))
}

pub fn relay_with(config: RelayConfig) -> Router {
    let codec = TokenCodec::from_base64(&Base64::encode_string(PUBLIC_KEY_PEM.as_bytes())).unwrap();
    let state = RelayState::new(config, codec).unwrap();
    relay::router(Arc::new(state))
}

pub fn relay(gateway_url: &str) -> Router {
    relay_with(config(gateway_url))
}

/// A URL on a local port nothing listens on.
pub fn unreachable_gateway() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

pub async fn send(app: &Router, request: Request<Body>) -> Result<Reply> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await?.to_vec();
    Ok(Reply {
        status,
        headers,
        body,
    })
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

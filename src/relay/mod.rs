//! The session relay HTTP service.

pub mod config;
pub mod cookies;
pub mod gateway;
pub mod guard;
pub mod handlers;
pub mod token;

mod openapi;

pub use openapi::openapi;

use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Json, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
    routing::{any, get},
};
use config::RelayConfig;
use gateway::{GatewayClient, GatewayError};
use handlers::{pages, proxy};
use std::{fmt, sync::Arc};
use token::TokenCodec;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

/// Shared, immutable state for every request.
pub struct RelayState {
    config: RelayConfig,
    codec: TokenCodec,
    gateway: GatewayClient,
}

impl RelayState {
    /// # Errors
    /// Returns an error if the gateway HTTP client cannot be built.
    pub fn new(config: RelayConfig, codec: TokenCodec) -> Result<Self, GatewayError> {
        let gateway = GatewayClient::new(&config)?;
        Ok(Self {
            config,
            codec,
            gateway,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }
}

impl fmt::Debug for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayState")
            .field("config", &self.config)
            .field("gateway", &self.gateway.base_url().as_str())
            .finish_non_exhaustive()
    }
}

/// Every relay route with the shared state attached, without the outer
/// request-id, tracing and CORS layers.
#[must_use]
pub fn router(state: Arc<RelayState>) -> Router {
    let (api, spec) = openapi::api_router().split_for_parts();

    api.route(
        "/openapi.json",
        get(move || {
            let spec = spec.clone();
            async move { Json(spec) }
        }),
    )
    .route("/api/gateway/{*path}", any(proxy::proxy))
    .merge(pages::router(state.config()))
    .layer(Extension(state))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<RelayState>, cors_origin: Option<&str>) -> Result<()> {
    let cors = match cors_origin {
        Some(url) => CorsLayer::new()
            .allow_headers([CONTENT_TYPE])
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_origin(AllowOrigin::exact(frontend_origin(url)?))
            .allow_credentials(true),
        None => CorsLayer::new(),
    };

    let gateway = state.gateway().base_url().to_string();
    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{port}, relaying to {gateway}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
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

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend origin: {frontend_base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend origin must include a valid host: {frontend_base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_drops_path() {
        let origin = frontend_origin("https://admin.franchise.dev:8443/app/").unwrap();
        assert_eq!(origin, "https://admin.franchise.dev:8443");
        let origin = frontend_origin("http://localhost:5173").unwrap();
        assert_eq!(origin, "http://localhost:5173");
    }

    #[test]
    fn frontend_origin_requires_host() {
        assert!(frontend_origin("not a url").is_err());
        assert!(frontend_origin("mailto:ops@franchise.dev").is_err());
    }
}

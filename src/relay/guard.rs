//! Route guard for the protected back-office and the public auth pages.
//!
//! Every request that reaches a page under the protected prefix either carries a
//! verified, role-checked access token, gets one through a silent refresh, or is
//! redirected to the login page. The guard never fails the request itself.

use super::{
    RelayState,
    config::RelayConfig,
    cookies::{
        ACCESS_TOKEN_COOKIE, CookieDescriptor, REFRESH_TOKEN_COOKIE, clear_cookie,
        request_cookie, with_cookie, write_cookies,
    },
    token::SessionClaims,
};
use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, HeaderValue, header::COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, info};
use url::form_urlencoded;

/// Where a request ended up in the guard's decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    PublicRoute,
    NoToken,
    TokenPresentValid,
    TokenPresentInvalid,
    RefreshAttempted,
}

impl GuardState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PublicRoute => "PUBLIC_ROUTE",
            Self::NoToken => "NO_TOKEN",
            Self::TokenPresentValid => "TOKEN_PRESENT_VALID",
            Self::TokenPresentInvalid => "TOKEN_PRESENT_INVALID",
            Self::RefreshAttempted => "REFRESH_ATTEMPTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Let the request through, optionally with refreshed cookies.
    Allow {
        claims: Option<SessionClaims>,
        cookies: Vec<CookieDescriptor>,
        cookie_header: Option<String>,
    },
    Redirect {
        location: String,
        cookies: Vec<CookieDescriptor>,
        clear: Vec<&'static str>,
    },
}

impl Decision {
    fn pass() -> Self {
        Self::Allow {
            claims: None,
            cookies: Vec::new(),
            cookie_header: None,
        }
    }

    fn redirect(location: String) -> Self {
        Self::Redirect {
            location,
            cookies: Vec::new(),
            clear: Vec::new(),
        }
    }

    fn redirect_clearing(location: String, clear: Vec<&'static str>) -> Self {
        Self::Redirect {
            location,
            cookies: Vec::new(),
            clear,
        }
    }
}

/// axum middleware applying [`evaluate`] to page requests.
pub async fn require_session(
    relay: Extension<Arc<RelayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let config = relay.config();
    let path = request.uri().path().to_string();
    if !config.is_public(&path) && !config.is_protected(&path) {
        return next.run(request).await;
    }

    let query = request.uri().query().map(str::to_string);
    let (state, decision) = evaluate(&relay, &path, query.as_deref(), request.headers()).await;
    let policy = config.cookie_policy();

    match decision {
        Decision::Allow {
            claims,
            cookies,
            cookie_header,
        } => {
            debug!(guard.state = state.as_str(), "Guard allowed {path}");
            if let Some(value) = cookie_header.and_then(|h| HeaderValue::from_str(&h).ok()) {
                request.headers_mut().insert(COOKIE, value);
            }
            if let Some(claims) = claims {
                request.extensions_mut().insert(claims);
            }
            let mut response = next.run(request).await;
            write_cookies(response.headers_mut(), &cookies, &policy);
            response
        }
        Decision::Redirect {
            location,
            cookies,
            clear,
        } => {
            info!(guard.state = state.as_str(), "Guard redirected {path} to {location}");
            let mut response = Redirect::temporary(&location).into_response();
            write_cookies(response.headers_mut(), &cookies, &policy);
            for name in clear {
                clear_cookie(response.headers_mut(), name, &policy);
            }
            response
        }
    }
}

/// Decide what happens to a page request at `path`.
pub async fn evaluate(
    relay: &RelayState,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
) -> (GuardState, Decision) {
    let config = relay.config();
    let access = request_cookie(headers, ACCESS_TOKEN_COOKIE);
    let refresh = request_cookie(headers, REFRESH_TOKEN_COOKIE);

    if config.is_public(path) {
        return public_route(relay, query, headers, access.as_deref(), refresh.is_some()).await;
    }

    let claims = access.as_deref().and_then(|token| relay.codec().decode(token));
    match (access.is_some(), claims, refresh.is_some()) {
        (false, _, false) => (GuardState::NoToken, Decision::redirect(login_redirect(config, path))),
        (_, Some(claims), _) => (GuardState::TokenPresentValid, authorize(config, claims)),
        // Missing or unusable access token with a refresh token: try to renew.
        (had_access, None, true) => {
            let clear = if had_access {
                vec![ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE]
            } else {
                vec![REFRESH_TOKEN_COOKIE]
            };
            (
                GuardState::RefreshAttempted,
                refresh_and_continue(relay, path, headers, clear).await,
            )
        }
        (true, None, false) => (
            GuardState::TokenPresentInvalid,
            Decision::redirect_clearing(
                login_redirect(config, path),
                vec![ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE],
            ),
        ),
    }
}

async fn public_route(
    relay: &RelayState,
    query: Option<&str>,
    headers: &HeaderMap,
    access: Option<&str>,
    has_refresh: bool,
) -> (GuardState, Decision) {
    let config = relay.config();
    // Sessions the protected area would turn away stay on the public page.
    let admitted = |claims: &SessionClaims| claims.has_any_role(config.allowed_roles());

    if let Some(token) = access {
        if relay.codec().decode(token).is_some_and(|claims| admitted(&claims)) {
            return (
                GuardState::PublicRoute,
                Decision::redirect(config.home_path().to_string()),
            );
        }
        return (GuardState::PublicRoute, Decision::pass());
    }

    if !has_refresh {
        return (GuardState::PublicRoute, Decision::pass());
    }

    match relay.gateway().refresh(headers.get(COOKIE)).await {
        Some(refreshed)
            if relay
                .codec()
                .decode(&refreshed.access_token)
                .is_some_and(|claims| admitted(&claims)) =>
        {
            (
                GuardState::RefreshAttempted,
                Decision::Redirect {
                    location: redirect_target(query, config.home_path()),
                    cookies: refreshed.cookies,
                    clear: Vec::new(),
                },
            )
        }
        // Best effort: the login page still renders if the refresh did not work.
        _ => (GuardState::PublicRoute, Decision::pass()),
    }
}

async fn refresh_and_continue(
    relay: &RelayState,
    path: &str,
    headers: &HeaderMap,
    clear_on_failure: Vec<&'static str>,
) -> Decision {
    let config = relay.config();
    let failed = || Decision::redirect_clearing(login_redirect(config, path), clear_on_failure.clone());

    let Some(refreshed) = relay.gateway().refresh(headers.get(COOKIE)).await else {
        return failed();
    };
    let Some(claims) = relay.codec().decode(&refreshed.access_token) else {
        debug!("Refreshed access token did not verify");
        return failed();
    };
    if !claims.has_any_role(config.allowed_roles()) {
        return Decision::redirect(unauthorized_redirect(config));
    }

    let original = headers.get(COOKIE).and_then(|value| value.to_str().ok());
    let cookie_header = refreshed
        .cookies
        .iter()
        .fold(original.map(str::to_string), |header, cookie| {
            Some(with_cookie(header.as_deref(), &cookie.name, &cookie.value))
        });

    Decision::Allow {
        claims: Some(claims),
        cookies: refreshed.cookies,
        cookie_header,
    }
}

fn authorize(config: &RelayConfig, claims: SessionClaims) -> Decision {
    if claims.has_any_role(config.allowed_roles()) {
        Decision::Allow {
            claims: Some(claims),
            cookies: Vec::new(),
            cookie_header: None,
        }
    } else {
        debug!("Role check failed for subject {}", claims.subject_id);
        Decision::redirect(unauthorized_redirect(config))
    }
}

/// `login?redirect=<path>` with the original path percent-encoded.
#[must_use]
pub fn login_redirect(config: &RelayConfig, path: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect", path)
        .finish();
    format!("{}?{query}", config.login_path())
}

#[must_use]
pub fn unauthorized_redirect(config: &RelayConfig) -> String {
    format!("{}?error=unauthorized", config.login_path())
}

/// The `redirect` query parameter when it is a local path, otherwise `fallback`.
#[must_use]
pub fn redirect_target(query: Option<&str>, fallback: &str) -> String {
    query
        .and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "redirect")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|target| is_local_path(target))
        .unwrap_or_else(|| fallback.to_string())
}

fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> RelayConfig {
        RelayConfig::new("http://gateway.local").unwrap()
    }

    #[test]
    fn login_redirect_encodes_original_path() {
        assert_eq!(
            login_redirect(&config(), "/dashboard/orders"),
            "/login?redirect=%2Fdashboard%2Forders"
        );
    }

    #[test]
    fn unauthorized_redirect_uses_error_parameter() {
        assert_eq!(unauthorized_redirect(&config()), "/login?error=unauthorized");
    }

    #[test]
    fn redirect_target_accepts_local_paths_only() {
        assert_eq!(
            redirect_target(Some("redirect=%2Fdashboard%2Fstock"), "/dashboard"),
            "/dashboard/stock"
        );
        assert_eq!(
            redirect_target(Some("redirect=%2F%2Fevil.example"), "/dashboard"),
            "/dashboard"
        );
        assert_eq!(
            redirect_target(Some("redirect=https%3A%2F%2Fevil.example"), "/dashboard"),
            "/dashboard"
        );
        assert_eq!(redirect_target(None, "/dashboard"), "/dashboard");
        assert_eq!(redirect_target(Some("other=1"), "/dashboard"), "/dashboard");
    }

    #[test]
    fn guard_state_names() {
        assert_eq!(GuardState::NoToken.as_str(), "NO_TOKEN");
        assert_eq!(GuardState::RefreshAttempted.as_str(), "REFRESH_ATTEMPTED");
    }
}

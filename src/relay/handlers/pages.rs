//! Minimal server-rendered pages behind the guard.
//!
//! The storefront renders the real screens; these placeholders let the relay
//! run on its own and give the guard something to protect.

use crate::relay::{config::RelayConfig, guard, token::SessionClaims};
use axum::{
    Json, Router,
    extract::Extension,
    http::Uri,
    middleware,
    response::{Html, IntoResponse},
    routing::get,
};
use std::collections::BTreeSet;

/// Page routes for the public auth screens and the protected area, wrapped in the guard.
pub fn router(config: &RelayConfig) -> Router {
    let mut public: BTreeSet<&str> = config.public_paths().iter().map(String::as_str).collect();
    public.insert(config.login_path());

    let mut protected: BTreeSet<String> = BTreeSet::new();
    protected.insert(config.protected_prefix().to_string());
    protected.insert(config.home_path().to_string());
    protected.insert(if config.protected_prefix() == "/" {
        "/{*rest}".to_string()
    } else {
        format!("{}/{{*rest}}", config.protected_prefix())
    });
    protected.insert(format!(
        "{}/session",
        config.protected_prefix().trim_end_matches('/')
    ));

    let mut router = Router::new();
    for path in &public {
        router = router.route(path, get(public_page));
    }
    for path in protected.iter().filter(|p| !public.contains(p.as_str())) {
        router = if path.ends_with("/session") {
            router.route(path, get(session))
        } else {
            router.route(path, get(home))
        };
    }

    router.layer(middleware::from_fn(guard::require_session))
}

async fn public_page(uri: Uri) -> impl IntoResponse {
    let title = match uri.path().rsplit('/').next().unwrap_or_default() {
        "register" => "Create an account",
        "forgot-password" => "Forgot password",
        "reset-password" => "Reset password",
        _ => "Sign in",
    };
    render(title, "<form method=\"post\"></form>")
}

async fn home(uri: Uri, claims: Option<Extension<SessionClaims>>) -> impl IntoResponse {
    let greeting = claims.map_or_else(
        || "Back-office".to_string(),
        |Extension(claims)| format!("Welcome back, {}", escape(&claims.username)),
    );
    render("Back-office", &format!("<p>{greeting}</p><p>{}</p>", escape(uri.path())))
}

async fn session(claims: Option<Extension<SessionClaims>>) -> impl IntoResponse {
    Json(claims.map(|Extension(claims)| claims))
}

fn render(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title}</title></head><body><h1>{title}</h1>{body}</body></html>"
    ))
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<b>\"x\" & y</b>"), "&lt;b&gt;&quot;x&quot; &amp; y&lt;/b&gt;");
    }
}

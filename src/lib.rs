//! # Session relay
//!
//! `session-relay` sits between the browser and the franchise platform's
//! gateway. It verifies the signed access token carried in the `accessToken`
//! cookie before letting a request reach the back-office pages, refreshes it
//! silently through the gateway when a `refreshToken` cookie is available, and
//! relays the auth endpoints (`login`, `logout`, `refresh`, `register`,
//! `profile`) so that the browser and the relay share one session.
//!
//! ## Cookies
//!
//! Gateway `Set-Cookie` headers are never copied verbatim. Each one is parsed
//! into a name, a value and an optional `Max-Age`, then written again as
//! `HttpOnly; SameSite=Lax; Path=/`, plus `Secure` in production and an
//! optional `Domain` override.
//!
//! ## Client toolkit
//!
//! [`client`] holds the pieces a non-browser front end needs: an observable
//! [`client::Store`] with pluggable persistence, the [`client::Cart`], a
//! cookie-aware [`client::SessionClient`] and a [`client::keepalive`] task that
//! refreshes the session before the access token expires.

pub mod cli;
pub mod client;
pub mod relay;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

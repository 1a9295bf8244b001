//! Map validated CLI arguments to the action that runs the relay.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_FRONTEND_ORIGIN, ARG_PORT, gateway, guard, session};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let frontend_origin = matches
        .get_one::<String>(ARG_FRONTEND_ORIGIN)
        .cloned()
        .filter(|v| !v.trim().is_empty());

    let gateway_opts = gateway::Options::parse(matches)?;
    let session_opts = session::Options::parse(matches)?;
    let guard_opts = guard::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        gateway_url: gateway_opts.url,
        gateway_timeout_seconds: gateway_opts.timeout_seconds,
        public_key: session_opts.public_key,
        production: session_opts.production,
        cookie_domain: session_opts.cookie_domain,
        protected_prefix: guard_opts.protected_prefix,
        home_path: guard_opts.home_path,
        login_path: guard_opts.login_path,
        public_paths: guard_opts.public_paths,
        allowed_roles: guard_opts.allowed_roles,
        frontend_origin,
    }))
}

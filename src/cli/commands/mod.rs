pub mod gateway;
pub mod guard;
pub mod logging;
pub mod session;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_FRONTEND_ORIGIN: &str = "frontend-origin";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("session-relay")
        .about("Session relay and gateway proxy for the franchise back-office")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("SESSION_RELAY_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_ORIGIN)
                .long(ARG_FRONTEND_ORIGIN)
                .help("Browser origin allowed to call the API with credentials (CORS)")
                .env("SESSION_RELAY_FRONTEND_ORIGIN"),
        );

    let command = gateway::with_args(command);
    let command = session::with_args(command);
    let command = guard::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "LS0tLS1CRUdJTiBQVUJMSUMgS0VZLS0tLS0K";

    const VARS: [&str; 13] = [
        "SESSION_RELAY_PORT",
        "SESSION_RELAY_GATEWAY_URL",
        "SESSION_RELAY_GATEWAY_TIMEOUT_SECONDS",
        "SESSION_RELAY_PUBLIC_KEY",
        "SESSION_RELAY_PRODUCTION",
        "SESSION_RELAY_COOKIE_DOMAIN",
        "SESSION_RELAY_PROTECTED_PREFIX",
        "SESSION_RELAY_HOME_PATH",
        "SESSION_RELAY_LOGIN_PATH",
        "SESSION_RELAY_PUBLIC_PATHS",
        "SESSION_RELAY_ALLOWED_ROLES",
        "SESSION_RELAY_FRONTEND_ORIGIN",
        "SESSION_RELAY_LOG_LEVEL",
    ];

    // Every relay variable unset except `overrides`.
    fn env_with(
        overrides: &[(&'static str, &'static str)],
    ) -> Vec<(&'static str, Option<&'static str>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| *value);
                (*name, value)
            })
            .collect()
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "session-relay");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Session relay and gateway proxy for the franchise back-office".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(env_with(&[]), || {
            let matches = new().get_matches_from(vec![
                "session-relay",
                "--gateway-url",
                "http://gateway.local:4000",
                "--public-key",
                KEY,
            ]);

            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
            assert_eq!(
                matches
                    .get_one::<u64>(gateway::ARG_GATEWAY_TIMEOUT_SECONDS)
                    .copied(),
                Some(10)
            );
            assert!(!matches.get_flag(session::ARG_PRODUCTION));

            let guard = guard::Options::parse(&matches);
            assert_eq!(guard.protected_prefix, "/dashboard");
            assert_eq!(guard.login_path, "/login");
            assert_eq!(
                guard.public_paths,
                ["/login", "/register", "/forgot-password", "/reset-password"]
            );
            assert_eq!(guard.allowed_roles, ["admin", "franchise_owner", "manager"]);
        });
    }

    #[test]
    fn test_check_env() {
        let vars = env_with(&[
            ("SESSION_RELAY_PORT", "3000"),
            ("SESSION_RELAY_GATEWAY_URL", "https://api.franchise.dev"),
            ("SESSION_RELAY_PUBLIC_KEY", KEY),
            ("SESSION_RELAY_PRODUCTION", "true"),
            ("SESSION_RELAY_COOKIE_DOMAIN", "franchise.dev"),
            ("SESSION_RELAY_ALLOWED_ROLES", "admin,staff"),
            ("SESSION_RELAY_PUBLIC_PATHS", "/login,/signup"),
            ("SESSION_RELAY_LOG_LEVEL", "info"),
        ]);

        temp_env::with_vars(vars, || {
            let matches = new().get_matches_from(vec!["session-relay"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(3000));
            assert_eq!(
                matches.get_one::<String>(gateway::ARG_GATEWAY_URL).cloned(),
                Some("https://api.franchise.dev".to_string())
            );
            assert!(matches.get_flag(session::ARG_PRODUCTION));
            assert_eq!(
                matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                Some(2)
            );

            let session = session::Options::parse(&matches);
            assert!(session.is_ok());
            if let Ok(session) = session {
                assert_eq!(session.cookie_domain.as_deref(), Some("franchise.dev"));
            }

            let guard = guard::Options::parse(&matches);
            assert_eq!(guard.allowed_roles, ["admin", "staff"]);
            assert_eq!(guard.public_paths, ["/login", "/signup"]);
        });
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(env_with(&[("SESSION_RELAY_LOG_LEVEL", level)]), || {
                let matches = new().get_matches_from(vec![
                    "session-relay",
                    "--gateway-url",
                    "http://gw",
                    "--public-key",
                    KEY,
                ]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_missing_gateway_url() {
        temp_env::with_vars(env_with(&[]), || {
            let result = new().try_get_matches_from(vec!["session-relay", "--public-key", KEY]);
            assert!(result.is_err());
        });
    }
}

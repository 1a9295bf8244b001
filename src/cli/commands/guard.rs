use crate::relay::config::{DEFAULT_ALLOWED_ROLES, DEFAULT_PUBLIC_PATHS};
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_PROTECTED_PREFIX: &str = "protected-prefix";
pub const ARG_HOME_PATH: &str = "home-path";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_PUBLIC_PATHS: &str = "public-paths";
pub const ARG_ALLOWED_ROLES: &str = "allowed-roles";

#[derive(Debug, Clone)]
pub struct Options {
    pub protected_prefix: String,
    pub home_path: String,
    pub login_path: String,
    pub public_paths: Vec<String>,
    pub allowed_roles: Vec<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let one = |id: &str, default: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };
        let many = |id: &str| -> Vec<String> {
            matches
                .get_many::<String>(id)
                .map(|values| values.cloned().collect())
                .unwrap_or_default()
        };

        Self {
            protected_prefix: one(ARG_PROTECTED_PREFIX, "/dashboard"),
            home_path: one(ARG_HOME_PATH, "/dashboard"),
            login_path: one(ARG_LOGIN_PATH, "/login"),
            public_paths: many(ARG_PUBLIC_PATHS),
            allowed_roles: many(ARG_ALLOWED_ROLES),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROTECTED_PREFIX)
                .long(ARG_PROTECTED_PREFIX)
                .help("Path prefix that requires a valid session")
                .env("SESSION_RELAY_PROTECTED_PREFIX")
                .default_value("/dashboard"),
        )
        .arg(
            Arg::new(ARG_HOME_PATH)
                .long(ARG_HOME_PATH)
                .help("Where signed-in users land when they open a public page")
                .env("SESSION_RELAY_HOME_PATH")
                .default_value("/dashboard"),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Login page used for unauthenticated redirects")
                .env("SESSION_RELAY_LOGIN_PATH")
                .default_value("/login"),
        )
        .arg(
            Arg::new(ARG_PUBLIC_PATHS)
                .long(ARG_PUBLIC_PATHS)
                .help("Comma separated auth pages reachable without a session")
                .env("SESSION_RELAY_PUBLIC_PATHS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .default_values(DEFAULT_PUBLIC_PATHS),
        )
        .arg(
            Arg::new(ARG_ALLOWED_ROLES)
                .long(ARG_ALLOWED_ROLES)
                .help("Comma separated roles allowed into the protected area")
                .env("SESSION_RELAY_ALLOWED_ROLES")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .default_values(DEFAULT_ALLOWED_ROLES),
        )
}

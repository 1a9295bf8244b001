use anyhow::{Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};
use secrecy::SecretString;

pub const ARG_PUBLIC_KEY: &str = "public-key";
pub const ARG_PRODUCTION: &str = "production";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";

#[derive(Debug, Clone)]
pub struct Options {
    pub public_key: SecretString,
    pub production: bool,
    pub cookie_domain: Option<String>,
}

impl Options {
    /// Parse token and cookie arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the public key is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let public_key = matches
            .get_one::<String>(ARG_PUBLIC_KEY)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.clone()))
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_PUBLIC_KEY}"))?;

        Ok(Self {
            public_key,
            production: matches.get_flag(ARG_PRODUCTION),
            cookie_domain: matches
                .get_one::<String>(ARG_COOKIE_DOMAIN)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_KEY)
                .short('k')
                .long(ARG_PUBLIC_KEY)
                .help("Base64-encoded RSA public key (PEM or DER) used to verify access tokens")
                .env("SESSION_RELAY_PUBLIC_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_PRODUCTION)
                .long(ARG_PRODUCTION)
                .help("Production mode: session cookies get the Secure attribute")
                .env("SESSION_RELAY_PRODUCTION")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Domain attribute for session cookies (default: host-only)")
                .env("SESSION_RELAY_COOKIE_DOMAIN"),
        )
}

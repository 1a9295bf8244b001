use anyhow::{Result, anyhow};
use clap::{Arg, ArgMatches, Command};

pub const ARG_GATEWAY_URL: &str = "gateway-url";
pub const ARG_GATEWAY_TIMEOUT_SECONDS: &str = "gateway-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub timeout_seconds: u64,
}

impl Options {
    /// Parse gateway arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the gateway URL is missing or the timeout is zero.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let url = matches
            .get_one::<String>(ARG_GATEWAY_URL)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_GATEWAY_URL}"))?;

        let timeout_seconds = matches
            .get_one::<u64>(ARG_GATEWAY_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(10);
        if timeout_seconds == 0 {
            return Err(anyhow!("--{ARG_GATEWAY_TIMEOUT_SECONDS} must be greater than 0"));
        }

        Ok(Self {
            url,
            timeout_seconds,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GATEWAY_URL)
                .short('g')
                .long(ARG_GATEWAY_URL)
                .help("Base URL of the upstream gateway, example: https://api.franchise.dev")
                .env("SESSION_RELAY_GATEWAY_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_GATEWAY_TIMEOUT_SECONDS)
                .long(ARG_GATEWAY_TIMEOUT_SECONDS)
                .help("Timeout for each gateway request in seconds")
                .env("SESSION_RELAY_GATEWAY_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

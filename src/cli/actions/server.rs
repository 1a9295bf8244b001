use crate::relay::{self, RelayState, config::RelayConfig, token::TokenCodec};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub gateway_url: String,
    pub gateway_timeout_seconds: u64,
    pub public_key: SecretString,
    pub production: bool,
    pub cookie_domain: Option<String>,
    pub protected_prefix: String,
    pub home_path: String,
    pub login_path: String,
    pub public_paths: Vec<String>,
    pub allowed_roles: Vec<String>,
    pub frontend_origin: Option<String>,
}

impl Args {
    /// Relay configuration from the parsed arguments.
    ///
    /// # Errors
    /// Returns an error if the gateway URL or any guard path is invalid.
    pub fn relay_config(&self) -> Result<RelayConfig> {
        let config = RelayConfig::new(&self.gateway_url)?
            .with_gateway_timeout(Duration::from_secs(self.gateway_timeout_seconds))
            .with_production(self.production)
            .with_cookie_domain(self.cookie_domain.clone())
            .with_protected_prefix(&self.protected_prefix)
            .context("Invalid protected prefix")?
            .with_home_path(&self.home_path)
            .context("Invalid home path")?
            .with_login_path(&self.login_path)
            .context("Invalid login path")?
            .with_public_paths(&self.public_paths)
            .context("Invalid public paths")?
            .with_allowed_roles(&self.allowed_roles);
        Ok(config)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration or public key is invalid, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.relay_config()?;
    let codec = TokenCodec::from_base64(args.public_key.expose_secret())
        .context("Invalid access token public key")?;

    debug!("Relay config: {config:?}");

    let state = RelayState::new(config, codec).context("Failed to build gateway client")?;

    relay::new(args.port, Arc::new(state), args.frontend_origin.as_deref()).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            port: 8080,
            gateway_url: "http://gateway.local:4000".to_string(),
            gateway_timeout_seconds: 5,
            public_key: SecretString::from("a2V5".to_string()),
            production: true,
            cookie_domain: Some("franchise.dev".to_string()),
            protected_prefix: "/admin/".to_string(),
            home_path: "/admin".to_string(),
            login_path: "/signin".to_string(),
            public_paths: vec!["/signin".to_string(), "/register".to_string()],
            allowed_roles: vec!["admin".to_string()],
            frontend_origin: None,
        }
    }

    #[test]
    fn relay_config_from_args() {
        let config = args().relay_config().unwrap();
        assert_eq!(config.gateway_timeout(), Duration::from_secs(5));
        assert_eq!(config.protected_prefix(), "/admin");
        assert_eq!(config.login_path(), "/signin");
        assert!(config.cookie_policy().secure());
        assert_eq!(config.allowed_roles(), ["admin".to_string()]);
    }

    #[test]
    fn relay_config_rejects_relative_paths() {
        let mut args = args();
        args.home_path = "admin".to_string();
        let err = args.relay_config().unwrap_err();
        assert!(err.to_string().contains("Invalid home path"));
    }

    #[tokio::test]
    async fn execute_rejects_bad_public_key() {
        let mut args = args();
        args.public_key = SecretString::from("not base64 !!".to_string());
        let err = execute(args).await.unwrap_err();
        assert!(err.to_string().contains("Invalid access token public key"));
    }
}

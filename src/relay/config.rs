//! Relay configuration shared by the guard and the gateway handlers.

use super::cookies::CookiePolicy;
use anyhow::{Result, anyhow};
use std::time::Duration;
use url::Url;

const DEFAULT_GATEWAY_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_PROTECTED_PREFIX: &str = "/dashboard";
const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_PUBLIC_PATHS: [&str; 4] =
    ["/login", "/register", "/forgot-password", "/reset-password"];
pub const DEFAULT_ALLOWED_ROLES: [&str; 3] = ["admin", "franchise_owner", "manager"];

#[derive(Clone, Debug)]
pub struct RelayConfig {
    gateway_url: Url,
    gateway_timeout: Duration,
    production: bool,
    cookie_domain: Option<String>,
    protected_prefix: String,
    home_path: String,
    login_path: String,
    public_paths: Vec<String>,
    allowed_roles: Vec<String>,
}

impl RelayConfig {
    /// # Errors
    /// Returns an error if the gateway URL is not an absolute http(s) URL.
    pub fn new(gateway_url: &str) -> Result<Self> {
        let mut url = Url::parse(gateway_url.trim())
            .map_err(|e| anyhow!("Invalid gateway URL {gateway_url}: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(anyhow!("Gateway URL must be http(s) with a host: {gateway_url}"));
        }
        // Keep a trailing slash so `join` appends instead of replacing the last segment.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self {
            gateway_url: url,
            gateway_timeout: Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECONDS),
            production: false,
            cookie_domain: None,
            protected_prefix: DEFAULT_PROTECTED_PREFIX.to_string(),
            home_path: DEFAULT_PROTECTED_PREFIX.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(ToString::to_string).collect(),
            allowed_roles: DEFAULT_ALLOWED_ROLES.iter().map(ToString::to_string).collect(),
        })
    }

    #[must_use]
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain;
        self
    }

    /// # Errors
    /// Returns an error if `prefix` is not an absolute path.
    pub fn with_protected_prefix(mut self, prefix: &str) -> Result<Self> {
        self.protected_prefix = normalize_path(prefix)?;
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `path` is not an absolute path.
    pub fn with_home_path(mut self, path: &str) -> Result<Self> {
        self.home_path = normalize_path(path)?;
        Ok(self)
    }

    /// # Errors
    /// Returns an error if `path` is not an absolute path.
    pub fn with_login_path(mut self, path: &str) -> Result<Self> {
        self.login_path = normalize_path(path)?;
        Ok(self)
    }

    /// # Errors
    /// Returns an error if any path is not absolute.
    pub fn with_public_paths<I, S>(mut self, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.public_paths = paths
            .into_iter()
            .filter(|p| !p.as_ref().trim().is_empty())
            .map(|p| normalize_path(p.as_ref()))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_allowed_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_roles = roles
            .into_iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn gateway_url(&self) -> &Url {
        &self.gateway_url
    }

    #[must_use]
    pub fn gateway_timeout(&self) -> Duration {
        self.gateway_timeout
    }

    #[must_use]
    pub fn production(&self) -> bool {
        self.production
    }

    #[must_use]
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy::new(self.production, self.cookie_domain.clone())
    }

    #[must_use]
    pub fn protected_prefix(&self) -> &str {
        &self.protected_prefix
    }

    #[must_use]
    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn public_paths(&self) -> &[String] {
        &self.public_paths
    }

    #[must_use]
    pub fn allowed_roles(&self) -> &[String] {
        &self.allowed_roles
    }

    /// True for paths under the protected prefix (segment aware: `/dashboardx` is not).
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        path_has_prefix(path, &self.protected_prefix)
    }

    /// The login page always counts as public, even when left out of `public_paths`.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        path_has_prefix(path, &self.login_path)
            || self.public_paths.iter().any(|p| path_has_prefix(path, p))
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if !trimmed.starts_with('/') || trimmed.starts_with("//") {
        return Err(anyhow!("Path must start with a single '/': {path}"));
    }
    let normalized = trimmed.trim_end_matches('/');
    Ok(if normalized.is_empty() {
        "/".to_string()
    } else {
        normalized.to_string()
    })
}

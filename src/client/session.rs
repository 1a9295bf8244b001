//! Cookie-aware client for the relay's auth endpoints.
//!
//! The relay sets `HttpOnly` cookies, so this client keeps them in a cookie
//! jar and only stores non-sensitive profile data in its session store.

use super::store::Store;
use crate::APP_USER_AGENT;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid relay URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ClientError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Profile of the signed-in user as returned by `/api/auth/profile`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, alias = "sub", alias = "_id")]
    pub id: Option<String>,
    pub username: String,
    pub email: String,
    #[serde(default, deserialize_with = "crate::relay::token::roles_from_claim")]
    pub role: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub franchise_id: Option<String>,
}

pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionClient {
    http: Client,
    base_url: Url,
    session: Store<Option<Profile>>,
}

impl SessionClient {
    /// Client for the relay at `base_url` with an in-memory session store.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_store(base_url, Store::new(None))
    }

    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn with_store(base_url: &str, session: Store<Option<Profile>>) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    /// The signed-in profile, `None` when signed out.
    #[must_use]
    pub fn session(&self) -> &Store<Option<Profile>> {
        &self.session
    }

    /// Sign in, then hydrate the session from the profile endpoint.
    ///
    /// # Errors
    /// Returns an error if the relay rejects the credentials or cannot be reached.
    pub async fn login(&self, credentials: &Credentials) -> Result<Profile, ClientError> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password.expose_secret(),
        });
        self.send(Method::POST, "api/auth/login", Some(&body)).await?;
        self.profile().await
    }

    /// # Errors
    /// Returns an error if the relay rejects the registration or cannot be reached.
    pub async fn register(&self, form: &Value) -> Result<Value, ClientError> {
        self.send(Method::POST, "api/auth/register", Some(form)).await
    }

    /// Fetch the profile and store it; a 401 clears the stored session.
    ///
    /// # Errors
    /// Returns an error if the user is not signed in or the relay cannot be reached.
    pub async fn profile(&self) -> Result<Profile, ClientError> {
        match self.send(Method::GET, "api/auth/profile", None).await {
            Ok(body) => {
                let profile: Profile = serde_json::from_value(body)?;
                self.session.set(Some(profile.clone()));
                Ok(profile)
            }
            Err(err) => {
                if err.status() == Some(StatusCode::UNAUTHORIZED.as_u16()) {
                    self.session.set(None);
                }
                Err(err)
            }
        }
    }

    /// Hydrate the session once, e.g. at start-up; failures leave it signed out.
    pub async fn hydrate(&self) -> Option<Profile> {
        match self.profile().await {
            Ok(profile) => Some(profile),
            Err(err) => {
                debug!("No session to hydrate: {err}");
                None
            }
        }
    }

    /// # Errors
    /// Returns an error if the refresh token is missing or expired, or the relay cannot be reached.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.send(Method::POST, "api/auth/refresh", None).await.map(|_| ())
    }

    /// Sign out. The local session is cleared whatever the relay answers.
    ///
    /// # Errors
    /// Returns an error if the relay reports a failure or cannot be reached.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.send(Method::POST, "api/auth/logout", None).await;
        self.session.set(None);
        result.map(|_| ())
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ClientError> {
        let url = self.base_url.join(path)?;
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        if status.is_success() {
            Ok(body)
        } else {
            Err(ClientError::Http {
                status: status.as_u16(),
                message: error_message(&body, status),
            })
        }
    }
}

fn error_message(body: &Value, status: StatusCode) -> String {
    ["error", "message"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map_or_else(
            || status.canonical_reason().unwrap_or("error").to_string(),
            str::to_string,
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile_json() -> Value {
        json!({
            "_id": "user-42",
            "username": "marco",
            "email": "marco@franchise.dev",
            "role": "franchise_owner",
            "franchiseId": "fr-7",
        })
    }

    #[test]
    fn profile_accepts_role_list() {
        let profile: Profile = serde_json::from_value(json!({
            "sub": "user-1",
            "username": "ana",
            "email": "ana@franchise.dev",
            "role": ["admin", "manager"],
        }))
        .unwrap();
        assert_eq!(profile.id.as_deref(), Some("user-1"));
        assert_eq!(profile.role, ["admin", "manager"]);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials::new("a@b.dev", "hunter2");
        assert!(!format!("{:?}", credentials.password).contains("hunter2"));
    }

    #[test]
    fn error_message_prefers_body() {
        let message = error_message(&json!({ "error": "Invalid credentials" }), StatusCode::UNAUTHORIZED);
        assert_eq!(message, "Invalid credentials");
        let message = error_message(&Value::Null, StatusCode::BAD_GATEWAY);
        assert_eq!(message, "Bad Gateway");
    }

    #[tokio::test]
    async fn login_keeps_cookies_and_hydrates_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({ "email": "marco@franchise.dev", "password": "pw" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("set-cookie", "accessToken=abc; Path=/; HttpOnly; SameSite=Lax")
                    .set_body_json(json!({ "success": true })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/profile"))
            .and(header("cookie", "accessToken=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_json()))
            .mount(&server)
            .await;

        let client = SessionClient::new(&server.uri()).unwrap();
        let mut updates = client.session().subscribe();
        let profile = client
            .login(&Credentials::new("marco@franchise.dev", "pw"))
            .await
            .unwrap();

        assert_eq!(profile.username, "marco");
        assert!(updates.has_changed().unwrap());
        assert_eq!(
            updates.borrow_and_update().as_ref().and_then(|p| p.franchise_id.clone()),
            Some("fr-7".to_string())
        );
    }

    #[tokio::test]
    async fn rejected_login_reports_gateway_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid credentials" })),
            )
            .mount(&server)
            .await;

        let client = SessionClient::new(&server.uri()).unwrap();
        let err = client
            .login(&Credentials::new("marco@franchise.dev", "nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("Invalid credentials"));
        assert_eq!(client.session().get(), None);
    }

    #[tokio::test]
    async fn unauthorized_profile_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/profile"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = Store::new(Some(serde_json::from_value(profile_json()).unwrap()));
        let client = SessionClient::with_store(&server.uri(), store).unwrap();
        assert!(client.hydrate().await.is_none());
        assert_eq!(client.session().get(), None);
    }

    #[tokio::test]
    async fn logout_clears_session_even_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "Logout failed" })))
            .mount(&server)
            .await;

        let store = Store::new(Some(serde_json::from_value(profile_json()).unwrap()));
        let client = SessionClient::with_store(&server.uri(), store).unwrap();
        assert!(client.logout().await.is_err());
        assert_eq!(client.session().get(), None);
    }
}

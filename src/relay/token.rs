//! Access token verification.
//!
//! Tokens are compact RS256 JWTs issued by the auth gateway. The relay only
//! verifies them; it never signs. Every failure collapses into `None` so callers
//! treat a bad token exactly like a missing one.

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use rsa::{
    RsaPublicKey,
    pkcs1::DecodeRsaPublicKey,
    pkcs1v15::{Signature, VerifyingKey},
    pkcs8::DecodePublicKey,
    signature::Verifier,
};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("public key is empty")]
    Empty,
    #[error("public key is not valid base64")]
    Base64,
    #[error("failed to parse RSA public key")]
    Parse,
}

#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
}

/// Claims carried by a verified access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    #[serde(rename = "sub")]
    pub subject_id: String,
    #[serde(deserialize_with = "roles_from_claim")]
    pub role: Vec<String>,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub franchise_id: Option<String>,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl SessionClaims {
    /// True when any of the token roles is in `allowed` (case-insensitive).
    #[must_use]
    pub fn has_any_role(&self, allowed: &[String]) -> bool {
        self.role
            .iter()
            .any(|role| allowed.iter().any(|a| a.eq_ignore_ascii_case(role)))
    }
}

// The gateway emits `role` as a plain string for most users and as a list for
// multi-role accounts.
pub(crate) fn roles_from_claim<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RoleClaim {
        One(String),
        Many(Vec<String>),
    }

    Ok(match RoleClaim::deserialize(deserializer)? {
        RoleClaim::One(role) => vec![role],
        RoleClaim::Many(roles) => roles,
    })
}

/// Verifies access tokens against the gateway's public key.
#[derive(Clone)]
pub struct TokenCodec {
    verifying_key: VerifyingKey<Sha256>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    #[must_use]
    pub fn new(public_key: RsaPublicKey) -> Self {
        Self {
            verifying_key: VerifyingKey::<Sha256>::new(public_key),
        }
    }

    /// Build a codec from the configured key.
    ///
    /// Accepts base64 of a PEM or DER key (SPKI or PKCS#1), or the PEM itself.
    ///
    /// # Errors
    /// Returns an error if the value is empty, not base64, or not an RSA public key.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        let bytes = if trimmed.starts_with("-----BEGIN") {
            trimmed.as_bytes().to_vec()
        } else {
            // Env files often wrap long values; ignore embedded whitespace.
            let compact: String = trimmed.split_whitespace().collect();
            Base64::decode_vec(&compact).map_err(|_| KeyError::Base64)?
        };
        decode_public_key(&bytes).map(Self::new)
    }

    /// Decode `token` using the system clock.
    #[must_use]
    pub fn decode(&self, token: &str) -> Option<SessionClaims> {
        self.decode_at(token, unix_now())
    }

    /// Decode `token` as of `now_unix_seconds`; any failure is logged and yields `None`.
    #[must_use]
    pub fn decode_at(&self, token: &str, now_unix_seconds: i64) -> Option<SessionClaims> {
        match self.verify(token, now_unix_seconds) {
            Ok(claims) => Some(claims),
            Err(err) => {
                debug!("Rejected access token: {err}");
                None
            }
        }
    }

    fn verify(&self, token: &str, now_unix_seconds: i64) -> Result<SessionClaims, TokenError> {
        let mut parts = token.trim().split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() || header_b64.is_empty() || claims_b64.is_empty() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "RS256" {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature_bytes =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|_| TokenError::InvalidSignature)?;
        self.verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: SessionClaims = b64d_json(claims_b64)?;
        if claims.expires_at <= now_unix_seconds {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn decode_public_key(pem_or_der: &[u8]) -> Result<RsaPublicKey, KeyError> {
    if pem_or_der.starts_with(b"-----BEGIN") {
        let s = std::str::from_utf8(pem_or_der).map_err(|_| KeyError::Parse)?;
        if let Ok(k) = RsaPublicKey::from_public_key_pem(s) {
            return Ok(k);
        }
        if let Ok(k) = RsaPublicKey::from_pkcs1_pem(s) {
            return Ok(k);
        }
        return Err(KeyError::Parse);
    }

    if let Ok(k) = RsaPublicKey::from_public_key_der(pem_or_der) {
        return Ok(k);
    }
    if let Ok(k) = RsaPublicKey::from_pkcs1_der(pem_or_der) {
        return Ok(k);
    }
    Err(KeyError::Parse)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

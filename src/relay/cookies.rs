//! Cookie relay helpers.
//!
//! Upstream `Set-Cookie` values are reduced to `name`, `value` and `Max-Age`;
//! every other attribute the gateway sends is dropped and the relay applies its
//! own (`HttpOnly`, `SameSite=Lax`, `Path=/`, `Secure` in production).

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, SET_COOKIE},
};
use tracing::{debug, warn};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// One cookie extracted from an upstream `Set-Cookie` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieDescriptor {
    pub name: String,
    pub value: String,
    pub max_age: Option<i64>,
}

/// Attributes the relay applies to every cookie it writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookiePolicy {
    secure: bool,
    domain: Option<String>,
}

impl CookiePolicy {
    #[must_use]
    pub fn new(secure: bool, domain: Option<String>) -> Self {
        let domain = domain
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Self { secure, domain }
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

/// Parse one `Set-Cookie` entry such as `name=value; Max-Age=300; Path=/`.
///
/// Returns `None` when the first segment has no `=` or the name or value is empty.
#[must_use]
pub fn parse_set_cookie(raw: &str) -> Option<CookieDescriptor> {
    let mut segments = raw.split(';');
    let (name, value) = segments.next()?.split_once('=')?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        return None;
    }

    let max_age = segments
        .filter_map(|segment| segment.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("max-age"))
        .and_then(|(_, age)| age.trim().parse::<i64>().ok());

    Some(CookieDescriptor {
        name: name.to_string(),
        value: value.to_string(),
        max_age,
    })
}

/// Split a header value that may carry several cookies joined by commas.
///
/// A comma only starts a new entry when it is followed by a `name=` pair, so the
/// comma inside an `Expires=Wed, 21 Oct 2015 ...` date is kept.
#[must_use]
pub fn split_set_cookie_header(raw: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    for (idx, ch) in raw.char_indices() {
        if ch == ',' && starts_cookie_pair(&raw[idx + 1..]) {
            entries.push(raw[start..idx].trim());
            start = idx + 1;
        }
    }
    entries.push(raw[start..].trim());
    entries.retain(|entry| !entry.is_empty());
    entries
}

fn starts_cookie_pair(rest: &str) -> bool {
    let rest = rest.trim_start();
    let Some((name, _)) = rest.split_once('=') else {
        return false;
    };
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, ';' | ',' | '"'))
}

/// Parse every `Set-Cookie` header of an upstream response.
#[must_use]
pub fn parse_set_cookie_headers(headers: &HeaderMap) -> Vec<CookieDescriptor> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(split_set_cookie_header)
        .filter_map(|entry| {
            let parsed = parse_set_cookie(entry);
            if parsed.is_none() {
                debug!("Dropping malformed upstream cookie");
            }
            parsed
        })
        .collect()
}

/// Find the last descriptor with `name`; later entries win like in a browser jar.
#[must_use]
pub fn find_cookie<'a>(cookies: &'a [CookieDescriptor], name: &str) -> Option<&'a CookieDescriptor> {
    cookies.iter().rev().find(|cookie| cookie.name == name)
}

/// Render the outgoing `Set-Cookie` value for a descriptor.
#[must_use]
pub fn render_cookie(cookie: &CookieDescriptor, policy: &CookiePolicy) -> String {
    let mut rendered = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        cookie.name, cookie.value
    );
    if let Some(max_age) = cookie.max_age {
        rendered.push_str(&format!("; Max-Age={max_age}"));
    }
    if let Some(domain) = policy.domain() {
        rendered.push_str(&format!("; Domain={domain}"));
    }
    if policy.secure() {
        rendered.push_str("; Secure");
    }
    rendered
}

/// Append one hardened `Set-Cookie` header; returns `false` if the cookie was dropped.
pub fn write_cookie(headers: &mut HeaderMap, cookie: &CookieDescriptor, policy: &CookiePolicy) -> bool {
    if cookie.name.is_empty() || cookie.value.is_empty() {
        return false;
    }
    match HeaderValue::from_str(&render_cookie(cookie, policy)) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
            true
        }
        Err(_) => {
            warn!("Dropping cookie {} with invalid header characters", cookie.name);
            false
        }
    }
}

/// Append every descriptor; returns how many were written.
pub fn write_cookies(
    headers: &mut HeaderMap,
    cookies: &[CookieDescriptor],
    policy: &CookiePolicy,
) -> usize {
    cookies
        .iter()
        .filter(|cookie| write_cookie(headers, cookie, policy))
        .count()
}

/// Append a `Max-Age=0` cookie that removes `name` from the browser.
pub fn clear_cookie(headers: &mut HeaderMap, name: &str, policy: &CookiePolicy) {
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if let Some(domain) = policy.domain() {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    if policy.secure() {
        cookie.push_str("; Secure");
    }
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.append(SET_COOKIE, value);
    }
}

/// Clear both session cookies.
pub fn clear_session_cookies(headers: &mut HeaderMap, policy: &CookiePolicy) {
    clear_cookie(headers, ACCESS_TOKEN_COOKIE, policy);
    clear_cookie(headers, REFRESH_TOKEN_COOKIE, policy);
}

/// Read a cookie from the request `Cookie` header(s).
#[must_use]
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Rebuild a request `Cookie` header with `name` replaced (or added).
#[must_use]
pub fn with_cookie(existing: Option<&str>, name: &str, value: &str) -> String {
    let mut pairs: Vec<String> = existing
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map_or(true, |(key, _)| key.trim() != name))
        .map(str::to_string)
        .collect();
    pairs.push(format!("{name}={value}"));
    pairs.join("; ")
}

//! Signed session cookies.
//!
//! The cookie value is `{session_id}--{signature}` where the signature is
//! the hex HMAC-SHA256 of the session id under `secret_key_base`. Cookies
//! issued inside an account are scoped to that account's path segment so
//! a browser can hold independent sessions for several accounts.

use std::collections::HashMap;

use doorway_core::models::account::Account;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: &str = "--";

fn signature(value: &str, secret: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("HMAC init failed: {e}")))?;
    mac.update(value.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Append an HMAC signature to `value`.
pub fn sign_value(value: &str, secret: &str) -> Result<String, AuthError> {
    Ok(format!("{value}{SEPARATOR}{}", signature(value, secret)?))
}

/// Return the original value if the signature matches.
pub fn verify_signed_value(signed: &str, secret: &str) -> Option<String> {
    let (value, given) = signed.rsplit_once(SEPARATOR)?;
    let expected = signature(value, secret).ok()?;
    if constant_time_equal(expected.as_bytes(), given.as_bytes()) {
        Some(value.to_string())
    } else {
        None
    }
}

/// Compare two byte slices in constant time.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
        }
    }
}

/// Path a session cookie is scoped to: the account prefix or `/`.
pub fn cookie_path(account: Option<&Account>) -> String {
    account.map_or_else(|| "/".to_string(), Account::path_prefix)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    /// Seconds; `0` deletes the cookie.
    pub max_age: u64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SessionCookie {
    /// Persistent, script-inaccessible cookie carrying the signed session id.
    pub fn for_session(
        session_id: Uuid,
        path: &str,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            name: config.session_cookie_name.clone(),
            value: sign_value(&session_id.to_string(), &config.secret_key_base)?,
            path: path.to_string(),
            max_age: config.session_lifetime_secs,
            http_only: true,
            secure: config.secure_cookies,
            same_site: SameSite::Lax,
        })
    }

    /// A cookie that makes the browser forget the session at `path`.
    pub fn expired(path: &str, config: &AuthConfig) -> Self {
        Self {
            name: config.session_cookie_name.clone(),
            value: String::new(),
            path: path.to_string(),
            max_age: 0,
            http_only: true,
            secure: config.secure_cookies,
            same_site: SameSite::Lax,
        }
    }

    /// Serialize for a `Set-Cookie` header.
    pub fn to_header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Path={}; Max-Age={}; SameSite={}",
            self.name,
            self.value,
            self.path,
            self.max_age,
            self.same_site.as_str()
        );
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }

    /// Whether a browser would attach this cookie to a request for
    /// `request_path` (RFC 6265 §5.1.4 path-match).
    pub fn is_sent_to(&self, request_path: &str) -> bool {
        path_matches(&self.path, request_path)
    }
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Every `name=value` pair of a `Cookie` request header, in order.
///
/// Browsers send more specific paths first, so when the same name occurs
/// twice the account-scoped cookie precedes the global one.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Index of the first value per cookie name.
pub fn cookie_map(header: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in parse_cookie_header(header) {
        map.entry(name).or_insert(value);
    }
    map
}

/// Session ids carried by correctly signed session cookies, most specific first.
pub fn read_session_ids(header: &str, config: &AuthConfig) -> Vec<Uuid> {
    parse_cookie_header(header)
        .into_iter()
        .filter(|(name, _)| *name == config.session_cookie_name)
        .filter_map(|(_, value)| verify_signed_value(&value, &config.secret_key_base))
        .filter_map(|id| Uuid::parse_str(&id).ok())
        .collect()
}

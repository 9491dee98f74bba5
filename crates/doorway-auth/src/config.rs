//! Authentication configuration.

use crate::error::AuthError;

/// Configuration for the authentication service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret used to sign tokens (HS256) and session cookies (HMAC-SHA256).
    pub secret_key_base: String,
    /// Token issuer (`iss` claim).
    pub token_issuer: String,
    /// Public base URL used to build magic links, without trailing slash.
    pub base_url: String,
    /// Magic-link token lifetime in seconds (default: 900 = 15 minutes).
    pub magic_link_lifetime_secs: u64,
    /// Email-verification token lifetime in seconds (default: 86_400 = 24 hours).
    pub email_verification_lifetime_secs: u64,
    /// Session lifetime in seconds (default: 2_592_000 = 30 days).
    pub session_lifetime_secs: u64,
    /// Max link requests per email address or source address per window (default: 10).
    pub magic_link_rate_limit_max: usize,
    /// Rate-limit sliding window in seconds (default: 900 = 15 minutes).
    pub magic_link_rate_limit_window_secs: u64,
    /// Name of the session cookie.
    pub session_cookie_name: String,
    /// Mark cookies `Secure` (HTTPS only).
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key_base: String::new(),
            token_issuer: "doorway".into(),
            base_url: "http://localhost:3000".into(),
            magic_link_lifetime_secs: 900,
            email_verification_lifetime_secs: 86_400,
            session_lifetime_secs: 2_592_000,
            magic_link_rate_limit_max: 10,
            magic_link_rate_limit_window_secs: 900,
            session_cookie_name: "session_token".into(),
            secure_cookies: false,
        }
    }
}

/// Minimum length of `secret_key_base` in bytes.
pub const MIN_SECRET_LEN: usize = 32;

impl AuthConfig {
    /// Reject configurations that cannot sign anything safely.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.secret_key_base.len() < MIN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "secret_key_base must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.magic_link_rate_limit_max == 0 {
            return Err(AuthError::Config(
                "magic_link_rate_limit_max must be positive".into(),
            ));
        }
        Ok(())
    }
}

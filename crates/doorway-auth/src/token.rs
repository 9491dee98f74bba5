//! Purpose-tagged, time-boxed signed tokens.
//!
//! Tokens are HS256 JWTs signed with `secret_key_base`. Each carries a
//! purpose tag (`magic_link`, `email_verification`) so a token minted for
//! one flow is rejected by every other. Expiry is checked to the
//! millisecond against the caller's clock rather than the system time,
//! with no leeway.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    MagicLink,
    EmailVerification,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::MagicLink => "magic_link",
            TokenPurpose::EmailVerification => "email_verification",
        }
    }

    pub fn lifetime_secs(&self, config: &AuthConfig) -> u64 {
        match self {
            TokenPurpose::MagicLink => config.magic_link_lifetime_secs,
            TokenPurpose::EmailVerification => config.email_verification_lifetime_secs,
        }
    }
}

/// Claims embedded in every purpose token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurposeTokenClaims {
    /// Subject: identity ID (UUID string).
    pub sub: String,
    /// Purpose tag.
    pub pur: String,
    /// External id of the account the link was requested from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acc: Option<u64>,
    pub iss: String,
    pub iat: i64,
    /// Whole seconds, rounded up, for readers of standard claims.
    pub exp: i64,
    /// Expiry in milliseconds since the epoch; the one that is enforced.
    pub exp_ms: i64,
    pub jti: String,
}

impl PurposeTokenClaims {
    pub fn identity_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidOrExpiredToken)
    }
}

/// Issue a signed token for `identity_id`, valid from `now` for the
/// purpose's configured lifetime.
pub fn issue_token(
    purpose: TokenPurpose,
    identity_id: Uuid,
    account_external_id: Option<u64>,
    config: &AuthConfig,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let exp_ms = now.timestamp_millis() + purpose.lifetime_secs(config) as i64 * 1000;
    let claims = PurposeTokenClaims {
        sub: identity_id.to_string(),
        pur: purpose.as_str().to_string(),
        acc: account_external_id,
        iss: config.token_issuer.clone(),
        iat: now.timestamp(),
        exp: exp_ms.div_euclid(1000) + i64::from(exp_ms.rem_euclid(1000) != 0),
        exp_ms,
        jti: Uuid::new_v4().to_string(),
    };

    let key = EncodingKey::from_secret(config.secret_key_base.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("token encode: {e}")))
}

/// Verify signature, issuer, purpose and expiry.
///
/// Every failure collapses into [`AuthError::InvalidOrExpiredToken`]; the
/// specific reason is only logged at debug level.
pub fn verify_token(
    token: &str,
    purpose: TokenPurpose,
    config: &AuthConfig,
    now: DateTime<Utc>,
) -> Result<PurposeTokenClaims, AuthError> {
    let key = DecodingKey::from_secret(config.secret_key_base.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.token_issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iss"]);
    validation.validate_exp = false;
    validation.leeway = 0;

    let claims = jsonwebtoken::decode::<PurposeTokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AuthError::InvalidOrExpiredToken
        })?;

    if claims.pur != purpose.as_str() {
        tracing::debug!(purpose = %claims.pur, "token rejected: wrong purpose");
        return Err(AuthError::InvalidOrExpiredToken);
    }
    if now.timestamp_millis() >= claims.exp_ms {
        tracing::debug!("token rejected: expired");
        return Err(AuthError::InvalidOrExpiredToken);
    }

    Ok(claims)
}

/// Generate a cryptographically random opaque token
/// (32 bytes → base64url-encoded, no padding).
pub fn generate_random_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_config() -> AuthConfig {
        AuthConfig {
            secret_key_base: "test-secret-key-base-with-enough-bytes".into(),
            token_issuer: "doorway-test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn magic_link_roundtrip() {
        let config = test_config();
        let identity_id = Uuid::new_v4();
        let now = Utc::now();

        let token = issue_token(TokenPurpose::MagicLink, identity_id, Some(1234567), &config, now)
            .unwrap();
        let claims = verify_token(&token, TokenPurpose::MagicLink, &config, now).unwrap();

        assert_eq!(claims.identity_id().unwrap(), identity_id);
        assert_eq!(claims.pur, "magic_link");
        assert_eq!(claims.acc, Some(1234567));
        assert_eq!(claims.exp_ms - now.timestamp_millis(), 900_000);
        assert!(claims.exp * 1000 >= claims.exp_ms);
    }

    #[test]
    fn valid_until_the_last_second() {
        let config = test_config();
        let now = Utc::now();
        let token = issue_token(TokenPurpose::MagicLink, Uuid::new_v4(), None, &config, now)
            .unwrap();

        let almost = now + Duration::seconds(899);
        assert!(verify_token(&token, TokenPurpose::MagicLink, &config, almost).is_ok());
    }

    #[test]
    fn expired_after_fifteen_minutes_and_one_second() {
        let config = test_config();
        let now = Utc::now();
        let token = issue_token(TokenPurpose::MagicLink, Uuid::new_v4(), None, &config, now)
            .unwrap();

        let later = now + Duration::minutes(15) + Duration::seconds(1);
        assert!(matches!(
            verify_token(&token, TokenPurpose::MagicLink, &config, later),
            Err(AuthError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn lifetime_is_counted_from_the_millisecond_of_issue() {
        let config = test_config();
        let issued =
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::milliseconds(900);
        let token = issue_token(TokenPurpose::MagicLink, Uuid::new_v4(), None, &config, issued)
            .unwrap();

        let before = issued + Duration::minutes(15) - Duration::milliseconds(1);
        let at = issued + Duration::minutes(15);
        assert!(verify_token(&token, TokenPurpose::MagicLink, &config, before).is_ok());
        assert!(verify_token(&token, TokenPurpose::MagicLink, &config, at).is_err());
    }

    #[test]
    fn wrong_purpose_is_rejected() {
        let config = test_config();
        let now = Utc::now();
        let token =
            issue_token(TokenPurpose::EmailVerification, Uuid::new_v4(), None, &config, now)
                .unwrap();

        assert!(matches!(
            verify_token(&token, TokenPurpose::MagicLink, &config, now),
            Err(AuthError::InvalidOrExpiredToken)
        ));
        assert!(verify_token(&token, TokenPurpose::EmailVerification, &config, now).is_ok());
    }

    #[test]
    fn email_verification_lasts_a_day() {
        let config = test_config();
        let now = Utc::now();
        let token =
            issue_token(TokenPurpose::EmailVerification, Uuid::new_v4(), None, &config, now)
                .unwrap();

        let within = now + Duration::hours(23);
        let after = now + Duration::hours(24);
        assert!(verify_token(&token, TokenPurpose::EmailVerification, &config, within).is_ok());
        assert!(verify_token(&token, TokenPurpose::EmailVerification, &config, after).is_err());
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let config = test_config();
        let now = Utc::now();
        let token = issue_token(TokenPurpose::MagicLink, Uuid::new_v4(), None, &config, now)
            .unwrap();

        let other = AuthConfig {
            secret_key_base: "a-completely-different-secret-key-base".into(),
            ..test_config()
        };
        assert!(verify_token(&token, TokenPurpose::MagicLink, &other, now).is_err());

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify_token(&tampered, TokenPurpose::MagicLink, &config, now).is_err());
        assert!(verify_token("garbage", TokenPurpose::MagicLink, &config, now).is_err());
    }

    #[test]
    fn jti_is_unique() {
        let config = test_config();
        let now = Utc::now();
        let id = Uuid::new_v4();

        let t1 = issue_token(TokenPurpose::MagicLink, id, None, &config, now).unwrap();
        let t2 = issue_token(TokenPurpose::MagicLink, id, None, &config, now).unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn random_token_is_url_safe() {
        let token = generate_random_token();
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(token.len(), 43);
    }
}

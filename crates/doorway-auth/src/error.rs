//! Authentication error types.

use doorway_core::error::DoorwayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad signature, wrong purpose, wrong account or expired. Callers
    /// never learn which.
    #[error("invalid or expired link")]
    InvalidOrExpiredToken,

    #[error("too many requests")]
    RateLimited,

    #[error("delivery queue is closed")]
    DeliveryUnavailable,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for DoorwayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidOrExpiredToken => DoorwayError::AuthenticationFailed {
                reason: err.to_string(),
            },
            AuthError::RateLimited => DoorwayError::RateLimited,
            AuthError::DeliveryUnavailable | AuthError::Config(_) => {
                DoorwayError::Internal(err.to_string())
            }
            AuthError::Crypto(msg) => DoorwayError::Crypto(msg),
        }
    }
}

//! Doorway Auth: passwordless sign-in via magic links, signed and
//! path-scoped session cookies, and link-request rate limiting.

pub mod config;
pub mod cookie;
pub mod delivery;
pub mod error;
pub mod rate_limit;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use cookie::SessionCookie;
pub use delivery::{
    DeliveryQueue, DeliveryWorker, LinkRequest, LinkResolver, LogMailer, MagicLinkDelivery,
    MagicLinkMailer, spawn_delivery_worker,
};
pub use error::AuthError;
pub use rate_limit::RateLimiter;
pub use service::{
    AuthService, MagicLinkRequest, MagicLinkRequested, RedeemInput, RedeemOutput, SignUpInput,
};
pub use token::TokenPurpose;

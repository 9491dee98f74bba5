//! Domain models for Doorway.
//!
//! An [`identity::Identity`] is a person, independent of any account.
//! Membership in an account is a [`user::User`]; a signed-in browser is a
//! [`session::Session`].

pub mod account;
pub mod identity;
pub mod session;
pub mod user;

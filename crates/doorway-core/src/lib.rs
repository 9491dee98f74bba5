//! Doorway Core: domain models, repository traits, the per-request
//! context and the shared error type.

pub mod clock;
pub mod context;
pub mod error;
pub mod models;
pub mod repository;

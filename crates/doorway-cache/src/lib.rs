//! Doorway Cache: fingerprints over domain records, HTTP conditional-GET
//! evaluation, and fragment cache keys.
//!
//! Nothing here is persisted: fingerprints and keys are recomputed from
//! the records on every request.

pub mod conditional;
pub mod fingerprint;
pub mod fragment;

pub use conditional::{CachePolicy, ConditionalRequest, Freshness, evaluate};
pub use fingerprint::{CacheVersioned, Fingerprint, FingerprintBuilder};
pub use fragment::{FragmentCache, FragmentKey, Personalization};

//! Deterministic fingerprints over versioned records.
//!
//! A record contributes its cache key (a stable identity such as
//! `identities/<uuid>`) and its cache version (last modification time).
//! Parts are fed to SHA-256 length-prefixed and in order, so the same
//! records at the same versions always yield the same fingerprint, and
//! bumping any single version yields a different one.

use chrono::{DateTime, Utc};
use doorway_core::models::{account::Account, identity::Identity, user::User};
use sha2::{Digest, Sha256};

/// A record whose state can be summarized by identity + version.
pub trait CacheVersioned {
    fn cache_key(&self) -> String;
    fn cache_version(&self) -> DateTime<Utc>;
}

impl CacheVersioned for Identity {
    fn cache_key(&self) -> String {
        format!("identities/{}", self.id)
    }

    fn cache_version(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl CacheVersioned for Account {
    fn cache_key(&self) -> String {
        format!("accounts/{}", self.id)
    }

    fn cache_version(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl CacheVersioned for User {
    fn cache_key(&self) -> String {
        format!("users/{}", self.id)
    }

    fn cache_version(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Render a version with nanosecond precision, e.g. `20240102030405123456789`.
pub(crate) fn version_stamp(version: DateTime<Utc>) -> String {
    version.format("%Y%m%d%H%M%S%9f").to_string()
}

/// Opaque summary of the current state of an ordered list of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    digest: String,
    last_modified: Option<DateTime<Utc>>,
}

impl Fingerprint {
    pub fn builder() -> FingerprintBuilder {
        FingerprintBuilder::default()
    }

    /// Fingerprint of `records` in the given order.
    pub fn of(records: &[&dyn CacheVersioned]) -> Self {
        records
            .iter()
            .fold(Self::builder(), |b, r| b.record(*r))
            .build()
    }

    /// Hex SHA-256 digest.
    pub fn as_str(&self) -> &str {
        &self.digest
    }

    /// Weak entity tag for the `ETag` header.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.digest)
    }

    /// Newest record version, if any record was included.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintBuilder {
    parts: Vec<String>,
    last_modified: Option<DateTime<Utc>>,
}

impl FingerprintBuilder {
    pub fn record(mut self, record: &dyn CacheVersioned) -> Self {
        let version = record.cache_version();
        self.parts
            .push(format!("{}-{}", record.cache_key(), version_stamp(version)));
        self.last_modified = Some(match self.last_modified {
            Some(current) if current >= version => current,
            _ => version,
        });
        self
    }

    /// Add a non-record discriminator, e.g. a template revision.
    pub fn part(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn build(self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for part in &self.parts {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Fingerprint {
            digest: hex::encode(hasher.finalize()),
            last_modified: self.last_modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn identity(updated_at: DateTime<Utc>) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email_address: "alice@example.com".into(),
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn identical_inputs_yield_identical_fingerprints() {
        let now = Utc::now();
        let a = identity(now);
        let b = identity(now);

        assert_eq!(Fingerprint::of(&[&a, &b]), Fingerprint::of(&[&a, &b]));
    }

    #[test]
    fn version_change_changes_fingerprint() {
        let now = Utc::now();
        let mut a = identity(now);
        let b = identity(now);
        let before = Fingerprint::of(&[&a, &b]);

        a.updated_at += Duration::nanoseconds(1000);
        assert_ne!(before, Fingerprint::of(&[&a, &b]));
    }

    #[test]
    fn order_matters() {
        let now = Utc::now();
        let a = identity(now);
        let b = identity(now);

        assert_ne!(
            Fingerprint::of(&[&a, &b]).as_str(),
            Fingerprint::of(&[&b, &a]).as_str()
        );
    }

    #[test]
    fn parts_are_not_ambiguous_under_concatenation() {
        let left = Fingerprint::builder().part("ab").part("c").build();
        let right = Fingerprint::builder().part("a").part("bc").build();
        assert_ne!(left, right);
    }

    #[test]
    fn last_modified_is_newest_version() {
        let now = Utc::now();
        let older = identity(now - Duration::hours(1));
        let newer = identity(now);

        let fp = Fingerprint::of(&[&newer, &older]);
        assert_eq!(fp.last_modified(), Some(now));
        assert_eq!(Fingerprint::builder().part("x").build().last_modified(), None);
    }

    #[test]
    fn etag_is_weak_and_quoted() {
        let fp = Fingerprint::builder().part("x").build();
        let etag = fp.etag();
        assert!(etag.starts_with("W/\""));
        assert!(etag.ends_with('"'));
        assert!(etag.contains(fp.as_str()));
    }
}

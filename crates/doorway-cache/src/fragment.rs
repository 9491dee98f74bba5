//! Fragment cache keys and an in-process fragment store.
//!
//! A key is composed from an ordered list of parts: records (identity and
//! version), rendering-context discriminators such as `preview`, and, only
//! for output that genuinely differs per viewer, the viewer's id.
//!
//! Viewer-specific details that should not split the cache are rendered
//! as overlay attributes instead (see [`overlay`]) and resolved in the
//! browser against the viewer id emitted once per page.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::fingerprint::{CacheVersioned, version_stamp};

/// How a personalization reaches the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Personalization {
    /// Part of the cache key: one fragment per distinct value.
    KeyPart,
    /// Shared fragment plus a client-side pass keyed on an attribute.
    ClientOverlay,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey(String);

impl FragmentKey {
    /// Start a key for the fragment template `name`, e.g. `accounts/menu`.
    pub fn builder(name: &str) -> FragmentKeyBuilder {
        FragmentKeyBuilder {
            parts: vec![format!("views/{name}")],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct FragmentKeyBuilder {
    parts: Vec<String>,
}

impl FragmentKeyBuilder {
    pub fn record(mut self, record: &dyn CacheVersioned) -> Self {
        self.parts.push(format!(
            "{}-{}",
            record.cache_key(),
            version_stamp(record.cache_version())
        ));
        self
    }

    pub fn records<'a>(self, records: impl IntoIterator<Item = &'a dyn CacheVersioned>) -> Self {
        records.into_iter().fold(self, |b, r| b.record(r))
    }

    /// Rendering-context discriminator, e.g. `preview`.
    pub fn context(mut self, discriminator: &str) -> Self {
        self.parts.push(discriminator.to_string());
        self
    }

    pub fn viewer(mut self, viewer_id: Uuid) -> Self {
        self.parts.push(format!("viewer-{viewer_id}"));
        self
    }

    /// Parts are length-prefixed so that no part can imitate a separator.
    pub fn build(self) -> FragmentKey {
        let parts: Vec<String> = self
            .parts
            .iter()
            .map(|part| format!("{}:{part}", part.len()))
            .collect();
        FragmentKey(parts.join("/"))
    }
}

/// Markup helpers for [`Personalization::ClientOverlay`].
pub mod overlay {
    use uuid::Uuid;

    /// Meta tag naming the current viewer; emitted outside cached fragments.
    pub fn viewer_meta_tag(viewer_id: Uuid) -> String {
        format!(r#"<meta name="current-identity-id" content="{viewer_id}">"#)
    }

    /// Attribute placed on elements inside a shared fragment.
    pub fn creator_attribute(creator_id: Uuid) -> String {
        format!(r#"data-creator-id="{creator_id}""#)
    }
}

/// Entries kept by [`FragmentCache::new`].
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Rendered fragments keyed by [`FragmentKey`].
///
/// Keys embed record versions, so a changed record simply produces a new
/// key and the old entry is never served again. The store holds at most
/// `capacity` entries; inserting past that evicts the oldest insertion.
#[derive(Debug)]
pub struct FragmentCache {
    capacity: usize,
    entries: RwLock<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Default)]
struct Entries {
    by_key: HashMap<FragmentKey, Arc<str>>,
    inserted: VecDeque<FragmentKey>,
}

impl Default for FragmentCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl FragmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` fragments (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(Entries::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached fragment for `key`, rendering and storing it on a miss.
    pub fn fetch<F>(&self, key: &FragmentKey, render: F) -> Arc<str>
    where
        F: FnOnce() -> String,
    {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = entries.by_key.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Arc::clone(hit);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "fragment cache miss");
        let rendered: Arc<str> = Arc::from(render());

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(raced) = entries.by_key.get(key) {
            return Arc::clone(raced);
        }
        while entries.by_key.len() >= self.capacity {
            let Some(oldest) = entries.inserted.pop_front() else {
                break;
            };
            entries.by_key.remove(&oldest);
        }
        entries.inserted.push_back(key.clone());
        entries.by_key.insert(key.clone(), Arc::clone(&rendered));
        rendered
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .by_key
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.by_key.clear();
        entries.inserted.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

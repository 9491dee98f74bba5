//! Conditional GET evaluation.
//!
//! Compares the validators a client sent (`If-None-Match`,
//! `If-Modified-Since`) against a freshly computed [`Fingerprint`] and
//! decides between `304 Not Modified` and a full render. Pure: the caller
//! turns the decision into a response.

use chrono::{DateTime, Utc};

use crate::fingerprint::Fingerprint;

/// Whether a response may be served conditionally.
///
/// Pages that embed a per-request anti-forgery token must use
/// [`CachePolicy::NoStore`]: a `304` would keep the client on the old
/// token and its next form submission would be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Conditional,
    NoStore,
}

/// Validators taken from the request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalRequest {
    if_none_match: Option<String>,
    if_modified_since: Option<DateTime<Utc>>,
}

impl ConditionalRequest {
    /// Build from raw header values. An unparseable `If-Modified-Since`
    /// is ignored.
    pub fn new(if_none_match: Option<&str>, if_modified_since: Option<&str>) -> Self {
        Self {
            if_none_match: if_none_match
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            if_modified_since: if_modified_since.and_then(parse_http_date),
        }
    }

    /// True when the client's copy matches `fingerprint`.
    ///
    /// `If-None-Match` takes precedence; `If-Modified-Since` is only
    /// consulted when it is absent, and compared at full precision.
    pub fn is_fresh(&self, fingerprint: &Fingerprint) -> bool {
        if let Some(if_none_match) = &self.if_none_match {
            return etag_list_matches(if_none_match, fingerprint.as_str());
        }
        // HTTP dates carry whole seconds; a version later within the
        // named second is newer than the client's copy.
        match (self.if_modified_since, fingerprint.last_modified()) {
            (Some(since), Some(modified)) => modified <= since,
            _ => false,
        }
    }
}

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Respond `304` with no body.
    NotModified {
        etag: String,
        last_modified: Option<String>,
    },
    /// Render the full body with these headers.
    Render {
        etag: Option<String>,
        last_modified: Option<String>,
        cache_control: &'static str,
    },
}

impl Freshness {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Freshness::NotModified { .. })
    }

    /// Headers to attach to the response, as `(name, value)` pairs.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(3);
        match self {
            Freshness::NotModified {
                etag,
                last_modified,
            } => {
                headers.push(("etag", etag.clone()));
                if let Some(lm) = last_modified {
                    headers.push(("last-modified", lm.clone()));
                }
                headers.push(("cache-control", REVALIDATE.to_string()));
            }
            Freshness::Render {
                etag,
                last_modified,
                cache_control,
            } => {
                if let Some(etag) = etag {
                    headers.push(("etag", etag.clone()));
                }
                if let Some(lm) = last_modified {
                    headers.push(("last-modified", lm.clone()));
                }
                headers.push(("cache-control", cache_control.to_string()));
            }
        }
        headers
    }
}

const REVALIDATE: &str = "max-age=0, private, must-revalidate";
const NO_STORE: &str = "no-store";

/// Decide between `304` and a full render.
pub fn evaluate(
    request: &ConditionalRequest,
    fingerprint: &Fingerprint,
    policy: CachePolicy,
) -> Freshness {
    if policy == CachePolicy::NoStore {
        return Freshness::Render {
            etag: None,
            last_modified: None,
            cache_control: NO_STORE,
        };
    }

    let etag = fingerprint.etag();
    let last_modified = fingerprint.last_modified().map(format_http_date);

    if request.is_fresh(fingerprint) {
        tracing::debug!(etag = %etag, "conditional request is fresh");
        Freshness::NotModified {
            etag,
            last_modified,
        }
    } else {
        Freshness::Render {
            etag: Some(etag),
            last_modified,
            cache_control: REVALIDATE,
        }
    }
}

/// Weak comparison of an `If-None-Match` list against our opaque tag.
fn etag_list_matches(header: &str, digest: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        if candidate == "*" {
            return true;
        }
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        candidate
            .strip_prefix('"')
            .and_then(|c| c.strip_suffix('"'))
            .is_some_and(|opaque| opaque == digest)
    })
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

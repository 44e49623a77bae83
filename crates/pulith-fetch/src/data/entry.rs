use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use pulith_verify::ContentHash;
use serde::{Deserialize, Serialize};

use crate::core::CacheKey;

/// What a cache entry resolves to in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePayload {
    File {
        content: ContentHash,
    },
    /// An imported archive. `source` is the archive file the tree came from,
    /// so an identical re-download can reuse `tree` without importing again.
    Tarball {
        source: ContentHash,
        tree: ContentHash,
        last_modified: Option<DateTime<Utc>>,
    },
}

/// One persisted record of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub url: String,
    pub etag: Option<String>,
    /// Origin `Last-Modified`.
    pub last_modified: Option<DateTime<Utc>>,
    pub immutable_url: Option<String>,
    pub effective_url: String,
    pub payload: CachePayload,
    pub stored_at: DateTime<Utc>,
    /// `None` for immutable entries.
    pub expiry: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_immutable(&self) -> bool {
        self.immutable_url.is_some()
    }

    /// Immutable entries never expire. A mutable entry without an expiry is
    /// always stale.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.is_immutable() {
            return false;
        }
        self.expiry.is_none_or(|expiry| now >= expiry)
    }

    /// Store objects that must exist for the entry to be usable.
    pub fn referenced_objects(&self) -> Vec<ContentHash> {
        match &self.payload {
            CachePayload::File { content } => vec![*content],
            CachePayload::Tarball { source, tree, .. } => vec![*source, *tree],
        }
    }

    pub fn content(&self) -> ContentHash {
        match &self.payload {
            CachePayload::File { content } => *content,
            CachePayload::Tarball { source, .. } => *source,
        }
    }
}

/// Freshness rules for mutable entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// How long an entry without an immutable URL is served without
    /// revalidation.
    ///
    /// Default: 1 hour
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CachePolicy {
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn expiry(&self, immutable: bool, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if immutable {
            return None;
        }
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        Some(now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}

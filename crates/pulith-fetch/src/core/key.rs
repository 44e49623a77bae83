use std::fmt;

use pulith_verify::ContentHash;
use serde::{Deserialize, Serialize};
use url::Url;

/// What a cache entry holds. File and tarball entries for the same request
/// never share a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
    File,
    Tarball,
}

impl KeyKind {
    fn as_str(self) -> &'static str {
        match self {
            KeyKind::File => "file",
            KeyKind::Tarball => "tarball",
        }
    }
}

/// Stable cache key derived from a normalized URL and request headers.
///
/// The URL is normalized by the `url` crate (lower-cased scheme and host,
/// default port removed) and its fragment dropped. Header names are
/// lower-cased, values trimmed, and pairs sorted, so caller ordering does not
/// affect the key. The key is the hex SHA-256 of that canonical form, which
/// also makes it safe to use as a file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(kind: KeyKind, url: &Url, headers: &[(String, String)]) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);

        let mut pairs: Vec<(String, &str)> = headers
            .iter()
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim()))
            .collect();
        pairs.sort();

        let mut canonical = format!("{}\n{}\n", kind.as_str(), url.as_str());
        for (name, value) in pairs {
            canonical.push_str(&name);
            canonical.push(':');
            canonical.push_str(value);
            canonical.push('\n');
        }
        Self(ContentHash::of(canonical.as_bytes()).to_hex())
    }

    pub fn file(url: &Url, headers: &[(String, String)]) -> Self {
        Self::new(KeyKind::File, url, headers)
    }

    pub fn tarball(url: &Url, headers: &[(String, String)]) -> Self {
        Self::new(KeyKind::Tarball, url, headers)
    }

    /// Accept a previously rendered key, e.g. an index file stem.
    pub fn parse(s: &str) -> Option<Self> {
        (s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()))
            .then(|| Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn h(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn url_is_normalized() {
        let a = CacheKey::file(&url("HTTPS://Example.ORG:443/a.tar.gz#frag"), &[]);
        let b = CacheKey::file(&url("https://example.org/a.tar.gz"), &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn header_order_and_case_do_not_matter() {
        let a = CacheKey::file(&url("https://x.org/f"), &h(&[("Accept", "*/*"), ("X-Token", "1")]));
        let b = CacheKey::file(&url("https://x.org/f"), &h(&[("x-token", " 1 "), ("accept", "*/*")]));
        assert_eq!(a, b);
    }

    #[test]
    fn header_values_and_kind_matter() {
        let u = url("https://x.org/f");
        let base = CacheKey::file(&u, &h(&[("X-Token", "1")]));
        assert_ne!(base, CacheKey::file(&u, &h(&[("X-Token", "2")])));
        assert_ne!(base, CacheKey::file(&u, &[]));
        assert_ne!(base, CacheKey::tarball(&u, &h(&[("X-Token", "1")])));
    }

    #[test]
    fn keys_are_file_name_safe() {
        let key = CacheKey::file(&url("https://x.org/../../etc"), &[]);
        assert_eq!(key.as_str().len(), 64);
        assert_eq!(CacheKey::parse(key.as_str()), Some(key));
        assert_eq!(CacheKey::parse("../escape"), None);
    }
}

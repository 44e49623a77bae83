use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulith_fetch::{
    CacheEntry, CacheIndex, CacheKey, CachePayload, Coalescer, Download, DownloadOutcome,
    Downloader, FetchState, HttpClient, Progress,
};
use pulith_store::{Store, TreeAccessor, persist_tree};
use pulith_verify::ContentHash;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::result::{FileFetchResult, TarballFetchResult};

/// Fetches files and tarballs into the store, importing archives as trees.
///
/// Concurrent calls for the same URL and headers share one download, and
/// tarball calls share one import whatever hash each caller expects. A
/// tarball fetch downloads its archive through the same path as
/// [`download_file`](Self::download_file), so a file and a tarball request
/// for one URL also share the download. Clones share state.
pub struct SourceFetcher<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for SourceFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C> {
    downloader: Downloader<C>,
    files: Coalescer<CacheKey, Download, Error>,
    tarballs: Coalescer<CacheKey, Staged, Error>,
}

/// A tarball imported (or found in the index) by the shared part of a fetch,
/// before any caller's expected hash is checked.
#[derive(Clone)]
struct Staged {
    entry: CacheEntry,
    tree: ContentHash,
    entry_mtime: Option<DateTime<Utc>>,
    /// Set while `entry` still has to be written. The first caller whose
    /// expected hash matches writes it.
    pending: Option<Arc<OnceCell<()>>>,
}

impl<C: HttpClient + 'static> SourceFetcher<C> {
    pub fn new(downloader: Downloader<C>) -> Self {
        Self {
            inner: Arc::new(Inner {
                downloader,
                files: Coalescer::new(),
                tarballs: Coalescer::new(),
            }),
        }
    }

    pub fn downloader(&self) -> &Downloader<C> {
        &self.inner.downloader
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.inner.downloader.store()
    }

    pub fn index(&self) -> &Arc<CacheIndex> {
        self.inner.downloader.index()
    }

    /// Fetch `url` into the store. `name` labels the stored object.
    pub async fn download_file(
        &self,
        url: &str,
        name: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<FileFetchResult> {
        self.inner.transition(url, FetchState::Pending);
        let result = self.inner.download(url, name, headers, None).await.map(|download| {
            if download.outcome != DownloadOutcome::CacheHit {
                self.inner.transition(url, FetchState::Cached);
            }
            FileFetchResult {
                content: download.content,
                etag: download.etag,
                effective_url: download.effective_url,
                immutable_url: download.immutable_url,
            }
        });
        self.inner.finish(url, &result);
        result
    }

    /// Fetch and import the archive at `url`.
    ///
    /// With `expected` set, the imported tree must hash to it; otherwise the
    /// call fails with [`Error::HashMismatch`] and no tarball entry is written
    /// on its behalf.
    pub async fn download_tarball(
        &self,
        url: &str,
        headers: &[(String, String)],
        expected: Option<ContentHash>,
    ) -> Result<TarballFetchResult> {
        self.inner.transition(url, FetchState::Pending);
        let result = self.inner.tarball(url, headers, expected).await;
        self.inner.finish(url, &result);
        result
    }

    /// Cancel an in-flight [`download_file`](Self::download_file). Every
    /// waiter, including tarball fetches downloading the same URL, receives
    /// [`Error::Cancelled`].
    pub fn cancel_file(&self, url: &str, headers: &[(String, String)]) -> bool {
        let Ok(parsed) = parse(url) else {
            return false;
        };
        self.inner.files.cancel(&CacheKey::file(&parsed, headers))
    }

    /// Cancel an in-flight [`download_tarball`](Self::download_tarball) for
    /// `url` and `headers`, along with the archive download it started.
    pub fn cancel_tarball(&self, url: &str, headers: &[(String, String)]) -> bool {
        let Ok(parsed) = parse(url) else {
            return false;
        };
        let cancelled = self
            .inner
            .tarballs
            .cancel(&CacheKey::tarball(&parsed, headers));
        if cancelled {
            self.inner.files.cancel(&CacheKey::file(&parsed, headers));
        }
        cancelled
    }
}

impl<C: HttpClient + 'static> Inner<C> {
    fn transition(&self, url: &str, state: FetchState) {
        debug!(url, %state, "fetch state");
        self.downloader.options().report(&Progress::new(url, state));
    }

    fn finish<T>(&self, url: &str, result: &Result<T>) {
        match result {
            Ok(_) => self.transition(url, FetchState::Done),
            Err(e) => {
                debug!(url, error = %e, "fetch failed");
                self.transition(url, e.state());
            }
        }
    }

    /// Download `url` once per file key, however many callers ask.
    async fn download(
        self: &Arc<Self>,
        url: &str,
        name: Option<&str>,
        headers: &[(String, String)],
        fallback: Option<CacheEntry>,
    ) -> Result<Download> {
        let key = CacheKey::file(&parse(url)?, headers);
        let inner = Arc::clone(self);
        let (url, name, headers) = (url.to_owned(), name.map(str::to_owned), headers.to_vec());
        self.files
            .run(key, Error::Cancelled, move || async move {
                let download = inner
                    .downloader
                    .fetch_revalidating(&url, name.as_deref(), &headers, fallback)
                    .await?;
                Ok(download)
            })
            .await
    }

    async fn tarball(
        self: &Arc<Self>,
        url: &str,
        headers: &[(String, String)],
        expected: Option<ContentHash>,
    ) -> Result<TarballFetchResult> {
        let key = CacheKey::tarball(&parse(url)?, headers);
        let inner = Arc::clone(self);
        let (task_url, task_headers, task_key) = (url.to_owned(), headers.to_vec(), key.clone());
        let staged = self
            .tarballs
            .run(key, Error::Cancelled, move || async move {
                inner.stage_tarball(&task_url, &task_headers, task_key).await
            })
            .await?;

        check_expected(url, expected, staged.tree)?;
        if let Some(pending) = &staged.pending {
            pending.get_or_try_init(|| self.commit(url, &staged)).await?;
        }
        Ok(self.result(&staged))
    }

    async fn stage_tarball(
        self: &Arc<Self>,
        url: &str,
        headers: &[(String, String)],
        key: CacheKey,
    ) -> Result<Staged> {
        let cached = self.downloader.index().lookup(&key).await?;
        if let Some(entry) = &cached {
            if !entry.is_expired(Utc::now()) {
                if let CachePayload::Tarball {
                    tree,
                    last_modified,
                    ..
                } = &entry.payload
                {
                    debug!(url, tree = %tree, "tarball cache hit");
                    self.transition(url, FetchState::Requesting);
                    self.transition(url, FetchState::CacheHit);
                    return Ok(Staged {
                        tree: *tree,
                        entry_mtime: *last_modified,
                        entry: entry.clone(),
                        pending: None,
                    });
                }
            }
        }

        let download = self
            .download(url, archive_name(url).as_deref(), headers, cached.clone())
            .await?;

        let reusable = cached.as_ref().and_then(|entry| match &entry.payload {
            CachePayload::Tarball {
                source,
                tree,
                last_modified,
            } if *source == download.content => Some((*tree, *last_modified)),
            _ => None,
        });

        let (tree, entry_mtime) = match reusable {
            Some(reused) => {
                debug!(url, tree = %reused.0, "archive unchanged; reusing imported tree");
                reused
            }
            None => {
                self.transition(url, FetchState::Importing);
                self.import(&download).await?
            }
        };

        let now = Utc::now();
        let immutable = download.immutable_url.is_some();
        let entry = CacheEntry {
            key,
            url: url.to_owned(),
            etag: download.etag,
            last_modified: download.last_modified,
            immutable_url: download.immutable_url,
            effective_url: download.effective_url,
            payload: CachePayload::Tarball {
                source: download.content,
                tree,
                last_modified: entry_mtime,
            },
            stored_at: now,
            expiry: self.downloader.index().policy().expiry(immutable, now),
        };
        Ok(Staged {
            entry,
            tree,
            entry_mtime,
            pending: Some(Arc::new(OnceCell::new())),
        })
    }

    async fn commit(&self, url: &str, staged: &Staged) -> Result<()> {
        self.downloader.index().commit(staged.entry.clone()).await?;
        self.transition(url, FetchState::Cached);
        info!(url, tree = %staged.tree, "tarball imported");
        Ok(())
    }

    /// Import the downloaded archive on a blocking worker and persist the
    /// resulting tree.
    async fn import(&self, download: &Download) -> Result<(ContentHash, Option<DateTime<Utc>>)> {
        let store = Arc::clone(self.downloader.store());
        let content = download.content;
        let hint = download.effective_url.clone();

        let task = tokio::task::spawn_blocking(move || -> Result<_> {
            let reader = store.open(&content)?;
            let imported = pulith_archive::import(reader, Some(&hint))?;
            let tree = persist_tree(store.as_ref(), &imported.tree)?;
            debug!(
                %tree,
                entries = imported.entry_count,
                format = ?imported.format,
                "persisted imported tree"
            );
            Ok((tree, imported.last_modified))
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(Error::Cancelled),
        }
    }

    fn result(&self, staged: &Staged) -> TarballFetchResult {
        TarballFetchResult {
            tree_hash: staged.tree,
            last_modified: staged
                .entry
                .last_modified
                .max(staged.entry_mtime)
                .unwrap_or(DateTime::UNIX_EPOCH),
            immutable_url: staged.entry.immutable_url.clone(),
            tree: TreeAccessor::new(Arc::clone(self.downloader.store()), staged.tree),
        }
    }
}

fn parse(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| {
        pulith_fetch::Error::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn check_expected(url: &str, expected: Option<ContentHash>, actual: ContentHash) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(Error::HashMismatch {
            url: url.to_owned(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

/// Last path segment, used to label the stored archive.
fn archive_name(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let name = url.path_segments()?.next_back()?;
    (!name.is_empty()).then(|| name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_names() {
        assert_eq!(
            archive_name("https://x.org/dl/pkg-1.0.tar.gz?sig=1").as_deref(),
            Some("pkg-1.0.tar.gz")
        );
        assert_eq!(archive_name("https://x.org/"), None);
    }

    #[test]
    fn expected_hash_check() {
        let a = ContentHash::of(b"a");
        let b = ContentHash::of(b"b");
        assert!(check_expected("u", None, a).is_ok());
        assert!(check_expected("u", Some(a), a).is_ok());
        assert!(matches!(
            check_expected("u", Some(a), b),
            Err(Error::HashMismatch { .. })
        ));
    }

    #[test]
    fn invalid_urls_are_fetch_errors() {
        let err = parse("::").unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert_eq!(err.state(), FetchState::NetworkError);
    }
}

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use pulith_store::{ObjectWriter, Store};
use pulith_verify::ContentHash;
use tracing::{debug, info, warn};
use url::Url;

use super::blocking::run_blocking;
use super::cache::CacheIndex;
use super::http::{HttpClient, Request, Response};
use crate::core::{
    CacheKey, RetryState, header_value, immutable_link, is_redirect, is_retryable_status,
    is_success, parse_http_date, parse_retry_after, redirect_headers,
};
use crate::data::{CacheEntry, CachePayload, FetchOptions, FetchState, Progress};
use crate::error::{Error, Result};

/// How a [`Download`] was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Served from the index without touching the network.
    CacheHit,
    /// The origin answered 304 to a conditional request.
    NotModified,
    /// A full body was downloaded into the store.
    Fetched,
}

/// A file available in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub content: ContentHash,
    pub effective_url: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub immutable_url: Option<String>,
    pub outcome: DownloadOutcome,
}

impl Download {
    fn from_entry(entry: &CacheEntry, outcome: DownloadOutcome) -> Self {
        Self {
            content: entry.content(),
            effective_url: entry.effective_url.clone(),
            etag: entry.etag.clone(),
            last_modified: entry.last_modified,
            immutable_url: entry.immutable_url.clone(),
            outcome,
        }
    }
}

/// Why one attempt failed.
enum Failure {
    /// Worth another attempt. `status` is set when the origin answered.
    Transient {
        message: String,
        retry_after: Option<Duration>,
        status: Option<u16>,
    },
    Fatal(Error),
}

impl Failure {
    fn transport(message: impl Into<String>) -> Self {
        Failure::Transient {
            message: message.into(),
            retry_after: None,
            status: None,
        }
    }
}

enum Attempt {
    NotModified {
        effective_url: Url,
        headers: Vec<(String, String)>,
    },
    Fetched {
        content: ContentHash,
        effective_url: Url,
        headers: Vec<(String, String)>,
    },
}

/// Conditional downloader.
///
/// Consults the [`CacheIndex`] before touching the network, revalidates stale
/// entries with `If-None-Match`, follows redirects itself and streams bodies
/// straight into the store. Every successful network fetch updates the index.
pub struct Downloader<C> {
    client: C,
    store: Arc<dyn Store>,
    index: Arc<CacheIndex>,
    options: FetchOptions,
}

impl<C: HttpClient> Downloader<C> {
    pub fn new(client: C, store: Arc<dyn Store>, index: Arc<CacheIndex>) -> Self {
        Self {
            client,
            store,
            index,
            options: FetchOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn index(&self) -> &Arc<CacheIndex> {
        &self.index
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Make the content at `url` available in the store.
    ///
    /// `name` only labels the stored object. `headers` are sent with every
    /// request and are part of the cache key.
    pub async fn fetch(
        &self,
        url: &str,
        name: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<Download> {
        self.fetch_revalidating(url, name, headers, None).await
    }

    /// [`fetch`](Self::fetch), revalidating against `fallback` when the index
    /// holds no entry for `url`.
    ///
    /// `fallback` is another entry derived from the same response, such as a
    /// tarball entry recording the archive as its source. Its etag is sent
    /// with `If-None-Match` and a 304 reuses its content.
    pub async fn fetch_revalidating(
        &self,
        url: &str,
        name: Option<&str>,
        headers: &[(String, String)],
        fallback: Option<CacheEntry>,
    ) -> Result<Download> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        let key = CacheKey::file(&parsed, headers);
        self.options.report(&Progress::new(url, FetchState::Requesting));

        let cached = self.index.lookup(&key).await?;
        if let Some(entry) = &cached {
            if !entry.is_expired(Utc::now()) {
                debug!(url, %key, immutable = entry.is_immutable(), "cache hit");
                self.options.report(&Progress::new(url, FetchState::CacheHit));
                return Ok(Download::from_entry(entry, DownloadOutcome::CacheHit));
            }
        }

        let cached = cached.or_else(|| {
            fallback.map(|entry| CacheEntry {
                key: key.clone(),
                payload: CachePayload::File {
                    content: entry.content(),
                },
                ..entry
            })
        });
        let etag = cached.as_ref().and_then(|entry| entry.etag.clone());
        let mut request_headers = headers.to_vec();
        if let Some(etag) = &etag {
            debug!(url, etag = %etag, "revalidating stale entry");
            request_headers.push(("If-None-Match".to_owned(), etag.clone()));
        }

        let mut retry = RetryState::new(self.options.max_retries);
        let attempt = loop {
            match self.attempt(&parsed, &request_headers, etag.is_some(), name).await {
                Ok(attempt) => break attempt,
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Transient {
                    message,
                    retry_after,
                    status,
                }) => {
                    let retry_after = retry_after.map(|d| d.min(self.options.max_retry_after));
                    let Some(delay) = retry.next_delay(self.options.retry_backoff, retry_after)
                    else {
                        return Err(match status {
                            Some(status) => Error::HttpStatus {
                                url: url.to_owned(),
                                status,
                            },
                            None => Error::Network {
                                url: url.to_owned(),
                                attempts: retry.attempts(),
                                message,
                            },
                        });
                    };
                    warn!(
                        url,
                        retry = retry.retries(),
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let now = Utc::now();
        let policy = self.index.policy();
        let (entry, outcome) = match (attempt, cached) {
            (
                Attempt::NotModified {
                    effective_url,
                    headers,
                },
                Some(previous),
            ) => {
                let immutable_url = immutable_link(&headers, &effective_url)
                    .map(String::from)
                    .or(previous.immutable_url);
                let entry = CacheEntry {
                    etag: header_value(&headers, "etag").map(str::to_owned).or(previous.etag),
                    last_modified: header_value(&headers, "last-modified")
                        .and_then(parse_http_date)
                        .or(previous.last_modified),
                    expiry: policy.expiry(immutable_url.is_some(), now),
                    immutable_url,
                    effective_url: effective_url.into(),
                    stored_at: now,
                    ..previous
                };
                (entry, DownloadOutcome::NotModified)
            }
            (Attempt::NotModified { .. }, None) => {
                return Err(Error::HttpStatus {
                    url: url.to_owned(),
                    status: 304,
                });
            }
            (
                Attempt::Fetched {
                    content,
                    effective_url,
                    headers,
                },
                _,
            ) => {
                let immutable_url = immutable_link(&headers, &effective_url).map(String::from);
                let entry = CacheEntry {
                    key,
                    url: url.to_owned(),
                    etag: header_value(&headers, "etag").map(str::to_owned),
                    last_modified: header_value(&headers, "last-modified")
                        .and_then(parse_http_date),
                    expiry: policy.expiry(immutable_url.is_some(), now),
                    immutable_url,
                    effective_url: effective_url.into(),
                    payload: CachePayload::File { content },
                    stored_at: now,
                };
                (entry, DownloadOutcome::Fetched)
            }
        };

        self.index.commit(entry.clone()).await?;
        info!(
            url,
            content = %entry.content(),
            effective_url = %entry.effective_url,
            outcome = ?outcome,
            "download complete"
        );
        Ok(Download::from_entry(&entry, outcome))
    }

    /// One request chain: send, follow redirects, then either accept a 304
    /// or stream the body into the store.
    async fn attempt(
        &self,
        url: &Url,
        headers: &[(String, String)],
        conditional: bool,
        name: Option<&str>,
    ) -> std::result::Result<Attempt, Failure> {
        let mut current = url.clone();
        let mut headers = headers.to_vec();
        let mut hops = 0;

        let response = loop {
            let response = self.send(&current, &headers).await?;
            if !is_redirect(response.status) {
                break response;
            }

            let Some(location) = response.header("location") else {
                return Err(Failure::Fatal(Error::HttpStatus {
                    url: current.to_string(),
                    status: response.status,
                }));
            };
            let next = current.join(location).map_err(|e| {
                Failure::Fatal(Error::InvalidUrl {
                    url: location.to_owned(),
                    reason: e.to_string(),
                })
            })?;

            hops += 1;
            if hops > self.options.max_redirects {
                return Err(Failure::Fatal(Error::TooManyRedirects {
                    url: url.to_string(),
                    max: self.options.max_redirects,
                }));
            }
            debug!(from = %current, to = %next, status = response.status, "following redirect");
            headers = redirect_headers(&headers, &current, &next);
            current = next;
        };

        let status = response.status;
        if status == 304 {
            if conditional {
                return Ok(Attempt::NotModified {
                    effective_url: current,
                    headers: response.headers,
                });
            }
            return Err(Failure::Fatal(Error::HttpStatus {
                url: current.to_string(),
                status,
            }));
        }
        if is_retryable_status(status) {
            return Err(Failure::Transient {
                message: format!("HTTP status {status}"),
                retry_after: response.header("retry-after").and_then(parse_retry_after),
                status: Some(status),
            });
        }
        if !is_success(status) {
            return Err(Failure::Fatal(Error::HttpStatus {
                url: current.to_string(),
                status,
            }));
        }

        let headers = response.headers.clone();
        let content = self.receive(&current, response, name).await?;
        Ok(Attempt::Fetched {
            content,
            effective_url: current,
            headers,
        })
    }

    async fn send(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> std::result::Result<Response<C::Error>, Failure> {
        let request = Request {
            url: url.clone(),
            headers: headers.to_vec(),
        };
        match tokio::time::timeout(self.options.request_timeout, self.client.send(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Failure::transport(e.to_string())),
            Err(_) => Err(Failure::transport(
                Error::Timeout {
                    url: url.to_string(),
                }
                .to_string(),
            )),
        }
    }

    /// Stream the body into a store writer. The object is committed only
    /// once the whole body has arrived.
    async fn receive(
        &self,
        url: &Url,
        response: Response<C::Error>,
        name: Option<&str>,
    ) -> std::result::Result<ContentHash, Failure> {
        let total_bytes = response.content_length();
        let mut body = response.body;
        let store = Arc::clone(&self.store);
        let name = name.map(str::to_owned);
        let mut writer: Box<dyn ObjectWriter> =
            run_blocking(move || Ok(store.writer(name.as_deref())?))
                .await
                .map_err(Failure::Fatal)?;

        let mut progress = Progress::new(url.as_str(), FetchState::Downloading);
        progress.total_bytes = total_bytes;
        self.options.report(&progress);

        loop {
            let chunk = match tokio::time::timeout(self.options.request_timeout, body.next()).await
            {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(Failure::transport(e.to_string())),
                Ok(None) => break,
                Err(_) => {
                    return Err(Failure::transport(
                        Error::Timeout {
                            url: url.to_string(),
                        }
                        .to_string(),
                    ));
                }
            };
            let len = chunk.len() as u64;
            writer = run_blocking(move || {
                writer.write_all(&chunk).map_err(pulith_store::Error::from)?;
                Ok(writer)
            })
            .await
            .map_err(Failure::Fatal)?;
            progress.bytes_downloaded += len;
            self.options.report(&progress);
        }

        if let Some(total) = total_bytes {
            if progress.bytes_downloaded != total {
                return Err(Failure::transport(format!(
                    "body ended after {} of {total} bytes",
                    progress.bytes_downloaded
                )));
            }
        }

        run_blocking(move || Ok(writer.commit()?))
            .await
            .map_err(Failure::Fatal)
    }
}

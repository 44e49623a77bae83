use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use url::Url;

use crate::core::header_value;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// A single GET request. Headers are sent in the given order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

/// Response head plus a streaming body.
pub struct Response<E> {
    pub status: u16,
    /// URL that produced this response.
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: BoxStream<'static, Result<Bytes, E>>,
}

impl<E> Response<E> {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }
}

impl<E> std::fmt::Debug for Response<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Asynchronous HTTP transport.
///
/// Implementations must not follow redirects: the downloader handles them so
/// it can record the effective URL and filter credentials. Any status code is
/// a successful `send`; only transport failures are errors.
///
/// # Implementations
///
/// - [`ReqwestClient`](super::ReqwestClient): production implementation using `reqwest`
/// - [`MockClient`](super::MockClient): scripted responses for tests
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn send(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;

    /// Production HTTP client implementation using reqwest.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Create a client with redirects disabled.
        pub fn new() -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()?;
            Ok(Self { client })
        }

        /// Wrap an existing client. It must be built with
        /// `redirect::Policy::none()`.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn send(&self, request: Request) -> Result<Response<Self::Error>, Self::Error> {
            let mut builder = self.client.get(request.url);
            for (key, value) in &request.headers {
                builder = builder.header(key, value);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let url = response.url().clone();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_owned(), value.to_owned()))
                })
                .collect();
            Ok(Response {
                status,
                url,
                headers,
                body: Box::pin(response.bytes_stream()),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;

//! Scripted in-process transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use url::Url;

use super::http::{HttpClient, Request, Response};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mock transport error: {0}")]
pub struct MockError(pub String);

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    delay: Option<Duration>,
    transport_error: Option<String>,
    body_error: Option<String>,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            delay: None,
            transport_error: None,
            body_error: None,
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::status(200).body(body)
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::status(status).header("Location", location)
    }

    /// Fail `send` itself, as a refused connection would.
    pub fn transport_error(message: impl Into<String>) -> Self {
        let mut response = Self::status(0);
        response.transport_error = Some(message.into());
        response
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Wait before answering.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// End the body stream with an error after the scripted bytes.
    #[must_use]
    pub fn body_error(mut self, message: impl Into<String>) -> Self {
        self.body_error = Some(message.into());
        self
    }
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, VecDeque<MockResponse>>,
    requests: Vec<Request>,
}

/// Transport answering from per-URL queues.
///
/// Replies are consumed in order; the last one for a URL is repeated. Unknown
/// URLs get a 404. Every request is recorded. Clones share state.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `url`.
    pub fn route(&self, url: &str, response: MockResponse) -> &Self {
        self.state
            .lock()
            .routes
            .entry(normalize(url))
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        let url = normalize(url);
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.url.as_str() == url)
            .count()
    }

    fn next_response(&self, request: &Request) -> Option<MockResponse> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        let queue = state.routes.get_mut(request.url.as_str())?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl HttpClient for MockClient {
    type Error = MockError;

    async fn send(&self, request: Request) -> Result<Response<MockError>, MockError> {
        let scripted = self.next_response(&request);
        let Some(scripted) = scripted else {
            return Ok(Response {
                status: 404,
                url: request.url,
                headers: Vec::new(),
                body: Box::pin(futures_util::stream::empty::<Result<Bytes, MockError>>()),
            });
        };

        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = scripted.transport_error {
            return Err(MockError(message));
        }

        let mut chunks: Vec<Result<Bytes, MockError>> = Vec::new();
        if !scripted.body.is_empty() {
            chunks.push(Ok(scripted.body));
        }
        if let Some(message) = scripted.body_error {
            chunks.push(Err(MockError(message)));
        }

        Ok(Response {
            status: scripted.status,
            url: request.url,
            headers: scripted.headers,
            body: Box::pin(futures_util::stream::iter(chunks)),
        })
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url).map_or_else(|_| url.to_owned(), String::from)
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn get(url: &str) -> Request {
        Request {
            url: Url::parse(url).unwrap(),
            headers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn replies_in_order_and_repeats_last() {
        let client = MockClient::new();
        client
            .route("https://x.org/a", MockResponse::status(503))
            .route("https://x.org/a", MockResponse::ok("body"));

        assert_eq!(client.send(get("https://x.org/a")).await.unwrap().status, 503);
        assert_eq!(client.send(get("https://x.org/a")).await.unwrap().status, 200);
        let mut response = client.send(get("https://x.org/a")).await.unwrap();
        assert_eq!(response.body.next().await.unwrap().unwrap(), "body");
        assert_eq!(client.request_count("https://x.org/a"), 3);
    }

    #[tokio::test]
    async fn unknown_urls_are_not_found() {
        let client = MockClient::new();
        assert_eq!(client.send(get("https://x.org/none")).await.unwrap().status, 404);
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn transport_errors() {
        let client = MockClient::new();
        client.route("https://x.org/a", MockResponse::transport_error("refused"));
        let err = client.send(get("https://x.org/a")).await.unwrap_err();
        assert_eq!(err, MockError("refused".into()));
    }
}

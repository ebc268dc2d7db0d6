//! Mock collection endpoint for dispatch tests.

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use ::http::HeaderMap;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer as WiremockServer, ResponseTemplate,
};

use crate::wait_for_async;

/// HTTP server standing in for an event collection endpoint.
///
/// Every request is recorded regardless of which mock answered it.
pub struct MockServer {
    server: WiremockServer,
}

impl MockServer {
    /// Starts a server on a random local port.
    pub async fn start() -> Self {
        Self { server: WiremockServer::start().await }
    }

    /// Absolute URL for `path` on this server.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Answers every request to `endpoint_path` with `status`.
    pub async fn mock_status(&self, endpoint_path: &str, status: u16) {
        Mock::given(path(endpoint_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answers requests with the given HTTP method only.
    pub async fn mock_method(&self, http_method: &str, endpoint_path: &str, status: u16) {
        Mock::given(method(http_method))
            .and(path(endpoint_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answers with `status` after `delay`.
    pub async fn mock_delayed(&self, endpoint_path: &str, status: u16, delay: Duration) {
        Mock::given(path(endpoint_path))
            .respond_with(ResponseTemplate::new(status).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Answers successive requests with `statuses` in order, one each.
    ///
    /// Requests beyond the sequence fall through to any other mounted mock,
    /// or get wiremock's default 404.
    pub async fn mock_sequence(&self, endpoint_path: &str, statuses: &[u16]) {
        for &status in statuses {
            Mock::given(path(endpoint_path))
                .respond_with(ResponseTemplate::new(status))
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
    }

    /// Every request received so far, in arrival order.
    pub async fn received_requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(RecordedRequest::from)
            .collect()
    }

    /// Requests received for `endpoint_path`.
    pub async fn requests_to(&self, endpoint_path: &str) -> Vec<RecordedRequest> {
        self.received_requests().await.into_iter().filter(|r| r.path == endpoint_path).collect()
    }

    /// Waits until at least `count` requests have arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `count` requests arrive within `timeout`.
    pub async fn wait_for_requests(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<RecordedRequest>> {
        let arrived = move || async move { self.received_requests().await.len() >= count };
        wait_for_async(arrived, timeout)
            .await
            .map_err(|e| anyhow::anyhow!("expected {count} requests: {e}"))?;

        Ok(self.received_requests().await)
    }

    /// Asserts that exactly `expected` requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let requests = self.received_requests().await;
        assert_eq!(
            requests.len(),
            expected,
            "Expected {} requests, received {}",
            expected,
            requests.len()
        );
    }
}

/// A request as seen by the mock endpoint.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method, upper case.
    pub method: String,
    /// URL path without query.
    pub path: String,
    /// Raw query string, if any.
    pub query: Option<String>,
    /// Decoded query parameters in order.
    pub query_pairs: Vec<(String, String)>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl RecordedRequest {
    /// Value of header `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Body as UTF-8 text.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON.
    pub fn body_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl From<wiremock::Request> for RecordedRequest {
    fn from(request: wiremock::Request) -> Self {
        Self {
            method: request.method.to_string(),
            path: request.url.path().to_string(),
            query: request.url.query().map(str::to_string),
            query_pairs: request
                .url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            headers: request.headers,
            body: Bytes::from(request.body),
        }
    }
}

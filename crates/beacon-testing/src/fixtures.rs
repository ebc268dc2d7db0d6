//! Log event builders with sensible defaults.

use beacon_dispatch::{LogEvent, RequestMethod};
use serde_json::{json, Value};

/// Builder for test log events.
#[derive(Debug, Clone)]
pub struct LogEventBuilder {
    method: RequestMethod,
    endpoint_url: String,
    params: Vec<(String, String)>,
    body: String,
}

impl LogEventBuilder {
    /// Starts a GET event for `endpoint_url`.
    pub fn get(endpoint_url: impl Into<String>) -> Self {
        Self {
            method: RequestMethod::Get,
            endpoint_url: endpoint_url.into(),
            params: Vec::new(),
            body: String::new(),
        }
    }

    /// Starts a POST event for `endpoint_url` with a small JSON body.
    pub fn post(endpoint_url: impl Into<String>) -> Self {
        Self {
            method: RequestMethod::Post,
            endpoint_url: endpoint_url.into(),
            params: Vec::new(),
            body: Self::default_body().to_string(),
        }
    }

    fn default_body() -> Value {
        json!({
            "account_id": "10001",
            "visitors": [{ "visitor_id": "user_1", "events": [{ "key": "click" }] }]
        })
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Replaces the body with raw text.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Replaces the body with serialized JSON.
    #[must_use]
    pub fn json_body(mut self, body: &Value) -> Self {
        self.body = body.to_string();
        self
    }

    /// Builds the event.
    pub fn build(self) -> LogEvent {
        LogEvent {
            method: self.method,
            endpoint_url: self.endpoint_url,
            params: self.params,
            body: self.body,
        }
    }
}

/// Builds `count` GET events for `endpoint_url`, each tagged with `seq=<n>`.
pub fn numbered_events(endpoint_url: &str, count: usize) -> Vec<LogEvent> {
    (0..count)
        .map(|n| LogEventBuilder::get(endpoint_url).param("seq", n.to_string()).build())
        .collect()
}

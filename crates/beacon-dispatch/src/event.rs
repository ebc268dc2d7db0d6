//! Log events handed to the engine by producers.
//!
//! The engine never inspects or owns the payload. Serialization of the body
//! happens upstream; by the time an event reaches [`DispatchEngine::dispatch`]
//! it is a method, an endpoint, ordered query parameters and an opaque body.
//!
//! [`DispatchEngine::dispatch`]: crate::DispatchEngine::dispatch

use std::fmt;

use serde::{Deserialize, Serialize};

/// HTTP verb used when dispatching a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    /// Parameters are sent as the query string, no body.
    Get,
    /// Body is sent verbatim as JSON, parameters are ignored.
    Post,
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// A fire-and-forget tracking event destined for a collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// HTTP verb for the request.
    pub method: RequestMethod,
    /// Absolute collection endpoint URL.
    pub endpoint_url: String,
    /// Query parameters in caller order. Used only for GET.
    #[serde(default)]
    pub params: Vec<(String, String)>,
    /// Pre-serialized request body. Used only for POST.
    #[serde(default)]
    pub body: String,
}

impl LogEvent {
    /// Creates a GET event with no parameters.
    pub fn get(endpoint_url: impl Into<String>) -> Self {
        Self {
            method: RequestMethod::Get,
            endpoint_url: endpoint_url.into(),
            params: Vec::new(),
            body: String::new(),
        }
    }

    /// Creates a POST event carrying `body` as its JSON payload.
    pub fn post(endpoint_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: RequestMethod::Post,
            endpoint_url: endpoint_url.into(),
            params: Vec::new(),
            body: body.into(),
        }
    }

    /// Appends a query parameter, keeping insertion order.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

//! Turns a [`LogEvent`] into a transport-ready request.
//!
//! GET events carry their parameters as a URL-encoded query string in caller
//! order. POST events carry the body verbatim with a JSON content type. No
//! other headers are added here.

use reqwest::Url;

use crate::{
    error::{DispatchError, Result},
    event::{LogEvent, RequestMethod},
};

/// Content type attached to every POST body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A fully formed request for a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// HTTP verb.
    pub method: RequestMethod,
    /// Endpoint with any query parameters already applied.
    pub url: Url,
    /// Request payload, POST only.
    pub body: Option<String>,
    /// `Content-Type` header value, POST only.
    pub content_type: Option<&'static str>,
}

impl DispatchRequest {
    /// Decoded query parameters of the request URL, in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
    }
}

/// Builds the request for `event`.
///
/// # Errors
///
/// Returns `DispatchError::InvalidEndpoint` if the endpoint is not an absolute
/// `http` or `https` URL.
pub fn build_request(event: &LogEvent) -> Result<DispatchRequest> {
    let mut url = parse_endpoint(&event.endpoint_url)?;

    match event.method {
        RequestMethod::Get => {
            if !event.params.is_empty() {
                let mut query = url.query_pairs_mut();
                for (key, value) in &event.params {
                    query.append_pair(key, value);
                }
            }

            Ok(DispatchRequest { method: RequestMethod::Get, url, body: None, content_type: None })
        },
        RequestMethod::Post => Ok(DispatchRequest {
            method: RequestMethod::Post,
            url,
            body: Some(event.body.clone()),
            content_type: Some(JSON_CONTENT_TYPE),
        }),
    }
}

fn parse_endpoint(endpoint_url: &str) -> Result<Url> {
    let url = Url::parse(endpoint_url)
        .map_err(|e| DispatchError::invalid_endpoint(endpoint_url, e.to_string()))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(DispatchError::invalid_endpoint(
            endpoint_url,
            format!("unsupported scheme {scheme:?}"),
        )),
    }
}

//! Proptest strategies for log events and endpoint responses.

use beacon_dispatch::{LogEvent, RequestMethod};
use proptest::prelude::{any, prop, prop_oneof, Just, Strategy};

/// Either request method.
pub fn method_strategy() -> impl Strategy<Value = RequestMethod> {
    prop_oneof![Just(RequestMethod::Get), Just(RequestMethod::Post)]
}

/// Ordered query parameters with arbitrary printable keys and values,
/// including characters that need URL encoding.
pub fn params_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-zA-Z0-9 _&=?+%/-]{1,12}", "\\PC{0,16}"), 0..8)
}

/// Opaque request bodies.
pub fn body_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just(r#"{"x":1}"#.to_string()),
        "\\PC{0,64}",
    ]
}

/// Events aimed at `endpoint_url` with random method, params and body.
pub fn log_event_strategy(endpoint_url: String) -> impl Strategy<Value = LogEvent> {
    (method_strategy(), params_strategy(), body_strategy()).prop_map(move |(method, params, body)| {
        LogEvent { method, endpoint_url: endpoint_url.clone(), params, body }
    })
}

/// Any status code an HTTP server could send.
pub fn status_code_strategy() -> impl Strategy<Value = u16> {
    100_u16..=599
}

/// Arbitrary u16 values, including ones outside the valid status range.
pub fn raw_status_strategy() -> impl Strategy<Value = u16> {
    any::<u16>()
}

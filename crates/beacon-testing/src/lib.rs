//! Test infrastructure for the beacon dispatch engine.
//!
//! Provides a recording HTTP collection endpoint, a raw TCP endpoint for
//! connection lifetime checks, log event builders, proptest strategies and
//! polling helpers for asynchronous assertions.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{future::Future, time::Duration};

use anyhow::Result;

pub mod fixtures;
pub mod http;
pub mod strategies;
pub mod tcp;

pub use fixtures::LogEventBuilder;
pub use self::http::{MockServer, RecordedRequest};
pub use tcp::RawEndpoint;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it holds or `timeout` elapses.
///
/// # Errors
///
/// Returns an error if the condition is still false at the deadline.
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timeout waiting for condition after {timeout:?}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    Ok(())
}

/// Async variant of [`wait_for`] for conditions that must await.
///
/// # Errors
///
/// Returns an error if the condition is still false at the deadline.
pub async fn wait_for_async<F, Fut>(mut condition: F, timeout: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while !condition().await {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timeout waiting for condition after {timeout:?}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    Ok(())
}

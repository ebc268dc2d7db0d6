//! Fire-and-forget HTTP dispatch of analytics log events.
//!
//! Producers hand events to a [`DispatchEngine`] and return immediately. The
//! engine buffers them in a bounded queue and a fixed set of long-lived
//! workers sends each one to its collection endpoint over a pooled HTTP
//! client.
//!
//! # Architecture
//!
//! Every worker runs the same loop for the lifetime of the engine:
//!
//! 1. **Take** - wait for the next event from the shared queue
//! 2. **Build** - turn the event into a GET with query parameters or a JSON POST
//! 3. **Execute** - send it through the [`Transport`]
//! 4. **Classify** - 2xx is success, anything else is recorded and skipped
//!
//! # Delivery guarantees
//!
//! There are none beyond best effort. A full queue drops the newest event,
//! failed requests are not retried, and shutdown discards whatever is still
//! queued. Ordering holds only within a single worker's pulls; use one worker
//! if global order matters.
//!
//! # Example
//!
//! ```no_run
//! use beacon_dispatch::{DispatchConfig, DispatchEngine, DispatchError, LogEvent};
//!
//! # async fn example() -> std::result::Result<(), DispatchError> {
//! let engine = DispatchEngine::new(DispatchConfig::new(10_000, 2))?;
//!
//! engine.dispatch(
//!     LogEvent::get("https://logx.example.com/v1/events").with_param("event", "click"),
//! );
//!
//! engine.shutdown();
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod outcome;
pub mod queue;
pub mod request;
pub mod stats;
pub mod transport;
mod worker;

pub use config::{ClientConfig, DispatchConfig, DispatchConfigBuilder, PoolConfig};
pub use engine::DispatchEngine;
pub use error::{DispatchError, ErrorCategory, Result};
pub use event::{LogEvent, RequestMethod};
pub use outcome::{classify_status, DispatchOutcome, ResponseClass};
pub use request::{build_request, DispatchRequest};
pub use stats::EngineStats;
pub use transport::{HttpTransport, Transport};
pub use worker::WorkerState;

/// Default capacity of the event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default number of dispatch workers.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Default cap on concurrent connections across all routes.
pub const DEFAULT_MAX_CONNECTIONS: usize = 200;

/// Default cap on concurrent connections to one route.
pub const DEFAULT_CONNECTIONS_PER_ROUTE: usize = 20;

/// Default idle period after which a pooled connection is not reused.
pub const DEFAULT_VALIDATE_AFTER_INACTIVITY: Duration = Duration::from_millis(5000);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

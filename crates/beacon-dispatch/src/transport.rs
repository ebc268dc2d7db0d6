//! Pooled HTTP transport for event dispatch.
//!
//! The [`Transport`] trait is the seam between dispatch workers and the
//! network. [`HttpTransport`] backs it with a `reqwest` connection pool whose
//! limits come from [`PoolConfig`]; tests substitute [`mock::MockTransport`].
//!
//! Connection reuse, TLS and socket timeouts belong to `reqwest`. This layer
//! only applies the pool parameters once, caps concurrently executing
//! requests globally and per origin, and makes the transport closable.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
};

use reqwest::{header::CONTENT_TYPE, Method, Url};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::{
    config::{ClientConfig, PoolConfig},
    error::{DispatchError, Result},
    event::RequestMethod,
    request::DispatchRequest,
};

/// Executes dispatch requests against a remote endpoint.
///
/// Implementations must be safe for concurrent use by every worker.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and returns the response status code.
    ///
    /// Status interpretation is left to the caller; only failures to obtain a
    /// response at all are errors.
    fn execute(
        &self,
        request: DispatchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<u16>> + Send + '_>>;

    /// Releases the transport's resources, pooled connections included.
    ///
    /// Requests issued after a successful close fail with
    /// `DispatchError::TransportClosed`.
    fn close(&self) -> Result<()>;
}

/// `reqwest`-backed transport with bounded connection usage.
///
/// The client is taken out on close; dropping the last handle to it tears
/// down the connection pool and its sockets.
#[derive(Debug)]
pub struct HttpTransport {
    client: Mutex<Option<reqwest::Client>>,
    pool: PoolConfig,
    client_config: ClientConfig,
    total_permits: Arc<Semaphore>,
    route_permits: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HttpTransport {
    /// Builds the transport and its connection pool.
    ///
    /// Cookie handling stays disabled: no cookie store is attached.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::ConfigurationError` if a connection cap is zero
    /// or the HTTP client cannot be built.
    pub fn new(pool: PoolConfig, client_config: ClientConfig) -> Result<Self> {
        if pool.max_total_connections == 0 {
            return Err(DispatchError::configuration("max_total_connections must be > 0"));
        }
        if pool.max_connections_per_route == 0 {
            return Err(DispatchError::configuration("max_connections_per_route must be > 0"));
        }

        // reqwest cannot re-validate a leased connection, so idle connections
        // are evicted once they pass the inactivity threshold instead.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool.max_connections_per_route)
            .pool_idle_timeout(pool.validate_after_inactivity)
            .connect_timeout(client_config.connect_timeout)
            .timeout(client_config.request_timeout)
            .build()
            .map_err(|e| {
                DispatchError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        debug!(
            max_total_connections = pool.max_total_connections,
            max_connections_per_route = pool.max_connections_per_route,
            validate_after_inactivity_ms = pool.validate_after_inactivity.as_millis(),
            request_timeout_ms = client_config.request_timeout.as_millis(),
            "created pooled HTTP transport"
        );

        Ok(Self {
            client: Mutex::new(Some(client)),
            total_permits: Arc::new(Semaphore::new(pool.max_total_connections)),
            route_permits: Mutex::new(HashMap::new()),
            pool,
            client_config,
        })
    }

    /// Pool limits this transport was built with.
    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool
    }

    /// Connections that may still be opened before the global cap is hit.
    pub fn available_connections(&self) -> usize {
        self.total_permits.available_permits()
    }

    /// Whether [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.client.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Number of origins with a live per-route limiter.
    pub fn tracked_routes(&self) -> usize {
        self.route_permits.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn route_semaphore(&self, url: &Url) -> Arc<Semaphore> {
        let route = url.origin().ascii_serialization();
        let mut routes = self.route_permits.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(semaphore) = routes.get(&route) {
            return semaphore.clone();
        }

        // Limiters only referenced by the map have no requests in flight.
        routes.retain(|_, semaphore| Arc::strong_count(semaphore) > 1);

        let semaphore = Arc::new(Semaphore::new(self.pool.max_connections_per_route));
        routes.insert(route, semaphore.clone());
        semaphore
    }

    async fn send(&self, request: DispatchRequest) -> Result<u16> {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DispatchError::TransportClosed)?;

        // Route first so requests queued behind a saturated origin do not hold
        // global permits.
        let route = self.route_semaphore(&request.url);
        let _route_permit =
            route.acquire_owned().await.map_err(|_| DispatchError::TransportClosed)?;
        let _total_permit =
            self.total_permits.acquire().await.map_err(|_| DispatchError::TransportClosed)?;

        let method = match request.method {
            RequestMethod::Get => Method::GET,
            RequestMethod::Post => Method::POST,
        };

        let mut http_request = client.request(method, request.url);
        if let Some(content_type) = request.content_type {
            http_request = http_request.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            http_request = http_request.body(body);
        }

        let response = http_request.send().await.map_err(|e| self.map_send_error(&e))?;
        let status_code = response.status().as_u16();

        // Read the body so the connection goes back to the pool.
        if let Err(e) = response.bytes().await {
            debug!(status_code, error = %e, "failed to read response body");
        }

        Ok(status_code)
    }

    fn map_send_error(&self, error: &reqwest::Error) -> DispatchError {
        if error.is_timeout() {
            let timeout_ms =
                u64::try_from(self.client_config.request_timeout.as_millis()).unwrap_or(u64::MAX);
            return DispatchError::timeout(timeout_ms);
        }
        if error.is_connect() {
            return DispatchError::network(format!("connection failed: {error}"));
        }
        DispatchError::network(error.to_string())
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        request: DispatchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<u16>> + Send + '_>> {
        Box::pin(self.send(request))
    }

    fn close(&self) -> Result<()> {
        // Dropping the last client handle shuts the connection pool down.
        if self.client.lock().unwrap_or_else(PoisonError::into_inner).take().is_none() {
            return Err(DispatchError::close("transport already closed"));
        }

        self.total_permits.close();
        let routes = self.route_permits.lock().unwrap_or_else(PoisonError::into_inner);
        for semaphore in routes.values() {
            semaphore.close();
        }

        info!(routes = routes.len(), "closed pooled HTTP transport");
        Ok(())
    }
}

pub mod mock {
    //! In-memory transport for exercising workers without a network.
    //!
    //! Replies are scripted in order and fall back to a default status once
    //! the script runs out. A gated transport holds every request until the
    //! test releases it, which makes in-flight and backpressure scenarios
    //! deterministic.

    use std::{
        collections::VecDeque,
        future::Future,
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex, PoisonError,
        },
    };

    use tokio::sync::Semaphore;

    use super::Transport;
    use crate::{
        error::{DispatchError, Result},
        request::DispatchRequest,
    };

    /// Scripted reply for one execution.
    #[derive(Debug, Clone)]
    pub enum MockReply {
        /// Respond with this status code.
        Status(u16),
        /// Fail with this error.
        Fail(DispatchError),
        /// Panic inside the execution future.
        Panic,
        /// Never complete.
        Hang,
    }

    /// Recording transport with scripted replies.
    #[derive(Debug)]
    pub struct MockTransport {
        replies: Mutex<VecDeque<MockReply>>,
        default_status: u16,
        requests: Mutex<Vec<DispatchRequest>>,
        gate: Option<Arc<Semaphore>>,
        started: AtomicUsize,
        close_calls: AtomicUsize,
        close_failure: Option<String>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTransport {
        /// Creates a transport that answers every request with 200.
        pub fn new() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                default_status: 200,
                requests: Mutex::new(Vec::new()),
                gate: None,
                started: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                close_failure: None,
            }
        }

        /// Answers unscripted requests with `status_code`.
        #[must_use]
        pub fn with_status(mut self, status_code: u16) -> Self {
            self.default_status = status_code;
            self
        }

        /// Holds every request until [`MockTransport::release`] lets it through.
        #[must_use]
        pub fn gated(mut self) -> Self {
            self.gate = Some(Arc::new(Semaphore::new(0)));
            self
        }

        /// Makes `close` fail with `message`.
        #[must_use]
        pub fn failing_close(mut self, message: impl Into<String>) -> Self {
            self.close_failure = Some(message.into());
            self
        }

        /// Queues a reply for the next unscripted execution.
        pub fn push_reply(&self, reply: MockReply) {
            self.replies.lock().unwrap_or_else(PoisonError::into_inner).push_back(reply);
        }

        /// Lets `count` gated requests proceed.
        pub fn release(&self, count: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(count);
            }
        }

        /// Requests that passed the gate, in execution order.
        pub fn requests(&self) -> Vec<DispatchRequest> {
            self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Number of requests that passed the gate.
        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Number of executions started, including ones still held at the gate.
        pub fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        /// Number of times `close` was called.
        pub fn close_calls(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }

        fn next_reply(&self) -> MockReply {
            self.replies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or(MockReply::Status(self.default_status))
        }

        #[allow(clippy::panic)]
        async fn run(&self, request: DispatchRequest) -> Result<u16> {
            self.started.fetch_add(1, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.acquire().await.map_err(|_| DispatchError::TransportClosed)?.forget();
            }

            let reply = self.next_reply();
            self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request);

            match reply {
                MockReply::Status(status_code) => Ok(status_code),
                MockReply::Fail(error) => Err(error),
                MockReply::Panic => panic!("mock transport panicked"),
                MockReply::Hang => std::future::pending().await,
            }
        }
    }

    impl Transport for MockTransport {
        fn execute(
            &self,
            request: DispatchRequest,
        ) -> Pin<Box<dyn Future<Output = Result<u16>> + Send + '_>> {
            Box::pin(self.run(request))
        }

        fn close(&self) -> Result<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            match &self.close_failure {
                Some(message) => Err(DispatchError::close(message.clone())),
                None => Ok(()),
            }
        }
    }
}

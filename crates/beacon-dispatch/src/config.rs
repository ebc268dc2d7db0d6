//! Engine, pool and client configuration.
//!
//! Configuration is assembled once and handed to the engine by value. Nothing
//! here is mutated after construction; the pool parameters are applied to the
//! transport exactly once when it is built.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Connection pool limits applied to the transport at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum concurrent connections across all routes.
    pub max_total_connections: usize,
    /// Maximum concurrent connections to a single origin.
    pub max_connections_per_route: usize,
    /// Idle period after which a pooled connection is no longer reused.
    pub validate_after_inactivity: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total_connections: crate::DEFAULT_MAX_CONNECTIONS,
            max_connections_per_route: crate::DEFAULT_CONNECTIONS_PER_ROUTE,
            validate_after_inactivity: crate::DEFAULT_VALIDATE_AFTER_INACTIVITY,
        }
    }
}

/// Timeouts for the HTTP client backing the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Maximum time to establish a connection.
    pub connect_timeout: Duration,
    /// Maximum time for a whole request, from send to body read.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: crate::DEFAULT_CONNECT_TIMEOUT,
            request_timeout: crate::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Configuration for the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of the bounded event queue. Must be greater than zero.
    pub queue_capacity: usize,

    /// Number of persistent dispatch workers.
    pub worker_count: usize,

    /// Connection pool limits.
    pub pool: PoolConfig,

    /// HTTP client timeouts.
    pub client: ClientConfig,
}

impl DispatchConfig {
    /// Creates a configuration with default pool and client settings.
    ///
    /// The capacity is not validated here; the engine rejects a zero
    /// capacity when it is constructed.
    pub fn new(queue_capacity: usize, worker_count: usize) -> Self {
        Self {
            queue_capacity,
            worker_count,
            pool: PoolConfig::default(),
            client: ClientConfig::default(),
        }
    }

    /// Returns a builder seeded with the default configuration.
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::default()
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new(crate::DEFAULT_QUEUE_CAPACITY, crate::DEFAULT_WORKER_COUNT)
    }
}

/// Fluent builder for [`DispatchConfig`].
///
/// Non-positive sizes are ignored with a warning and the previous value is
/// kept, so a builder always produces a configuration the engine accepts.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfigBuilder {
    config: DispatchConfig,
}

impl DispatchConfigBuilder {
    /// Sets the queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        if queue_capacity == 0 {
            warn!(
                current = self.config.queue_capacity,
                "queue capacity must be > 0, keeping current value"
            );
        } else {
            self.config.queue_capacity = queue_capacity;
        }
        self
    }

    /// Sets the number of dispatch workers.
    #[must_use]
    pub fn worker_count(mut self, worker_count: usize) -> Self {
        if worker_count == 0 {
            warn!(
                current = self.config.worker_count,
                "worker count must be > 0, keeping current value"
            );
        } else {
            self.config.worker_count = worker_count;
        }
        self
    }

    /// Sets the connection cap across all routes.
    #[must_use]
    pub fn max_total_connections(mut self, max_total_connections: usize) -> Self {
        if max_total_connections == 0 {
            warn!(
                current = self.config.pool.max_total_connections,
                "max total connections must be > 0, keeping current value"
            );
        } else {
            self.config.pool.max_total_connections = max_total_connections;
        }
        self
    }

    /// Sets the connection cap for a single route.
    #[must_use]
    pub fn max_connections_per_route(mut self, max_connections_per_route: usize) -> Self {
        if max_connections_per_route == 0 {
            warn!(
                current = self.config.pool.max_connections_per_route,
                "max connections per route must be > 0, keeping current value"
            );
        } else {
            self.config.pool.max_connections_per_route = max_connections_per_route;
        }
        self
    }

    /// Sets the idle period after which connections are not reused.
    #[must_use]
    pub fn validate_after_inactivity(mut self, validate_after_inactivity: Duration) -> Self {
        self.config.pool.validate_after_inactivity = validate_after_inactivity;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.config.client.connect_timeout = connect_timeout;
        self
    }

    /// Sets the whole-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.client.request_timeout = request_timeout;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> DispatchConfig {
        self.config
    }
}

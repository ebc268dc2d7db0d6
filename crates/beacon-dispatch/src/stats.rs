//! Counters for engine monitoring.
//!
//! Producers and workers update these from hot paths without awaiting, so
//! every counter is a relaxed atomic. [`EngineStats`] is a point-in-time copy;
//! individual fields are not read atomically with respect to each other.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Statistics for dispatch engine monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Number of workers that have not yet terminated.
    pub active_workers: usize,
    /// Events accepted into the queue since startup.
    pub events_enqueued: u64,
    /// Events rejected because the queue was full or the engine shut down.
    pub events_dropped: u64,
    /// Events removed from the queue by a worker.
    pub events_taken: u64,
    /// Dispatches answered with a 2xx status.
    pub successful_deliveries: u64,
    /// Dispatches answered with any other status.
    pub protocol_errors: u64,
    /// Dispatches that failed to build or execute, panics included.
    pub transport_errors: u64,
    /// Events waiting in the queue.
    pub queue_depth: usize,
    /// Events currently being dispatched.
    pub in_flight_dispatches: u64,
}

impl EngineStats {
    /// Dispatches that reached a recorded outcome.
    pub fn completed(&self) -> u64 {
        self.successful_deliveries + self.protocol_errors + self.transport_errors
    }
}

/// Shared, lock-free counters behind [`EngineStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    active_workers: AtomicUsize,
    events_enqueued: AtomicU64,
    events_dropped: AtomicU64,
    events_taken: AtomicU64,
    successful_deliveries: AtomicU64,
    protocol_errors: AtomicU64,
    transport_errors: AtomicU64,
    in_flight: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_stopped(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.events_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks an event as taken and in flight.
    pub(crate) fn record_taken(&self) {
        self.events_taken.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Clears the in-flight mark without recording an outcome.
    pub(crate) fn record_abandoned(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.successful_deliveries.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, queue_depth: usize) -> EngineStats {
        EngineStats {
            active_workers: self.active_workers.load(Ordering::Relaxed),
            events_enqueued: self.events_enqueued.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_taken: self.events_taken.load(Ordering::Relaxed),
            successful_deliveries: self.successful_deliveries.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            queue_depth,
            in_flight_dispatches: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

//! Dispatch engine: queue, workers and transport under one lifecycle.
//!
//! Construction spawns every worker immediately on the ambient tokio runtime.
//! [`DispatchEngine::dispatch`] never blocks and never fails the caller; an
//! event that does not fit is dropped and logged. Shutdown is best effort:
//! the transport is closed, workers are cancelled and aborted whether or not
//! the close succeeded, and queued events are discarded.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::DispatchConfig,
    error::{DispatchError, Result},
    event::LogEvent,
    queue::EventQueue,
    stats::{EngineStats, StatsRecorder},
    transport::{HttpTransport, Transport},
    worker::{DispatchWorker, WorkerState, WorkerStateCell},
};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Asynchronous, lossy event dispatcher.
///
/// Share it between producers with an `Arc`; every method takes `&self`.
pub struct DispatchEngine {
    config: DispatchConfig,
    queue: EventQueue,
    transport: Arc<dyn Transport>,
    stats: Arc<StatsRecorder>,
    worker_states: Vec<Arc<WorkerStateCell>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    runtime: Handle,
    cancellation_token: CancellationToken,
    accepting: AtomicBool,
}

impl DispatchEngine {
    /// Creates an engine backed by a pooled HTTP transport and starts its
    /// workers.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidQueueCapacity` for a zero capacity, and
    /// `DispatchError::ConfigurationError` if the transport cannot be built or
    /// no tokio runtime is running.
    pub fn new(config: DispatchConfig) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(DispatchError::InvalidQueueCapacity { capacity: config.queue_capacity });
        }

        let transport = HttpTransport::new(config.pool.clone(), config.client.clone())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates an engine that dispatches through `transport`.
    ///
    /// The pool settings in `config` are not applied; `transport` is used as
    /// given.
    ///
    /// # Errors
    ///
    /// Same as [`DispatchEngine::new`], minus transport construction.
    pub fn with_transport(config: DispatchConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let queue = EventQueue::new(config.queue_capacity)?;
        let runtime = Handle::try_current().map_err(|e| {
            DispatchError::configuration(format!("dispatch engine requires a tokio runtime: {e}"))
        })?;

        if config.worker_count == 0 {
            warn!("dispatch engine started with no workers, queued events will not be delivered");
        }

        let stats = Arc::new(StatsRecorder::default());
        let cancellation_token = CancellationToken::new();
        let mut worker_states = Vec::with_capacity(config.worker_count);
        let mut worker_handles = Vec::with_capacity(config.worker_count);

        for worker_id in 0..config.worker_count {
            let state = Arc::new(WorkerStateCell::new());
            let worker = DispatchWorker::new(
                worker_id,
                queue.clone(),
                transport.clone(),
                stats.clone(),
                state.clone(),
                cancellation_token.clone(),
            );

            worker_states.push(state);
            worker_handles.push(runtime.spawn(worker.run()));
        }

        info!(
            worker_count = config.worker_count,
            queue_capacity = config.queue_capacity,
            max_total_connections = config.pool.max_total_connections,
            max_connections_per_route = config.pool.max_connections_per_route,
            "dispatch engine started"
        );

        Ok(Self {
            config,
            queue,
            transport,
            stats,
            worker_states,
            worker_handles: Mutex::new(worker_handles),
            runtime,
            cancellation_token,
            accepting: AtomicBool::new(true),
        })
    }

    /// Hands `event` to the workers without waiting.
    ///
    /// If the queue is full, or the engine has been shut down, the event is
    /// dropped and the drop is logged. Newest events are the ones lost under
    /// sustained overload.
    pub fn dispatch(&self, event: LogEvent) {
        if !self.accepting.load(Ordering::Acquire) {
            self.stats.record_dropped();
            warn!(
                endpoint_url = %event.endpoint_url,
                error = %DispatchError::ShutDown,
                "dropping event dispatched after shutdown"
            );
            return;
        }

        match self.queue.try_enqueue(event) {
            Ok(()) => self.stats.record_enqueued(),
            Err(error @ DispatchError::ShutDown) => {
                self.stats.record_dropped();
                warn!(error = %error, "dropping event, queue closed by concurrent shutdown");
            },
            Err(error) => {
                self.stats.record_dropped();
                error!(capacity = self.queue.capacity(), error = %error, "dropping event");
            },
        }
    }

    /// Closes the transport and terminates every worker immediately.
    ///
    /// In-flight dispatches are abandoned and queued events discarded. A close
    /// failure is logged and does not stop the workers from being cancelled.
    /// Calling this again is harmless: the repeated close failure is logged
    /// and there is nothing left to cancel.
    pub fn shutdown(&self) {
        self.shutdown_now();
    }

    /// Stops accepting events, waits up to `timeout` for the workers to drain
    /// the queue and finish in-flight dispatches, then shuts down.
    ///
    /// Returns the number of events that were queued or in flight when the
    /// forcible shutdown ran.
    pub async fn shutdown_graceful(&self, timeout: Duration) -> usize {
        self.accepting.store(false, Ordering::Release);

        info!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            queue_depth = self.queue.len(),
            "draining dispatch queue before shutdown"
        );

        let drained = tokio::time::timeout(timeout, async {
            while !self.is_idle() {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                queue_depth = self.queue.len(),
                in_flight = self.stats.snapshot(0).in_flight_dispatches,
                "drain timed out, forcing shutdown"
            );
        }

        self.shutdown_now()
    }

    fn shutdown_now(&self) -> usize {
        self.accepting.store(false, Ordering::Release);
        info!("shutting down dispatch engine");

        let in_flight = self.stats.snapshot(0).in_flight_dispatches;
        let handles = {
            // Workers are cancelled when this guard drops, even if close panics.
            let _cancel = self.cancellation_token.clone().drop_guard();

            if let Err(error) = self.transport.close() {
                error!(error = %error, category = %error.category(), "failed to close transport");
            }

            self.take_worker_handles()
        };

        for handle in &handles {
            handle.abort();
        }

        let discarded = self.queue.close(&self.runtime);
        if discarded > 0 {
            warn!(discarded, "discarded queued events on shutdown");
        }

        info!(aborted_workers = handles.len(), "dispatch engine shut down");
        discarded + usize::try_from(in_flight).unwrap_or(usize::MAX)
    }

    fn take_worker_handles(&self) -> Vec<JoinHandle<()>> {
        let mut handles = self.worker_handles.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *handles)
    }

    fn is_idle(&self) -> bool {
        let stats = self.stats.snapshot(self.queue.len());
        stats.queue_depth == 0
            && stats.in_flight_dispatches == 0
            && stats.events_taken >= stats.events_enqueued
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot(self.queue.len())
    }

    /// Current state of each worker, indexed by worker id.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.worker_states.iter().map(|state| state.get()).collect()
    }

    /// Number of events waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Capacity of the queue.
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Whether shutdown has started.
    pub fn is_shut_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        if self.cancellation_token.is_cancelled() {
            return;
        }

        let handles = self.take_worker_handles();
        let active_workers = handles.iter().filter(|h| !h.is_finished()).count();

        self.cancellation_token.cancel();
        for handle in &handles {
            handle.abort();
        }

        if active_workers > 0 {
            warn!(
                active_workers,
                queue_depth = self.queue.len(),
                "dispatch engine dropped without shutdown, cancelling workers"
            );
        } else {
            debug!("dispatch engine dropped without shutdown");
        }
    }
}

//! Persistent dispatch workers.
//!
//! Each worker loops: take one event, build its request, execute it, classify
//! the response, record the outcome. Every failure inside an iteration,
//! including a panic, is contained there; only cancellation ends the loop. An
//! in-flight dispatch is abandoned as soon as the engine cancels, the worker
//! does not wait for the response.

use std::{
    any::Any,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::DispatchError,
    event::{LogEvent, RequestMethod},
    outcome::DispatchOutcome,
    queue::EventQueue,
    request::build_request,
    stats::StatsRecorder,
    transport::Transport,
};

/// Observable lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Blocked waiting for the next event.
    Waiting = 0,
    /// Turning an event into a request.
    Building = 1,
    /// Request handed to the transport.
    Executing = 2,
    /// Loop has exited. Terminal.
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Waiting,
            1 => Self::Building,
            2 => Self::Executing,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Building => write!(f, "building"),
            Self::Executing => write!(f, "executing"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Shared view of one worker's state.
#[derive(Debug)]
pub(crate) struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Waiting as u8))
    }

    pub(crate) fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WorkerState) {
        // Terminated is final even if a late transition races the drop.
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current != WorkerState::Terminated as u8).then_some(state as u8)
        });
    }
}

/// Marks the worker terminated however its task ends: normal exit, abort, or
/// being dropped before the first poll.
#[derive(Debug)]
struct Lifecycle {
    state: Arc<WorkerStateCell>,
    stats: Arc<StatsRecorder>,
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.state.set(WorkerState::Terminated);
        self.stats.worker_stopped();
    }
}

/// Clears the in-flight mark if the dispatch never reaches an outcome.
struct InFlight<'a> {
    stats: &'a StatsRecorder,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Success { .. } => self.stats.record_success(),
            DispatchOutcome::ProtocolError { .. } => self.stats.record_protocol_error(),
            DispatchOutcome::TransportError(_) => self.stats.record_transport_error(),
        }
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.stats.record_abandoned();
        }
    }
}

/// A single dispatch worker.
pub(crate) struct DispatchWorker {
    id: usize,
    queue: EventQueue,
    transport: Arc<dyn Transport>,
    stats: Arc<StatsRecorder>,
    cancellation_token: CancellationToken,
    lifecycle: Lifecycle,
}

impl DispatchWorker {
    /// Creates a worker and counts it as active.
    pub(crate) fn new(
        id: usize,
        queue: EventQueue,
        transport: Arc<dyn Transport>,
        stats: Arc<StatsRecorder>,
        state: Arc<WorkerStateCell>,
        cancellation_token: CancellationToken,
    ) -> Self {
        stats.worker_started();
        let lifecycle = Lifecycle { state, stats: stats.clone() };
        Self { id, queue, transport, stats, cancellation_token, lifecycle }
    }

    /// Runs until cancelled.
    pub(crate) async fn run(self) {
        info!(worker_id = self.id, "dispatch worker starting");

        loop {
            self.lifecycle.state.set(WorkerState::Waiting);

            let Some(event) = self.queue.take(&self.cancellation_token).await else {
                break;
            };

            self.stats.record_taken();
            let in_flight = InFlight { stats: &self.stats, settled: false };
            let method = event.method;
            let endpoint_url = event.endpoint_url.clone();

            let outcome = tokio::select! {
                biased;
                () = self.cancellation_token.cancelled() => {
                    debug!(
                        worker_id = self.id,
                        %method,
                        endpoint_url = %endpoint_url,
                        "abandoning in-flight dispatch on shutdown"
                    );
                    break;
                },
                outcome = self.dispatch_contained(event) => outcome,
            };

            in_flight.settle(&outcome);
            self.log_outcome(&outcome, method, &endpoint_url);
        }

        info!(worker_id = self.id, "dispatch worker stopped");
    }

    async fn dispatch_contained(&self, event: LogEvent) -> DispatchOutcome {
        match AssertUnwindSafe(self.dispatch(event)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                DispatchOutcome::TransportError(DispatchError::panicked(panic_message(&*payload)))
            },
        }
    }

    async fn dispatch(&self, event: LogEvent) -> DispatchOutcome {
        self.lifecycle.state.set(WorkerState::Building);
        let request = match build_request(&event) {
            Ok(request) => request,
            Err(error) => return DispatchOutcome::TransportError(error),
        };

        self.lifecycle.state.set(WorkerState::Executing);
        DispatchOutcome::from_response(self.transport.execute(request).await)
    }

    fn log_outcome(&self, outcome: &DispatchOutcome, method: RequestMethod, endpoint_url: &str) {
        match outcome {
            DispatchOutcome::Success { status_code } => {
                debug!(worker_id = self.id, %method, endpoint_url, status_code, "event dispatched");
            },
            DispatchOutcome::ProtocolError { status_code } => {
                warn!(
                    worker_id = self.id,
                    %method,
                    endpoint_url,
                    status_code,
                    "unexpected response from event endpoint"
                );
            },
            DispatchOutcome::TransportError(error) => {
                error!(
                    worker_id = self.id,
                    %method,
                    endpoint_url,
                    error = %error,
                    category = %error.category(),
                    "event dispatch failed"
                );
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::mock::{MockReply, MockTransport};

    struct Harness {
        queue: EventQueue,
        transport: Arc<MockTransport>,
        stats: Arc<StatsRecorder>,
        state: Arc<WorkerStateCell>,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new(transport: MockTransport) -> Self {
            Self {
                queue: EventQueue::new(16).unwrap(),
                transport: Arc::new(transport),
                stats: Arc::new(StatsRecorder::default()),
                state: Arc::new(WorkerStateCell::new()),
                cancel: CancellationToken::new(),
            }
        }

        fn spawn(&self) -> tokio::task::JoinHandle<()> {
            let worker = DispatchWorker::new(
                0,
                self.queue.clone(),
                self.transport.clone(),
                self.stats.clone(),
                self.state.clone(),
                self.cancel.clone(),
            );
            tokio::spawn(worker.run())
        }

        async fn settle(&self, completed: u64) {
            for _ in 0..200 {
                if self.stats.snapshot(0).completed() >= completed {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("worker did not complete {completed} dispatches");
        }
    }

    #[tokio::test]
    async fn worker_returns_to_waiting_after_dispatch() {
        let harness = Harness::new(MockTransport::new());
        let handle = harness.spawn();

        assert!(harness.queue.try_enqueue(LogEvent::get("http://localhost/a")).is_ok());
        harness.settle(1).await;
        for _ in 0..200 {
            if harness.state.get() == WorkerState::Waiting {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(harness.state.get(), WorkerState::Waiting);
        assert_eq!(harness.stats.snapshot(0).successful_deliveries, 1);

        harness.cancel.cancel();
        handle.await.unwrap();
        assert_eq!(harness.state.get(), WorkerState::Terminated);
    }

    #[tokio::test]
    async fn panic_is_contained_and_loop_continues() {
        let harness = Harness::new(MockTransport::new());
        harness.transport.push_reply(MockReply::Panic);
        let handle = harness.spawn();

        assert!(harness.queue.try_enqueue(LogEvent::get("http://localhost/boom")).is_ok());
        assert!(harness.queue.try_enqueue(LogEvent::get("http://localhost/ok")).is_ok());
        harness.settle(2).await;

        let stats = harness.stats.snapshot(0);
        assert_eq!(stats.transport_errors, 1);
        assert_eq!(stats.successful_deliveries, 1);
        assert!(!handle.is_finished());

        harness.cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_endpoint_is_recorded_not_sent() {
        let harness = Harness::new(MockTransport::new());
        let handle = harness.spawn();

        assert!(harness.queue.try_enqueue(LogEvent::get("not a url")).is_ok());
        harness.settle(1).await;

        assert_eq!(harness.stats.snapshot(0).transport_errors, 1);
        assert_eq!(harness.transport.started(), 0);

        harness.cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_abandons_hung_dispatch() {
        let harness = Harness::new(MockTransport::new());
        harness.transport.push_reply(MockReply::Hang);
        let handle = harness.spawn();

        assert!(harness.queue.try_enqueue(LogEvent::get("http://localhost/slow")).is_ok());
        for _ in 0..200 {
            if harness.state.get() == WorkerState::Executing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(harness.stats.snapshot(0).in_flight_dispatches, 1);

        harness.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should exit without waiting for the response")
            .unwrap();

        let stats = harness.stats.snapshot(0);
        assert_eq!(stats.in_flight_dispatches, 0);
        assert_eq!(stats.completed(), 0);
        assert_eq!(harness.state.get(), WorkerState::Terminated);
    }

    #[tokio::test]
    async fn aborted_worker_is_terminated() {
        let harness = Harness::new(MockTransport::new());
        let handle = harness.spawn();
        assert_eq!(harness.stats.snapshot(0).active_workers, 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert_eq!(harness.state.get(), WorkerState::Terminated);
        assert_eq!(harness.stats.snapshot(0).active_workers, 0);
    }

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u32), "non-string panic payload");
    }
}

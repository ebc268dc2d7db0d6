//! Bounded FIFO buffer between producers and dispatch workers.
//!
//! Producers insert with [`EventQueue::try_enqueue`], which never waits. All
//! workers share one receiver behind an async mutex, so every accepted event
//! is handed to exactly one taker. The size is derived from the channel's free
//! permits and can never exceed the capacity fixed at construction.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{self, error::TrySendError},
        Mutex,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{DispatchError, Result},
    event::LogEvent,
};

/// Fixed-capacity queue of pending log events.
#[derive(Debug, Clone)]
pub struct EventQueue {
    sender: mpsc::Sender<LogEvent>,
    receiver: Arc<Mutex<mpsc::Receiver<LogEvent>>>,
    closed: Arc<AtomicBool>,
    capacity: usize,
}

impl EventQueue {
    /// Creates an empty queue holding at most `capacity` events.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidQueueCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DispatchError::InvalidQueueCapacity { capacity });
        }

        let (sender, receiver) = mpsc::channel(capacity);
        Ok(Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            closed: Arc::new(AtomicBool::new(false)),
            capacity,
        })
    }

    /// Inserts `event` if there is room.
    ///
    /// Never waits. On rejection the event is dropped and the size is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::QueueFull` at capacity and
    /// `DispatchError::ShutDown` once the queue has been closed.
    pub fn try_enqueue(&self, event: LogEvent) -> Result<()> {
        if self.is_closed() {
            return Err(DispatchError::ShutDown);
        }

        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull { capacity: self.capacity }),
            Err(TrySendError::Closed(_)) => Err(DispatchError::ShutDown),
        }
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once `cancel` fires, even if events remain queued.
    pub async fn take(&self, cancel: &CancellationToken) -> Option<LogEvent> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            event = async { self.receiver.lock().await.recv().await } => event,
        }
    }

    /// Stops accepting events and discards everything still queued.
    ///
    /// Returns the number of events discarded. If a taker still holds the
    /// receiver, the discard is finished on `runtime` as soon as the taker
    /// lets go, and the returned count is the size at the time of the call.
    pub fn close(&self, runtime: &Handle) -> usize {
        self.closed.store(true, Ordering::Release);

        if let Ok(mut receiver) = self.receiver.try_lock() {
            return Self::discard(&mut receiver);
        }

        let pending = self.len();
        let receiver = self.receiver.clone();
        runtime.spawn(async move {
            let discarded = Self::discard(&mut *receiver.lock_owned().await);
            debug!(discarded, "finished discarding queue after taker released it");
        });
        pending
    }

    fn discard(receiver: &mut mpsc::Receiver<LogEvent>) -> usize {
        receiver.close();
        let mut discarded = 0;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Whether [`EventQueue::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    /// Whether the queue holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of events the queue can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Write Scheduler
//!
//! All outbound writes to one wireless device go through a single FIFO
//! queue with exactly one write in flight. A failed write is retried in
//! place (it keeps its position at the head of the queue) until it succeeds
//! or runs out of attempts; only then is the caller told and the next item
//! started.
//!
//! There is no long-lived worker. The first submission into an idle queue
//! spawns a drain task that runs until the queue is empty and then exits;
//! the next submission starts a fresh one.

use crate::error::DeviceError;
use crate::infrastructure::bluetooth::adapter::GattCharacteristic;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Upper bound on attempts per write: the first try plus two retries
pub const MAX_ATTEMPTS: u8 = 3;

/// Terminal success of a queued write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Attempts used, including the successful one
    pub attempts: u8,
    /// Time from submission to completion, queueing included
    pub elapsed: Duration,
}

type WriteResult = Result<WriteOutcome, DeviceError>;

struct QueuedWrite {
    target: Arc<dyn GattCharacteristic>,
    payload: Vec<u8>,
    attempts: u8,
    submitted_at: Instant,
    responder: oneshot::Sender<WriteResult>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<QueuedWrite>,
    in_flight: bool,
    closed: bool,
}

/// Future resolved when the scheduler is done with a write
pub struct PendingWrite {
    rx: oneshot::Receiver<WriteResult>,
}

impl Future for PendingWrite {
    type Output = WriteResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(DeviceError::QueueClosed)))
    }
}

#[derive(Clone)]
pub struct WriteScheduler {
    state: Arc<Mutex<QueueState>>,
    max_attempts: u8,
}

impl Default for WriteScheduler {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS)
    }
}

impl WriteScheduler {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS`
    pub fn new(max_attempts: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
        }
    }

    /// Queue a write and return a handle to its outcome.
    ///
    /// The queue position is taken here, synchronously, so the order of
    /// `submit` calls is the order the device sees. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, target: Arc<dyn GattCharacteristic>, payload: Vec<u8>) -> PendingWrite {
        let (responder, rx) = oneshot::channel();
        let start_drain = {
            let mut state = lock(&self.state);
            if state.closed {
                let _ = responder.send(Err(DeviceError::QueueClosed));
                return PendingWrite { rx };
            }
            state.queue.push_back(QueuedWrite {
                target,
                payload,
                attempts: 0,
                submitted_at: Instant::now(),
                responder,
            });
            trace!("Write queued, depth {}", state.queue.len());
            !std::mem::replace(&mut state.in_flight, true)
        };

        if start_drain {
            tokio::spawn(drain(self.state.clone(), self.max_attempts));
        }
        PendingWrite { rx }
    }

    /// Queue a write and wait for its outcome
    pub async fn enqueue(
        &self,
        target: Arc<dyn GattCharacteristic>,
        payload: Vec<u8>,
    ) -> WriteResult {
        self.submit(target, payload).await
    }

    /// Number of writes queued or in flight
    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn is_idle(&self) -> bool {
        !lock(&self.state).in_flight
    }

    /// Reject everything not yet started and refuse new submissions.
    /// A write already on the wire runs to completion.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        let keep = usize::from(state.in_flight && !state.queue.is_empty());
        let rejected: Vec<QueuedWrite> = state.queue.drain(keep..).collect();
        drop(state);

        reject(rejected);
    }
}

fn reject(writes: Vec<QueuedWrite>) {
    if !writes.is_empty() {
        debug!("Write queue closed, rejecting {} writes", writes.len());
    }
    for write in writes {
        let _ = write.responder.send(Err(DeviceError::QueueClosed));
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run queued writes one at a time until the queue is empty
async fn drain(state: Arc<Mutex<QueueState>>, max_attempts: u8) {
    loop {
        let (target, payload) = {
            let mut guard = lock(&state);
            if guard.closed || guard.queue.is_empty() {
                let rejected: Vec<QueuedWrite> = guard.queue.drain(..).collect();
                guard.in_flight = false;
                drop(guard);
                reject(rejected);
                return;
            }
            let head = &guard.queue[0];
            (head.target.clone(), head.payload.clone())
        };

        let result = write_with_retry(&state, target.as_ref(), &payload, max_attempts).await;

        let finished = lock(&state).queue.pop_front();
        if let Some(write) = finished {
            let outcome = result.map(|attempts| WriteOutcome {
                attempts,
                elapsed: write.submitted_at.elapsed(),
            });
            match &outcome {
                Ok(o) => debug!("Write finished after {}ms", o.elapsed.as_millis()),
                Err(e) => warn!("Bluetooth write failed: {}", e),
            }
            let _ = write.responder.send(outcome);
        }
    }
}

/// Retry the queue head in place. Returns the attempt count on success.
async fn write_with_retry(
    state: &Mutex<QueueState>,
    target: &dyn GattCharacteristic,
    payload: &[u8],
    max_attempts: u8,
) -> Result<u8, DeviceError> {
    loop {
        let attempts = {
            let mut guard = lock(state);
            match guard.queue.front_mut() {
                Some(head) => {
                    head.attempts += 1;
                    head.attempts
                }
                None => return Err(DeviceError::QueueClosed),
            }
        };

        match target.write_value(payload).await {
            Ok(()) => return Ok(attempts),
            Err(e) if attempts < max_attempts => {
                debug!(
                    "Write to {} failed (attempt {}/{}): {}, retrying",
                    target.uuid(),
                    attempts,
                    max_attempts,
                    e
                );
            }
            Err(source) => return Err(DeviceError::WriteExhausted { attempts, source }),
        }
    }
}

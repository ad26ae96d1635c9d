use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::common::FrameReference;

/// How often a frame that failed to load is handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next attempt, given how many attempts already failed.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn exhausted(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts
    }
}

/// A frame taken out of the queue. It stays counted as in flight until it is
/// handed back through [`FrameQueue::complete`] or [`FrameQueue::retry`].
#[derive(Debug)]
pub struct QueuedFrame {
    frame: FrameReference,
    failed_attempts: u32,
    ready_at: Instant,
}

impl QueuedFrame {
    pub fn frame(&self) -> &FrameReference {
        &self.frame
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedFrame>,
    in_flight: usize,
}

/// Unbounded queue of frames waiting for a worker. Pushing and popping never
/// block, so workers can keep checking whether the run is over.
#[derive(Default)]
pub struct FrameQueue {
    state: Mutex<QueueState>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, frame: FrameReference) {
        self.lock().pending.push_back(QueuedFrame {
            frame,
            failed_attempts: 0,
            ready_at: Instant::now(),
        });
    }

    /// Takes the first frame whose retry backoff has elapsed.
    pub fn try_pop(&self) -> Option<QueuedFrame> {
        let now = Instant::now();
        let mut state = self.lock();
        let index = state.pending.iter().position(|entry| entry.ready_at <= now)?;
        let entry = state.pending.remove(index)?;
        state.in_flight += 1;
        Some(entry)
    }

    /// Frames waiting in the queue, including ones backing off.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Nothing queued and nothing being worked on.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.in_flight == 0
    }

    /// Releases a frame that is finished with, successfully or not.
    pub fn complete(&self, entry: QueuedFrame) {
        drop(entry);
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Puts a failed frame back; it becomes visible again after `delay`.
    pub fn retry(&self, mut entry: QueuedFrame, delay: Duration) {
        entry.failed_attempts += 1;
        entry.ready_at = Instant::now() + delay;
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.pending.push_back(entry);
    }
}

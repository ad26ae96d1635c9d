use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::intake::FrameQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStatus {
    NotStarted,
    Running,
    Done,
    Failed,
}

impl ProducerStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ProducerStatus::Done | ProducerStatus::Failed)
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Seeding,
    Processing,
    Draining,
    Finalizing,
    Done,
    Failed,
}

/// State shared by the producer, watcher, workers and progress reporter for
/// the duration of a run.
pub struct PipelineState {
    producer: watch::Sender<ProducerStatus>,
    ingestion_closed: AtomicBool,
    processed: Vec<AtomicUsize>,
    queue: Arc<FrameQueue>,
}

impl PipelineState {
    pub fn new(workers: usize, queue: Arc<FrameQueue>) -> Self {
        let (producer, _) = watch::channel(ProducerStatus::NotStarted);
        Self {
            producer,
            ingestion_closed: AtomicBool::new(false),
            processed: (0..workers).map(|_| AtomicUsize::new(0)).collect(),
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    pub fn workers(&self) -> usize {
        self.processed.len()
    }

    pub fn set_producer_status(&self, status: ProducerStatus) {
        self.producer.send_replace(status);
    }

    pub fn producer_status(&self) -> ProducerStatus {
        *self.producer.borrow()
    }

    pub fn subscribe_producer(&self) -> watch::Receiver<ProducerStatus> {
        self.producer.subscribe()
    }

    /// No more frames will be pushed: the producer has exited and the frame
    /// directory has been reconciled, or the queue was seeded up front.
    pub fn close_ingestion(&self) {
        self.ingestion_closed.store(true, Ordering::Release);
    }

    pub fn ingestion_closed(&self) -> bool {
        self.ingestion_closed.load(Ordering::Acquire)
    }

    /// True once every frame that will ever exist has been handled.
    pub fn is_finished(&self) -> bool {
        self.ingestion_closed() && self.queue.is_drained()
    }

    /// Each worker only ever bumps its own counter.
    pub fn record_processed(&self, worker: usize) {
        if let Some(counter) = self.processed.get(worker) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn processed_counts(&self) -> Vec<usize> {
        self.processed
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .collect()
    }

    pub fn total_processed(&self) -> usize {
        self.processed_counts().iter().sum()
    }
}

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::state::PipelineState;

/// Point-in-time view of how far the workers have got.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub workers: usize,
    pub processed: usize,
    pub remaining: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        let total = self.processed + self.remaining;
        if total == 0 {
            return 0.0;
        }
        self.processed as f64 / total as f64 * 100.0
    }

    pub fn status_line(&self) -> String {
        format!(
            "Processing images with {} workers: {} images processed, {} images remaining, {:.2}%. time={}",
            self.workers,
            self.processed,
            self.remaining,
            self.percent(),
            format_elapsed(self.elapsed)
        )
    }
}

/// `hh:mm:ss.ff`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hundredths = elapsed.subsec_millis() / 10;
    format!(
        "{:02}:{:02}:{:02}.{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
        hundredths
    )
}

/// Periodically prints an overwriting status line. Purely observational.
pub struct ProgressReporter {
    state: Arc<PipelineState>,
    interval: Duration,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(state: Arc<PipelineState>, interval: Duration, started: Instant) -> Self {
        Self {
            state,
            interval,
            started,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            workers: self.state.workers(),
            processed: self.state.total_processed(),
            remaining: self.state.queue().len(),
            elapsed: self.started.elapsed(),
        }
    }

    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = self.snapshot();
                        debug!(
                            processed = snapshot.processed,
                            remaining = snapshot.remaining,
                            "progress"
                        );
                        let mut stdout = std::io::stdout().lock();
                        let _ = write!(stdout, "\r{}", snapshot.status_line());
                        let _ = stdout.flush();
                    }
                }
            }
            // finish the overwriting line
            println!();
        })
    }
}

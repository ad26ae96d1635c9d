use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::color::{load_frame, ColorExtractor};
use super::result_set::ResultSet;
use super::state::PipelineState;
use crate::common::ColorSample;
use crate::error::{AppError, FrameError};
use crate::intake::{QueuedFrame, RetryPolicy};

const MAX_IDLE_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub cleanup: bool,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            cleanup: false,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Fixed set of workers draining the frame queue into the result set.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        state: Arc<PipelineState>,
        results: Arc<ResultSet>,
        extractor: Arc<dyn ColorExtractor>,
        settings: WorkerSettings,
        cancel_token: CancellationToken,
    ) -> Self {
        let workers = (0..count)
            .map(|id| {
                let worker = Worker {
                    id,
                    state: state.clone(),
                    results: results.clone(),
                    extractor: extractor.clone(),
                    settings,
                };
                tokio::spawn(worker.run(cancel_token.clone()))
            })
            .collect();
        Self { workers }
    }

    pub async fn join(self) -> Result<(), AppError> {
        for result in join_all(self.workers).await {
            result?;
        }
        Ok(())
    }
}

struct Worker {
    id: usize,
    state: Arc<PipelineState>,
    results: Arc<ResultSet>,
    extractor: Arc<dyn ColorExtractor>,
    settings: WorkerSettings,
}

impl Worker {
    async fn run(self, cancel_token: CancellationToken) {
        debug!("Worker {} started", self.id);
        let idle_cap = MAX_IDLE_BACKOFF.max(self.settings.poll_interval);
        let mut idle = self.settings.poll_interval;

        while !cancel_token.is_cancelled() {
            let Some(entry) = self.state.queue().try_pop() else {
                if self.state.is_finished() {
                    break;
                }
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = tokio::time::sleep(idle) => {}
                }
                idle = (idle * 2).min(idle_cap);
                continue;
            };
            idle = self.settings.poll_interval;
            self.process(entry).await;
        }
        debug!("Worker {} stopped", self.id);
    }

    async fn process(&self, entry: QueuedFrame) {
        let path = entry.frame().path.clone();
        let extractor = self.extractor.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let image = load_frame(&path)?;
            extractor.extract(&image)
        })
        .await
        .unwrap_or_else(|e| Err(FrameError::Malformed(format!("extraction task failed: {}", e))));

        let queue = self.state.queue();
        match outcome {
            Ok(rgb) => {
                let frame = entry.frame();
                let accepted = self.results.record(ColorSample::new(frame.ordinal, rgb));
                if accepted {
                    self.state.record_processed(self.id);
                }
                // only after the color is recorded
                if accepted && self.settings.cleanup {
                    if let Err(e) = tokio::fs::remove_file(&frame.path).await {
                        warn!("Failed to delete {}: {}", frame.path.display(), e);
                    }
                }
                queue.complete(entry);
            }
            Err(e) => {
                let failed = entry.failed_attempts() + 1;
                if e.is_transient() && !self.settings.retry.exhausted(failed) {
                    debug!(
                        "Worker {} requeueing frame {} (attempt {}): {}",
                        self.id,
                        entry.frame().ordinal,
                        failed,
                        e
                    );
                    queue.retry(entry, self.settings.retry.delay_for(failed));
                } else {
                    warn!(
                        "Giving up on frame {} after {} attempt(s): {}",
                        entry.frame().ordinal,
                        failed,
                        e
                    );
                    self.results.dead_letter(entry.frame(), failed, e.to_string());
                    queue.complete(entry);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FramePattern, FrameReference};
    use crate::intake::FrameQueue;
    use crate::pipeline::color::MeanColorExtractor;
    use crate::test_support::{stripe_color, write_frame};
    use image::Rgb;

    fn seeded_state(dir: &std::path::Path, frames: u64, workers: usize) -> Arc<PipelineState> {
        let queue = Arc::new(FrameQueue::new());
        // push in reverse so queue order differs from ordinal order
        for ordinal in (1..=frames).rev() {
            let path = write_frame(dir, ordinal, stripe_color(ordinal));
            queue.push(FrameReference::from_path(path, &FramePattern::any()).unwrap());
        }
        let state = Arc::new(PipelineState::new(workers, queue));
        state.close_ingestion();
        state
    }

    async fn run_pool(
        state: Arc<PipelineState>,
        settings: WorkerSettings,
    ) -> crate::pipeline::result_set::ResultParts {
        let results = Arc::new(ResultSet::new());
        let pool = WorkerPool::spawn(
            state.workers(),
            state.clone(),
            results.clone(),
            Arc::new(MeanColorExtractor),
            settings,
            CancellationToken::new(),
        );
        pool.join().await.unwrap();
        Arc::try_unwrap(results).ok().unwrap().into_parts()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn output_is_independent_of_worker_count() {
        let mut runs = Vec::new();
        for workers in [1, 4] {
            let dir = tempfile::tempdir().unwrap();
            let state = seeded_state(dir.path(), 12, workers);
            let parts = run_pool(state.clone(), WorkerSettings::default()).await;
            assert_eq!(state.total_processed(), 12);
            assert!(state.queue().is_drained());
            runs.push(parts.samples);
        }
        assert_eq!(runs[0], runs[1]);
        assert_eq!(
            runs[0].iter().map(|s| s.rgb).collect::<Vec<_>>(),
            (1..=12).map(stripe_color).collect::<Vec<_>>()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_file_is_retried_then_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path(), 3, 2);
        let broken = dir.path().join("img00004.png");
        std::fs::write(&broken, b"").unwrap();
        state.queue().push(FrameReference::new(4, broken.clone()));

        let settings = WorkerSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
            },
            ..WorkerSettings::default()
        };
        let parts = run_pool(state.clone(), settings).await;

        assert_eq!(parts.samples.len(), 3);
        assert_eq!(parts.dead_letters.len(), 1);
        assert_eq!(parts.dead_letters[0].ordinal, 4);
        assert_eq!(parts.dead_letters[0].attempts, 3);
        assert_eq!(parts.dead_letters[0].path, broken);
        assert!(state.queue().is_drained());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn frame_that_appears_late_is_picked_up_on_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img00001.png");
        std::fs::write(&path, b"").unwrap();
        let queue = Arc::new(FrameQueue::new());
        queue.push(FrameReference::new(1, path.clone()));
        let state = Arc::new(PipelineState::new(1, queue));
        state.close_ingestion();

        let writer_dir = dir.path().to_path_buf();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            write_frame(&writer_dir, 1, Rgb([9, 8, 7]));
        });

        let settings = WorkerSettings {
            retry: RetryPolicy {
                max_attempts: 50,
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
            },
            ..WorkerSettings::default()
        };
        let parts = run_pool(state, settings).await;
        writer.await.unwrap();

        assert_eq!(parts.samples, vec![ColorSample::new(1, Rgb([9, 8, 7]))]);
        assert!(parts.dead_letters.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cleanup_deletes_analyzed_frames() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path(), 5, 2);
        let settings = WorkerSettings {
            cleanup: true,
            ..WorkerSettings::default()
        };
        let parts = run_pool(state, settings).await;
        assert_eq!(parts.samples.len(), 5);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn duplicate_ordinals_are_not_counted_as_processed() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_frame(dir.path(), 1, stripe_color(1));
        let copy = dir.path().join("copy00001.png");
        std::fs::copy(&first, &copy).unwrap();

        let queue = Arc::new(FrameQueue::new());
        queue.push(FrameReference::new(1, first));
        queue.push(FrameReference::new(1, copy));
        let state = Arc::new(PipelineState::new(1, queue));
        state.close_ingestion();

        let results = Arc::new(ResultSet::new());
        let pool = WorkerPool::spawn(
            1,
            state.clone(),
            results.clone(),
            Arc::new(MeanColorExtractor),
            WorkerSettings::default(),
            CancellationToken::new(),
        );
        pool.join().await.unwrap();

        let parts = Arc::try_unwrap(results).ok().unwrap().into_parts();
        assert_eq!(parts.samples.len(), 1);
        assert_eq!(parts.rejected_duplicates, 1);
        assert_eq!(state.total_processed(), 1);
    }

    #[tokio::test]
    async fn cancelled_workers_stop_while_ingestion_is_open() {
        let state = Arc::new(PipelineState::new(2, Arc::new(FrameQueue::new())));
        let cancel_token = CancellationToken::new();
        let pool = WorkerPool::spawn(
            2,
            state,
            Arc::new(ResultSet::new()),
            Arc::new(MeanColorExtractor),
            WorkerSettings::default(),
            cancel_token.clone(),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_token.cancel();
        pool.join().await.unwrap();
    }
}

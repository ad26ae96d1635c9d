use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::queue::FrameQueue;
use crate::common::{FramePattern, FrameReference};
use crate::error::AppError;
use crate::pipeline::state::{PipelineState, ProducerStatus};

/// Result of listing a frame directory.
#[derive(Debug, Default)]
pub struct FrameListing {
    /// Matching frames, ordered by ordinal.
    pub frames: Vec<FrameReference>,
    /// Regular files whose names carry no ordinal.
    pub skipped: Vec<PathBuf>,
}

/// Lists the regular files in `dir` (not recursive).
pub async fn list_frames(dir: &Path, pattern: &FramePattern) -> Result<FrameListing, AppError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AppError::io(dir, e))?;
    let mut listing = FrameListing::default();

    while let Some(entry) = entries.next_entry().await.map_err(|e| AppError::io(dir, e))? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| AppError::io(&path, e))?;
        if !file_type.is_file() {
            continue;
        }
        match FrameReference::from_path(path.clone(), pattern) {
            Ok(frame) => listing.frames.push(frame),
            Err(_) => listing.skipped.push(path),
        }
    }
    listing.frames.sort_by_key(|frame| frame.ordinal);
    Ok(listing)
}

/// Feeds newly written frame files into the queue while the decoder runs.
///
/// New files are discovered by listing the directory on an interval. Once the
/// producer reports that it has exited, one last listing picks up anything
/// written since the previous pass, then ingestion is closed.
pub struct FrameWatcher {
    dir: PathBuf,
    pattern: FramePattern,
    queue: Arc<FrameQueue>,
    seen: HashSet<PathBuf>,
    interval: Duration,
}

impl FrameWatcher {
    pub fn new(
        dir: impl Into<PathBuf>,
        pattern: FramePattern,
        queue: Arc<FrameQueue>,
        interval: Duration,
    ) -> Self {
        Self {
            dir: dir.into(),
            pattern,
            queue,
            seen: HashSet::new(),
            interval,
        }
    }

    /// Pushes matching files not seen before, holding back the highest ordinal.
    /// The decoder writes frames in order, so only the newest file can still be
    /// partially written. Returns how many were new.
    pub async fn scan(&mut self) -> Result<usize, AppError> {
        self.push_unseen(true).await
    }

    /// Pushes every matching file not seen before, the newest included. Only
    /// safe once the decoder has exited.
    pub async fn reconcile(&mut self) -> Result<usize, AppError> {
        self.push_unseen(false).await
    }

    async fn push_unseen(&mut self, hold_newest: bool) -> Result<usize, AppError> {
        let mut listing = list_frames(&self.dir, &self.pattern).await?;
        if hold_newest {
            listing.frames.pop();
        }
        let mut added = 0;
        for frame in listing.frames {
            if self.seen.insert(frame.path.clone()) {
                debug!("Queued frame {} ({})", frame.ordinal, frame.path.display());
                self.queue.push(frame);
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn seen(&self) -> usize {
        self.seen.len()
    }

    /// Watches until the producer finishes. Returns the number of frames queued.
    pub fn spawn(mut self, state: Arc<PipelineState>) -> JoinHandle<Result<usize, AppError>> {
        tokio::spawn(async move {
            let mut producer = state.subscribe_producer();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = async {
                        let _ = producer.wait_for(ProducerStatus::is_finished).await;
                    } => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.scan().await {
                            warn!("Frame directory scan failed: {}", e);
                        }
                    }
                }
            }

            let reconciled = self.reconcile().await;
            state.close_ingestion();
            let added = reconciled?;
            if added > 0 {
                debug!("Final listing found {} frames the watcher had not seen", added);
            }
            Ok(self.seen())
        })
    }
}

pub mod producer;
pub mod queue;
pub mod watcher;

pub use producer::{DecodeJob, FfmpegDecoder, FrameDecoder, FrameProducer};
pub use queue::{FrameQueue, QueuedFrame, RetryPolicy};
pub use watcher::{list_frames, FrameWatcher};

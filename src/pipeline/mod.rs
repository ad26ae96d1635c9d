pub mod color;
pub mod progress;
pub mod result_set;
pub mod state;
pub mod worker_pool;

pub use color::{ColorExtractor, HistogramColorExtractor, MeanColorExtractor};
pub use progress::ProgressReporter;
pub use result_set::{DeadLetter, ResultSet};
pub use state::{PipelinePhase, PipelineState, ProducerStatus};
pub use worker_pool::{WorkerPool, WorkerSettings};

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::common::FramePattern;
use crate::error::AppError;
use crate::pipeline::state::{PipelineState, ProducerStatus};

/// Everything the decoder needs to materialize frames on disk.
#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub frame_rate: Option<String>,
    pub frame_height: u32,
    pub pattern: FramePattern,
}

/// Writes sequentially numbered frame files for `job` and returns once the
/// decode has finished.
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    async fn decode(&self, job: &DecodeJob) -> Result<(), AppError>;
}

/// Runs an ffmpeg-compatible executable.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: String,
}

impl FfmpegDecoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn arguments(&self, job: &DecodeJob) -> Vec<OsString> {
        let mut filter = format!("scale=-1:{}", job.frame_height);
        if let Some(rate) = &job.frame_rate {
            filter.push_str(&format!(",fps={}", rate));
        }
        vec![
            OsString::from("-hide_banner"),
            OsString::from("-loglevel"),
            OsString::from("error"),
            OsString::from("-i"),
            job.input.clone().into_os_string(),
            OsString::from("-vf"),
            OsString::from(filter),
            job.output_dir
                .join(job.pattern.file_template())
                .into_os_string(),
        ]
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl FrameDecoder for FfmpegDecoder {
    async fn decode(&self, job: &DecodeJob) -> Result<(), AppError> {
        let args = self.arguments(job);
        info!(
            "Running {} {}",
            self.program,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let status = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| AppError::DecoderSpawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(AppError::Decoder { status });
        }
        Ok(())
    }
}

/// Runs the decoder once on its own task so analysis can start while frames
/// are still being written.
pub struct FrameProducer {
    decoder: Arc<dyn FrameDecoder>,
    job: DecodeJob,
}

impl FrameProducer {
    pub fn new(decoder: Arc<dyn FrameDecoder>, job: DecodeJob) -> Self {
        Self { decoder, job }
    }

    /// Marks the producer finished when the decoder exits either way. A failed
    /// decode cancels `cancel_token` so the rest of the pipeline stops.
    pub fn spawn(
        self,
        state: Arc<PipelineState>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<Result<(), AppError>> {
        tokio::spawn(async move {
            info!(
                "Generating images from {} in {}",
                self.job.input.display(),
                self.job.output_dir.display()
            );
            state.set_producer_status(ProducerStatus::Running);
            match self.decoder.decode(&self.job).await {
                Ok(()) => {
                    info!("Frame generation finished");
                    state.set_producer_status(ProducerStatus::Done);
                    Ok(())
                }
                Err(e) => {
                    error!("Frame generation failed: {}", e);
                    state.set_producer_status(ProducerStatus::Failed);
                    cancel_token.cancel();
                    Err(e)
                }
            }
        })
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::common::FramePattern;
use crate::config::{Configuration, PipelineMode};
use crate::error::{AppError, ConfigError};
use crate::intake::{list_frames, DecodeJob, FfmpegDecoder, FrameDecoder, FrameProducer, FrameQueue, FrameWatcher};
use crate::pipeline::color::{extractor_for, ColorExtractor};
use crate::pipeline::progress::{format_elapsed, ProgressReporter};
use crate::pipeline::result_set::{DeadLetter, ResultParts, ResultSet};
use crate::pipeline::state::{PipelinePhase, PipelineState, ProducerStatus};
use crate::pipeline::worker_pool::{WorkerPool, WorkerSettings};
use crate::render::{self, display, RenderSettings, RenderedOutput};

/// Summary of a finished run.
#[derive(Debug)]
pub struct PipelineReport {
    pub mode: PipelineMode,
    pub processed: usize,
    pub per_worker: Vec<usize>,
    pub dead_letters: Vec<DeadLetter>,
    pub rejected_duplicates: usize,
    pub elapsed: Duration,
    pub output: RenderedOutput,
    pub phases: Vec<PipelinePhase>,
}

impl PipelineReport {
    pub fn summary(&self) -> String {
        format!(
            "Done! Processed {} images in {}. Output written to {} and {}",
            self.processed,
            format_elapsed(self.elapsed),
            self.output.image_path.display(),
            self.output.csv_path.display()
        )
    }
}

/// Tasks started while seeding that must be awaited before finalizing.
#[derive(Default)]
struct Ingestion {
    producer: Option<JoinHandle<Result<(), AppError>>>,
    watcher: Option<JoinHandle<Result<usize, AppError>>>,
}

/// Owns one pipeline run from seeding to the written outputs.
pub struct Coordinator {
    configuration: Configuration,
    extractor: Arc<dyn ColorExtractor>,
    decoder: Arc<dyn FrameDecoder>,
    phases: Vec<PipelinePhase>,
}

impl Coordinator {
    fn new(
        configuration: Configuration,
        extractor: Arc<dyn ColorExtractor>,
        decoder: Arc<dyn FrameDecoder>,
    ) -> Self {
        Self {
            configuration,
            extractor,
            decoder,
            phases: vec![PipelinePhase::Idle],
        }
    }

    fn transition(&mut self, phase: PipelinePhase) {
        info!("Pipeline phase: {:?}", phase);
        self.phases.push(phase);
    }

    pub async fn run(mut self) -> Result<PipelineReport, AppError> {
        let started = Instant::now();
        let mode = self.configuration.mode();
        let result = match &mode {
            PipelineMode::CsvImport { path } => self.run_csv_import(path.clone(), started).await,
            PipelineMode::Video { .. } | PipelineMode::Directory => {
                self.run_frames(&mode, started).await
            }
        };
        if let Err(e) = &result {
            self.transition(PipelinePhase::Failed);
            error!("Pipeline failed: {}", e);
        }
        result
    }

    async fn run_csv_import(
        &mut self,
        path: PathBuf,
        started: Instant,
    ) -> Result<PipelineReport, AppError> {
        info!("Rendering colors from {}", path.display());
        let samples = render::import_csv(&path)?;
        let parts = ResultSet::from_samples(samples).into_parts();
        let processed = parts.samples.len();
        let (output, parts) = self.finalize(parts).await?;
        self.transition(PipelinePhase::Done);
        Ok(PipelineReport {
            mode: PipelineMode::CsvImport { path },
            processed,
            per_worker: Vec::new(),
            dead_letters: parts.dead_letters,
            rejected_duplicates: parts.rejected_duplicates,
            elapsed: started.elapsed(),
            output,
            phases: self.phases.clone(),
        })
    }

    async fn run_frames(
        &mut self,
        mode: &PipelineMode,
        started: Instant,
    ) -> Result<PipelineReport, AppError> {
        self.transition(PipelinePhase::Seeding);
        let queue = Arc::new(FrameQueue::new());
        let state = Arc::new(PipelineState::new(self.configuration.workers, queue.clone()));
        let results = Arc::new(ResultSet::new());
        let cancel_token = CancellationToken::new();

        let ingestion = self.seed(mode, &state, &cancel_token).await?;

        self.transition(PipelinePhase::Processing);
        info!(
            "Analyzing frames with {} workers using the {} extractor",
            self.configuration.workers,
            self.extractor.name()
        );
        let reporter_token = cancel_token.child_token();
        let reporter = ProgressReporter::new(
            state.clone(),
            self.configuration.progress_interval(),
            started,
        )
        .spawn(reporter_token.clone());
        let pool = WorkerPool::spawn(
            self.configuration.workers,
            state.clone(),
            results.clone(),
            self.extractor.clone(),
            WorkerSettings {
                cleanup: self.configuration.cleanup,
                retry: self.configuration.retry_policy(),
                poll_interval: self.configuration.poll_interval(),
            },
            cancel_token.clone(),
        );

        self.transition(PipelinePhase::Draining);
        let produced = match ingestion.producer {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                // a panicked producer never reported its exit
                state.set_producer_status(ProducerStatus::Failed);
                Err(e.into())
            }),
            None => Ok(()),
        };
        let watched = match ingestion.watcher {
            Some(handle) => match handle.await {
                Ok(result) => result.map(|_| ()),
                Err(e) => {
                    state.close_ingestion();
                    Err(e.into())
                }
            },
            None => Ok(()),
        };
        if produced.is_err() || watched.is_err() {
            cancel_token.cancel();
        }
        // in-flight frames finish before a fatal error surfaces
        pool.join().await?;
        reporter_token.cancel();
        reporter.await?;
        produced?;
        watched?;

        info!(
            "Processed {} images in {}",
            state.total_processed(),
            format_elapsed(started.elapsed())
        );

        let parts = Arc::try_unwrap(results)
            .map_err(|_| AppError::Task("result set still shared after workers stopped".into()))?
            .into_parts();
        if parts.samples.is_empty() && parts.dead_letters.is_empty() {
            warn!("No frames found in {}", self.configuration.frames_dir.display());
        }
        for letter in &parts.dead_letters {
            warn!(
                "Frame {} ({}) failed after {} attempt(s): {}",
                letter.ordinal,
                letter.path.display(),
                letter.attempts,
                letter.reason
            );
        }

        let (output, parts) = self.finalize(parts).await?;
        if self.configuration.cleanup {
            self.remove_frames_dir().await;
        }
        self.transition(PipelinePhase::Done);

        Ok(PipelineReport {
            mode: mode.clone(),
            processed: state.total_processed(),
            per_worker: state.processed_counts(),
            dead_letters: parts.dead_letters,
            rejected_duplicates: parts.rejected_duplicates,
            elapsed: started.elapsed(),
            output,
            phases: self.phases.clone(),
        })
    }

    /// Either starts the decoder with a watcher on its output directory, or
    /// fills the queue from what is already on disk.
    async fn seed(
        &self,
        mode: &PipelineMode,
        state: &Arc<PipelineState>,
        cancel_token: &CancellationToken,
    ) -> Result<Ingestion, AppError> {
        let frames_dir = &self.configuration.frames_dir;
        match mode {
            PipelineMode::Video { input } => {
                tokio::fs::create_dir_all(frames_dir)
                    .await
                    .map_err(|e| AppError::io(frames_dir, e))?;
                let pattern = FramePattern::decoder_output(&self.configuration.frame_extension);
                let leftovers = list_frames(frames_dir, &pattern).await?;
                if !leftovers.frames.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "frames_dir",
                        reason: format!(
                            "{} already contains {} frames; remove them or run without -i to reuse them",
                            frames_dir.display(),
                            leftovers.frames.len()
                        ),
                    }
                    .into());
                }

                // watch first so nothing the decoder writes slips past
                let watcher = FrameWatcher::new(
                    frames_dir.clone(),
                    pattern.clone(),
                    state.queue().clone(),
                    self.configuration.watch_interval(),
                )
                .spawn(state.clone());
                let job = DecodeJob {
                    input: input.clone(),
                    output_dir: frames_dir.clone(),
                    frame_rate: self.configuration.frame_rate.clone(),
                    frame_height: self.configuration.frame_height,
                    pattern,
                };
                let producer = FrameProducer::new(self.decoder.clone(), job)
                    .spawn(state.clone(), cancel_token.clone());
                Ok(Ingestion {
                    producer: Some(producer),
                    watcher: Some(watcher),
                })
            }
            PipelineMode::Directory => {
                let listing = list_frames(frames_dir, &FramePattern::any()).await?;
                for path in &listing.skipped {
                    warn!("Skipping {}: no frame number in its name", path.display());
                }
                info!(
                    "Queued {} frames from {}",
                    listing.frames.len(),
                    frames_dir.display()
                );
                for frame in listing.frames {
                    state.queue().push(frame);
                }
                state.close_ingestion();
                Ok(Ingestion::default())
            }
            PipelineMode::CsvImport { .. } => Ok(Ingestion::default()),
        }
    }

    /// Renders and writes the outputs, then optionally shows the image.
    async fn finalize(
        &mut self,
        parts: ResultParts,
    ) -> Result<(RenderedOutput, ResultParts), AppError> {
        self.transition(PipelinePhase::Finalizing);
        let settings = RenderSettings {
            canvas: self.configuration.canvas()?,
            title: self.configuration.title.clone(),
            output: self.configuration.output.clone(),
        };
        info!("Outputting to {}", settings.output.display());
        let (output, parts) = tokio::task::spawn_blocking(move || {
            render::write_outputs(&parts.samples, &settings).map(|output| (output, parts))
        })
        .await??;

        if self.configuration.show {
            if let Err(e) = display::open_in_viewer(&output.image_path) {
                warn!("Could not open {}: {}", output.image_path.display(), e);
            }
        }
        Ok((output, parts))
    }

    async fn remove_frames_dir(&self) {
        let dir = &self.configuration.frames_dir;
        if let Err(e) = tokio::fs::remove_dir(dir).await {
            warn!(
                "{} is not empty ({}). Delete manually or check for artifacts.",
                dir.display(),
                e
            );
        }
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    extractor: Option<Arc<dyn ColorExtractor>>,
    decoder: Option<Arc<dyn FrameDecoder>>,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            extractor: None,
            decoder: None,
        }
    }

    // Sets the worker count, this will override the configuration.
    pub fn workers(mut self, workers: usize) -> Self {
        self.configuration.workers = workers;
        self
    }

    // Replaces the extractor picked by the configuration.
    pub fn extractor(mut self, extractor: Arc<dyn ColorExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    // Replaces the ffmpeg decoder.
    pub fn decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        self.configuration.validate()?;
        let extractor = self
            .extractor
            .unwrap_or_else(|| extractor_for(self.configuration.extractor));
        let decoder = self.decoder.unwrap_or_else(|| {
            Arc::new(FfmpegDecoder::new(self.configuration.decoder_program.clone()))
        });
        Ok(Coordinator::new(self.configuration, extractor, decoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{stripe_color, write_frame};
    use async_trait::async_trait;
    use image::Rgb;
    use std::path::Path;

    /// Writes `frames` solid frames one by one, then optionally fails.
    struct ScriptedDecoder {
        frames: u64,
        fail: bool,
    }

    #[async_trait]
    impl FrameDecoder for ScriptedDecoder {
        async fn decode(&self, job: &DecodeJob) -> Result<(), AppError> {
            for ordinal in 1..=self.frames {
                write_frame(&job.output_dir, ordinal, stripe_color(ordinal));
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            if self.fail {
                return Err(AppError::Task("decoder crashed".to_string()));
            }
            Ok(())
        }
    }

    /// Writes a couple of frames, then panics mid-decode.
    struct PanickingDecoder;

    #[async_trait]
    impl FrameDecoder for PanickingDecoder {
        async fn decode(&self, job: &DecodeJob) -> Result<(), AppError> {
            write_frame(&job.output_dir, 1, stripe_color(1));
            write_frame(&job.output_dir, 2, stripe_color(2));
            panic!("decoder blew up");
        }
    }

    fn test_configuration(root: &Path) -> Configuration {
        Configuration {
            frames_dir: root.join("frames"),
            output: root.join("out.png"),
            resolution: "240".to_string(),
            frame_extension: "png".to_string(),
            poll_interval_ms: 1,
            watch_interval_ms: 5,
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 20,
            max_attempts: 3,
            progress_interval_secs: 1,
            ..Configuration::default()
        }
    }

    fn video_configuration(root: &Path) -> Configuration {
        let input = root.join("movie.mp4");
        std::fs::write(&input, b"not really a video").unwrap();
        Configuration {
            input: Some(input),
            ..test_configuration(root)
        }
    }

    fn csv_rows(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn expected_rows(count: u64) -> Vec<String> {
        (1..=count)
            .map(|ordinal| {
                let Rgb([r, g, b]) = stripe_color(ordinal);
                format!("{},{},{}", r, g, b)
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn directory_of_ten_frames_with_three_workers() {
        let root = tempfile::tempdir().unwrap();
        let configuration = test_configuration(root.path());
        std::fs::create_dir(&configuration.frames_dir).unwrap();
        for ordinal in 1..=10 {
            write_frame(&configuration.frames_dir, ordinal, stripe_color(ordinal));
        }

        let report = CoordinatorBuilder::new(configuration)
            .workers(3)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.processed, 10);
        assert_eq!(report.per_worker.len(), 3);
        assert_eq!(report.per_worker.iter().sum::<usize>(), 10);
        assert!(report.dead_letters.is_empty());
        assert_eq!(
            report.phases,
            vec![
                PipelinePhase::Idle,
                PipelinePhase::Seeding,
                PipelinePhase::Processing,
                PipelinePhase::Draining,
                PipelinePhase::Finalizing,
                PipelinePhase::Done,
            ]
        );

        assert_eq!(csv_rows(&report.output.csv_path), expected_rows(10));
        let image = image::open(&report.output.image_path).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (320, 240));
        for index in 0..10u32 {
            assert_eq!(*image.get_pixel(index * 32 + 16, 120), stripe_color(index as u64 + 1));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn video_frames_are_analyzed_while_decoding() {
        let root = tempfile::tempdir().unwrap();
        let configuration = Configuration {
            workers: 2,
            cleanup: true,
            ..video_configuration(root.path())
        };
        let frames_dir = configuration.frames_dir.clone();

        let report = CoordinatorBuilder::new(configuration)
            .decoder(Arc::new(ScriptedDecoder {
                frames: 25,
                fail: false,
            }))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.processed, 25);
        assert!(report.dead_letters.is_empty());
        assert_eq!(csv_rows(&report.output.csv_path), expected_rows(25));
        assert!(!frames_dir.exists(), "cleanup should remove the emptied frame directory");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn decoder_failure_aborts_without_output() {
        let root = tempfile::tempdir().unwrap();
        let configuration = Configuration {
            workers: 2,
            ..video_configuration(root.path())
        };
        let output = configuration.output.clone();

        let err = CoordinatorBuilder::new(configuration)
            .decoder(Arc::new(ScriptedDecoder {
                frames: 5,
                fail: true,
            }))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Task(_)));
        assert!(!output.exists());
        assert!(!render::csv_path_for(&output).exists());
    }

    #[tokio::test]
    async fn video_mode_refuses_stale_frames() {
        let root = tempfile::tempdir().unwrap();
        let configuration = video_configuration(root.path());
        std::fs::create_dir(&configuration.frames_dir).unwrap();
        write_frame(&configuration.frames_dir, 1, stripe_color(1));

        let err = CoordinatorBuilder::new(configuration)
            .decoder(Arc::new(ScriptedDecoder {
                frames: 1,
                fail: false,
            }))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreadable_frame_is_reported_not_dropped() {
        let root = tempfile::tempdir().unwrap();
        let configuration = Configuration {
            workers: 2,
            ..test_configuration(root.path())
        };
        std::fs::create_dir(&configuration.frames_dir).unwrap();
        for ordinal in 1..=4 {
            write_frame(&configuration.frames_dir, ordinal, stripe_color(ordinal));
        }
        std::fs::write(configuration.frames_dir.join("img00005.png"), b"").unwrap();

        let report = CoordinatorBuilder::new(configuration)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.dead_letters.len(), 1);
        assert_eq!(report.dead_letters[0].ordinal, 5);
        assert_eq!(report.dead_letters[0].attempts, 3);
        assert_eq!(csv_rows(&report.output.csv_path).len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_decoder_stops_the_workers() {
        let root = tempfile::tempdir().unwrap();
        let configuration = video_configuration(root.path());
        let output = configuration.output.clone();

        let run = CoordinatorBuilder::new(configuration)
            .workers(2)
            .decoder(Arc::new(PanickingDecoder))
            .build()
            .unwrap()
            .run();
        let result = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("run did not finish after the decoder panicked");

        assert!(matches!(result, Err(AppError::Task(_))));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn csv_import_skips_analysis() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("colors.csv");
        std::fs::write(&input, "255,0,0\n0,255,0\n0,0,255\n").unwrap();
        let configuration = Configuration {
            input: Some(input),
            title: Some("demo".to_string()),
            ..test_configuration(root.path())
        };

        let report = CoordinatorBuilder::new(configuration)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(
            report.phases,
            vec![
                PipelinePhase::Idle,
                PipelinePhase::Finalizing,
                PipelinePhase::Done
            ]
        );
        let image = image::open(&report.output.image_path).unwrap().to_rgb8();
        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(160, 0), Rgb([0, 255, 0]));
        assert_eq!(*image.get_pixel(319, 0), Rgb([0, 0, 255]));
        assert_eq!(
            csv_rows(&report.output.csv_path),
            vec!["255,0,0", "0,255,0", "0,0,255"]
        );
    }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::CliArgs;
use crate::error::ConfigError;
use crate::intake::queue::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "movbar.toml";
const ENV_PREFIX: &str = "MOVBAR";

/// Multiplier applied to the length/width overrides.
const INCH: u32 = 300;

/// Named output sizes, largest first.
pub const RESOLUTION_PRESETS: [(&str, u32, u32); 7] = [
    ("8000", 7680, 4320),
    ("4000", 3840, 2160),
    ("1080", 1920, 1080),
    ("720", 1280, 720),
    ("480", 852, 480),
    ("360", 640, 360),
    ("240", 320, 240),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        RESOLUTION_PRESETS
            .iter()
            .find(|(preset, _, _)| *preset == name)
            .map(|&(_, width, height)| Self { width, height })
            .ok_or_else(|| ConfigError::UnknownResolution {
                given: name.to_string(),
                valid: RESOLUTION_PRESETS
                    .iter()
                    .map(|(preset, _, _)| *preset)
                    .collect::<Vec<_>>()
                    .join("|"),
            })
    }

    /// Zero or missing multipliers keep the preset dimension.
    pub fn with_multipliers(self, length: Option<u32>, width: Option<u32>) -> Self {
        Self {
            width: match length {
                Some(l) if l > 0 => l * INCH,
                _ => self.width,
            },
            height: match width {
                Some(w) if w > 0 => w * INCH,
                _ => self.height,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Centroid of a single color cluster
    #[default]
    Mean,
    /// Most populated bin of a quantized color histogram
    Histogram,
}

/// Where the frames come from for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMode {
    /// Decode the video into `frames_dir` while analyzing.
    Video { input: PathBuf },
    /// Analyze whatever already sits in `frames_dir`.
    Directory,
    /// Skip analysis and render colors from a previous CSV dump.
    CsvImport { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    pub frames_dir: PathBuf,
    #[serde(default)]
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub resolution: String,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    pub workers: usize,
    #[serde(default)]
    pub frame_rate: Option<String>,
    pub cleanup: bool,
    pub show: bool,
    #[serde(default)]
    pub title: Option<String>,
    pub extractor: ExtractorKind,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub watch_interval_ms: u64,
    pub progress_interval_secs: u64,
    pub decoder_program: String,
    pub frame_height: u32,
    pub frame_extension: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("tmp"),
            input: None,
            output: PathBuf::from("out.png"),
            resolution: "1080".to_string(),
            length: None,
            width: None,
            workers: 1,
            frame_rate: None,
            cleanup: false,
            show: false,
            title: None,
            extractor: ExtractorKind::Mean,
            max_attempts: 8,
            retry_base_delay_ms: 50,
            retry_max_delay_ms: 2000,
            poll_interval_ms: 10,
            watch_interval_ms: 100,
            progress_interval_secs: 5,
            decoder_program: "ffmpeg".to_string(),
            frame_height: 144,
            frame_extension: "jpeg".to_string(),
        }
    }
}

impl Configuration {
    /// Layers defaults, the optional config file, `MOVBAR_*` environment
    /// variables and finally the command line.
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let defaults = Configuration::default();
        let config_file = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let configuration: Configuration = config::Config::builder()
            .set_default("frames_dir", path_value(&defaults.frames_dir))?
            .set_default("output", path_value(&defaults.output))?
            .set_default("resolution", defaults.resolution.as_str())?
            .set_default("workers", defaults.workers as i64)?
            .set_default("cleanup", defaults.cleanup)?
            .set_default("show", defaults.show)?
            .set_default("extractor", "mean")?
            .set_default("max_attempts", defaults.max_attempts as i64)?
            .set_default("retry_base_delay_ms", defaults.retry_base_delay_ms as i64)?
            .set_default("retry_max_delay_ms", defaults.retry_max_delay_ms as i64)?
            .set_default("poll_interval_ms", defaults.poll_interval_ms as i64)?
            .set_default("watch_interval_ms", defaults.watch_interval_ms as i64)?
            .set_default(
                "progress_interval_secs",
                defaults.progress_interval_secs as i64,
            )?
            .set_default("decoder_program", defaults.decoder_program.as_str())?
            .set_default("frame_height", defaults.frame_height as i64)?
            .set_default("frame_extension", defaults.frame_extension.as_str())?
            .add_source(config::File::from(config_file.as_path()).required(args.config.is_some()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("frames_dir", args.directory.as_deref().map(path_value))?
            .set_override_option("input", args.input.as_deref().map(path_value))?
            .set_override_option("output", args.output.as_deref().map(path_value))?
            .set_override_option("resolution", args.quality.clone())?
            .set_override_option("workers", args.threads.map(|t| t as i64))?
            .set_override_option("frame_rate", args.rate.clone())?
            .set_override_option("cleanup", args.clean.then_some(true))?
            .set_override_option("show", args.show.then_some(true))?
            .set_override_option("length", args.length.map(i64::from))?
            .set_override_option("width", args.width.map(i64::from))?
            .set_override_option("title", args.name.clone())?
            .set_override_option("extractor", args.extractor.map(extractor_value))?
            .set_override_option("max_attempts", args.max_attempts.map(i64::from))?
            .build()?
            .try_deserialize()?;

        configuration.validate()?;
        Ok(configuration)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("workers", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.frame_height == 0 {
            return Err(invalid("frame_height", "must be greater than 0"));
        }
        if self.progress_interval_secs == 0 {
            return Err(invalid("progress_interval_secs", "must be greater than 0"));
        }
        if self.frame_extension.trim_start_matches('.').is_empty() {
            return Err(invalid("frame_extension", "must not be empty"));
        }
        self.canvas()?;

        match self.mode() {
            PipelineMode::Video { input } | PipelineMode::CsvImport { path: input } => {
                if !input.is_file() {
                    return Err(invalid(
                        "input",
                        format!("{} does not exist", input.display()),
                    ));
                }
            }
            PipelineMode::Directory => {
                if !self.frames_dir.is_dir() {
                    return Err(invalid(
                        "frames_dir",
                        format!(
                            "{} is not a directory; pass -i to decode a video",
                            self.frames_dir.display()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> PipelineMode {
        match &self.input {
            Some(path) if has_extension(path, "csv") => PipelineMode::CsvImport { path: path.clone() },
            Some(path) => PipelineMode::Video { input: path.clone() },
            None => PipelineMode::Directory,
        }
    }

    pub fn canvas(&self) -> Result<Resolution, ConfigError> {
        Ok(Resolution::from_preset(&self.resolution)?.with_multipliers(self.length, self.width))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn extractor_value(kind: ExtractorKind) -> &'static str {
    match kind {
        ExtractorKind::Mean => "mean",
        ExtractorKind::Histogram => "histogram",
    }
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(expected))
}

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Frame decoder exited with {status}")]
    Decoder { status: ExitStatus },
    #[error("Failed to start frame decoder '{program}': {source}")]
    DecoderSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Malformed CSV at line {line}: {reason}")]
    Csv { line: usize, reason: String },
    #[error("No frames were analyzed, nothing to render")]
    NoFrames,
    #[error("Pipeline task failed: {0}")]
    Task(String),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error. Configuration problems are reported
    /// before any work starts and get their own status.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Task(err.to_string())
    }
}

// Per-frame Error Type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Unreadable frame {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("Malformed frame buffer: {0}")]
    Malformed(String),
    #[error("No ordinal in frame name {0}")]
    InvalidName(PathBuf),
}

impl FrameError {
    /// Unreadable frames are usually still being written by the decoder, so
    /// they are worth another attempt later.
    pub fn is_transient(&self) -> bool {
        matches!(self, FrameError::Unreadable { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid resolution '{given}', expected one of [{valid}]")]
    UnknownResolution { given: String, valid: String },
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("Failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_use_their_own_exit_code() {
        let err = AppError::from(ConfigError::InvalidValue {
            key: "workers",
            reason: "must be at least 1".to_string(),
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(AppError::NoFrames.exit_code(), 1);
    }

    #[test]
    fn only_unreadable_frames_are_transient() {
        let unreadable = FrameError::Unreadable {
            path: PathBuf::from("tmp/img00001.jpeg"),
            reason: "truncated".to_string(),
        };
        assert!(unreadable.is_transient());
        assert!(!FrameError::Malformed("0x0".to_string()).is_transient());
    }
}

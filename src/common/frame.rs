use image::Rgb;
use std::path::{Path, PathBuf};

use crate::error::FrameError;

/// A frame file waiting to be analyzed. The ordinal comes from the numeric
/// suffix of the file name and decides where the frame lands in the barcode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameReference {
    pub ordinal: u64,
    pub path: PathBuf,
}

impl FrameReference {
    pub fn new(ordinal: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            ordinal,
            path: path.into(),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>, pattern: &FramePattern) -> Result<Self, FrameError> {
        let path = path.into();
        match pattern.ordinal_of(&path) {
            Some(ordinal) => Ok(Self { ordinal, path }),
            None => Err(FrameError::InvalidName(path)),
        }
    }
}

/// Dominant color of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSample {
    pub ordinal: u64,
    pub rgb: Rgb<u8>,
}

impl ColorSample {
    pub fn new(ordinal: u64, rgb: Rgb<u8>) -> Self {
        Self { ordinal, rgb }
    }
}

/// Which file names count as frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePattern {
    prefix: String,
    extension: Option<String>,
}

impl FramePattern {
    /// Names written by the decoder: `img00001.<extension>`.
    pub fn decoder_output(extension: &str) -> Self {
        Self {
            prefix: "img".to_string(),
            extension: Some(extension.trim_start_matches('.').to_string()),
        }
    }

    /// Any file whose stem ends in digits, used for pre-existing directories.
    pub fn any() -> Self {
        Self {
            prefix: String::new(),
            extension: None,
        }
    }

    /// printf-style template handed to the decoder.
    pub fn file_template(&self) -> String {
        match &self.extension {
            Some(ext) => format!("{}%05d.{}", self.prefix, ext),
            None => format!("{}%05d", self.prefix),
        }
    }

    pub fn ordinal_of(&self, path: &Path) -> Option<u64> {
        if let Some(expected) = &self.extension {
            let ext = path.extension()?.to_str()?;
            if !ext.eq_ignore_ascii_case(expected) {
                return None;
            }
        }
        let stem = path.file_stem()?.to_str()?;
        let digits = if self.prefix.is_empty() {
            let start = stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
            &stem[start..]
        } else {
            let rest = stem.strip_prefix(self.prefix.as_str())?;
            if !rest.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            rest
        };
        if digits.is_empty() {
            return None;
        }
        digits.parse().ok()
    }
}

use clap::Parser;
use std::path::PathBuf;

use crate::config::ExtractorKind;

/// Turn a video (or a directory of frames) into a barcode of dominant colors.
///
/// Create from a video file:  movbar -i <video-input> [-d <images-directory>]
/// Create from a directory of images:  movbar -d <images-directory>
/// Re-render a previous color dump:  movbar -i <colors.csv>
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "movbar")]
#[command(version)]
pub struct CliArgs {
    /// Directory holding the extracted frames
    #[arg(short = 'd', long = "directory")]
    pub directory: Option<PathBuf>,

    /// Input video, or a CSV of R,G,B rows to re-render
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output image; the color dump is written next to it as <output>.csv
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Resolution preset [8000|4000|1080|720|480|360|240]
    #[arg(short = 'q', long = "quality")]
    pub quality: Option<String>,

    /// Number of analysis workers
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Frames per second to sample from the video
    #[arg(short = 'r', long = "rate")]
    pub rate: Option<String>,

    /// Delete generated frame files once analyzed
    #[arg(short = 'c', long = "clean", default_value_t = false)]
    pub clean: bool,

    /// Open the result in the system image viewer
    #[arg(short = 's', long = "show", default_value_t = false)]
    pub show: bool,

    /// Length multiplier, width becomes length x 300
    #[arg(short = 'l', long = "length")]
    pub length: Option<u32>,

    /// Width multiplier, height becomes width x 300
    #[arg(short = 'w', long = "width")]
    pub width: Option<u32>,

    /// Title printed in the bottom-right corner
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Dominant color strategy
    #[arg(long, value_enum)]
    pub extractor: Option<ExtractorKind>,

    /// Attempts per frame before it is reported as failed
    #[arg(long = "max-attempts")]
    pub max_attempts: Option<u32>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

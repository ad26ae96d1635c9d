use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Distinct solid color per ordinal, starting at pure red.
pub fn stripe_color(ordinal: u64) -> Rgb<u8> {
    let i = ordinal.saturating_sub(1);
    Rgb([
        (255 - (i * 20) % 256) as u8,
        ((i * 20) % 256) as u8,
        ((i * 37) % 256) as u8,
    ])
}

/// Writes a small solid PNG named the way the decoder names frames.
pub fn write_frame(dir: &Path, ordinal: u64, color: Rgb<u8>) -> PathBuf {
    let path = dir.join(format!("img{:05}.png", ordinal));
    RgbImage::from_pixel(8, 6, color)
        .save(&path)
        .expect("failed to write test frame");
    path
}

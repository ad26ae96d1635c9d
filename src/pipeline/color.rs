use image::{Rgb, RgbImage};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::ExtractorKind;
use crate::error::FrameError;

/// Reduces a frame to the one color that represents it.
pub trait ColorExtractor: Send + Sync {
    fn extract(&self, image: &RgbImage) -> Result<Rgb<u8>, FrameError>;
    fn name(&self) -> &'static str;
}

pub fn extractor_for(kind: ExtractorKind) -> Arc<dyn ColorExtractor> {
    match kind {
        ExtractorKind::Mean => Arc::new(MeanColorExtractor),
        ExtractorKind::Histogram => Arc::new(HistogramColorExtractor::default()),
    }
}

/// Decodes a frame file. A file the decoder is still writing usually fails
/// here, which is why the error is transient.
pub fn load_frame(path: &Path) -> Result<RgbImage, FrameError> {
    image::open(path)
        .map(|image| image.to_rgb8())
        .map_err(|e| FrameError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn ensure_pixels(image: &RgbImage) -> Result<(), FrameError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(FrameError::Malformed(format!(
            "{}x{} image has no pixels",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

/// Centroid of a single cluster over all pixels, i.e. the per-channel mean,
/// truncated to 8 bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanColorExtractor;

impl ColorExtractor for MeanColorExtractor {
    fn extract(&self, image: &RgbImage) -> Result<Rgb<u8>, FrameError> {
        ensure_pixels(image)?;
        let mut sums = [0u64; 3];
        for pixel in image.pixels() {
            sums[0] += u64::from(pixel[0]);
            sums[1] += u64::from(pixel[1]);
            sums[2] += u64::from(pixel[2]);
        }
        let count = u64::from(image.width()) * u64::from(image.height());
        Ok(Rgb([
            (sums[0] / count) as u8,
            (sums[1] / count) as u8,
            (sums[2] / count) as u8,
        ]))
    }

    fn name(&self) -> &'static str {
        "mean"
    }
}

/// Buckets sampled pixels by quantized color and returns the average of the
/// most populated bucket.
#[derive(Debug, Clone, Copy)]
pub struct HistogramColorExtractor {
    levels: u8,
    sample_step: u32,
}

impl Default for HistogramColorExtractor {
    fn default() -> Self {
        Self {
            levels: 16,
            sample_step: 2,
        }
    }
}

impl HistogramColorExtractor {
    fn quantize(&self, px: &Rgb<u8>) -> (u8, u8, u8) {
        let step = 256 / self.levels as usize;
        let q = |v: u8| ((v as usize / step) * step).min(255) as u8;
        (q(px[0]), q(px[1]), q(px[2]))
    }
}

impl ColorExtractor for HistogramColorExtractor {
    fn extract(&self, image: &RgbImage) -> Result<Rgb<u8>, FrameError> {
        ensure_pixels(image)?;
        let mut bins: HashMap<(u8, u8, u8), (u64, [u64; 3])> = HashMap::new();

        for y in (0..image.height()).step_by(self.sample_step as usize) {
            for x in (0..image.width()).step_by(self.sample_step as usize) {
                let px = image.get_pixel(x, y);
                let (count, sums) = bins.entry(self.quantize(px)).or_insert((0, [0; 3]));
                *count += 1;
                sums[0] += u64::from(px[0]);
                sums[1] += u64::from(px[1]);
                sums[2] += u64::from(px[2]);
            }
        }

        // ties go to the darkest bin so the result does not depend on hash order
        let (_, (count, sums)) = bins
            .into_iter()
            .max_by_key(|&(key, (count, _))| (count, Reverse(key)))
            .ok_or_else(|| FrameError::Malformed("no pixels sampled".to_string()))?;

        Ok(Rgb([
            (sums[0] / count) as u8,
            (sums[1] / count) as u8,
            (sums[2] / count) as u8,
        ]))
    }

    fn name(&self) -> &'static str {
        "histogram"
    }
}

use image::RgbImage;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::common::ColorSample;
use crate::config::Resolution;
use crate::error::AppError;

/// Column range `[start, end)` of stripe `index` out of `count` on a canvas
/// `width` pixels wide. Boundaries come from the absolute fraction, so
/// rounding never accumulates across stripes.
pub fn segment_bounds(index: usize, count: usize, width: u32) -> (u32, u32) {
    let width = u64::from(width);
    let count = count.max(1) as u64;
    let start = index as u64 * width / count;
    let end = (index as u64 + 1) * width / count;
    (start as u32, end as u32)
}

/// One solid vertical stripe per sample, left to right in slice order.
pub fn render_barcode(samples: &[ColorSample], canvas: Resolution) -> Result<RgbImage, AppError> {
    if samples.is_empty() {
        return Err(AppError::NoFrames);
    }
    let mut image = RgbImage::new(canvas.width, canvas.height);
    if canvas.height == 0 {
        return Ok(image);
    }
    for (index, sample) in samples.iter().enumerate() {
        let (start, end) = segment_bounds(index, samples.len(), canvas.width);
        if end > start {
            draw_filled_rect_mut(
                &mut image,
                Rect::at(start as i32, 0).of_size(end - start, canvas.height),
                sample.rgb,
            );
        }
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::stripe_color;
    use image::Rgb;

    #[test]
    fn segments_tile_the_canvas() {
        for (width, count) in [(1920u32, 10usize), (300, 7), (1000, 3), (5, 9), (7680, 4321)] {
            let mut next = 0;
            for index in 0..count {
                let (start, end) = segment_bounds(index, count, width);
                assert_eq!(start, next, "gap or overlap at {} of {} on {}", index, count, width);
                assert_eq!(start, (index as u64 * width as u64 / count as u64) as u32);
                assert!(end >= start);
                next = end;
            }
            assert_eq!(next, width);
        }
    }

    #[test]
    fn ten_frames_make_ten_equal_stripes() {
        let samples: Vec<_> = (1..=10)
            .map(|ordinal| ColorSample::new(ordinal, stripe_color(ordinal)))
            .collect();
        let image = render_barcode(&samples, Resolution { width: 1920, height: 1080 }).unwrap();
        assert_eq!(image.dimensions(), (1920, 1080));
        for (index, sample) in samples.iter().enumerate() {
            let left = index as u32 * 192;
            assert_eq!(*image.get_pixel(left, 0), sample.rgb);
            assert_eq!(*image.get_pixel(left + 191, 1079), sample.rgb);
        }
        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn more_frames_than_columns_still_fills_every_column() {
        let samples: Vec<_> = (1..=50)
            .map(|ordinal| ColorSample::new(ordinal, stripe_color(ordinal)))
            .collect();
        let image = render_barcode(&samples, Resolution { width: 20, height: 2 }).unwrap();
        for x in 0..20 {
            let (index, _) = samples
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    let (start, end) = segment_bounds(*i, samples.len(), 20);
                    start <= x && x < end
                })
                .last()
                .unwrap();
            assert_eq!(*image.get_pixel(x, 1), samples[index].rgb);
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            render_barcode(&[], Resolution { width: 10, height: 10 }),
            Err(AppError::NoFrames)
        ));
    }
}

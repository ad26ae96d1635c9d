pub mod barcode;
pub mod csv;
pub mod display;
pub mod title;

use std::path::PathBuf;

use tracing::info;

use crate::common::ColorSample;
use crate::config::Resolution;
use crate::error::AppError;

pub use barcode::{render_barcode, segment_bounds};
pub use csv::{csv_path_for, export_csv, import_csv};
pub use title::{draw_title, TitleStyle};

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub canvas: Resolution,
    pub title: Option<String>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOutput {
    pub image_path: PathBuf,
    pub csv_path: PathBuf,
    pub stripes: usize,
}

/// Renders `samples` (already in ordinal order) and writes both the barcode
/// image and the `<output>.csv` color dump.
pub fn write_outputs(
    samples: &[ColorSample],
    settings: &RenderSettings,
) -> Result<RenderedOutput, AppError> {
    let mut image = render_barcode(samples, settings.canvas)?;

    let csv_path = csv_path_for(&settings.output);
    export_csv(&csv_path, samples)?;

    if let Some(title) = settings.title.as_deref().filter(|t| !t.trim().is_empty()) {
        draw_title(&mut image, title, &TitleStyle::default());
    }
    image.save(&settings.output)?;
    info!(
        "Wrote {} stripes to {} and {}",
        samples.len(),
        settings.output.display(),
        csv_path.display()
    );

    Ok(RenderedOutput {
        image_path: settings.output.clone(),
        csv_path,
        stripes: samples.len(),
    })
}

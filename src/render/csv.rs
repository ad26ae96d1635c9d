use image::Rgb;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::ColorSample;
use crate::error::AppError;

/// `out.png` -> `out.png.csv`
pub fn csv_path_for(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(".csv");
    PathBuf::from(path)
}

/// One `R,G,B` row per sample, in slice order.
pub fn write_csv<W: Write>(writer: &mut W, samples: &[ColorSample]) -> std::io::Result<()> {
    for sample in samples {
        let Rgb([r, g, b]) = sample.rgb;
        writeln!(writer, "{},{},{}", r, g, b)?;
    }
    writer.flush()
}

pub fn export_csv(path: &Path, samples: &[ColorSample]) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| AppError::io(path, e))?;
    write_csv(&mut BufWriter::new(file), samples).map_err(|e| AppError::io(path, e))
}

/// Parses `R,G,B` rows. Row order defines the ordinal, starting at 1. Blank
/// lines and an `R,G,B` header are ignored.
pub fn parse_csv(text: &str) -> Result<Vec<ColorSample>, AppError> {
    let mut samples = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if samples.is_empty() && is_header(&fields) {
            continue;
        }
        if fields.len() < 3 {
            return Err(AppError::Csv {
                line: line_no,
                reason: format!("expected 3 columns, found {}", fields.len()),
            });
        }
        let mut channels = [0u8; 3];
        for (channel, field) in channels.iter_mut().zip(&fields) {
            *channel = field.parse().map_err(|_| AppError::Csv {
                line: line_no,
                reason: format!("'{}' is not a color channel value (0-255)", field),
            })?;
        }
        samples.push(ColorSample::new(samples.len() as u64 + 1, Rgb(channels)));
    }
    Ok(samples)
}

pub fn import_csv(path: &Path) -> Result<Vec<ColorSample>, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    parse_csv(&text)
}

fn is_header(fields: &[&str]) -> bool {
    fields.len() >= 3
        && fields[0].eq_ignore_ascii_case("r")
        && fields[1].eq_ignore_ascii_case("g")
        && fields[2].eq_ignore_ascii_case("b")
}

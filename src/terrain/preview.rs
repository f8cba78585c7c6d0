use std::path::Path;

use bevy::log::info;
use image::{ImageBuffer, Rgb as Pixel};

use crate::terrain::color::ColorField;
use crate::terrain::height::HeightStack;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PreviewSummary {
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Fraction of pixels at or above zero elevation.
    pub land_ratio: f64,
}

/// Top-down render of the fields over the square of edge `extent` centred on
/// `centre`, one sample per pixel.
pub fn render_preview(
    heights: &HeightStack,
    colors: &ColorField,
    centre: (f64, f64),
    extent: f64,
    size: u32,
) -> (ImageBuffer<Pixel<u8>, Vec<u8>>, PreviewSummary) {
    let size = size.max(1);
    let mut image = ImageBuffer::new(size, size);
    let mut min_elevation = f64::INFINITY;
    let mut max_elevation = f64::NEG_INFINITY;
    let mut land = 0u64;

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let u = (x as f64 + 0.5) / size as f64 - 0.5;
        // Image rows grow downward; world y grows upward.
        let v = 0.5 - (y as f64 + 0.5) / size as f64;
        let world_x = centre.0 + u * extent;
        let world_y = centre.1 + v * extent;

        let elevation = heights.get(world_x, world_y);
        *pixel = Pixel(colors.get_color(world_x, world_y, elevation).to_u8());

        min_elevation = min_elevation.min(elevation);
        max_elevation = max_elevation.max(elevation);
        if elevation >= 0.0 {
            land += 1;
        }
    }

    let summary = PreviewSummary {
        min_elevation,
        max_elevation,
        land_ratio: land as f64 / (size as f64 * size as f64),
    };
    (image, summary)
}

pub fn export_preview<P: AsRef<Path>>(
    heights: &HeightStack,
    colors: &ColorField,
    centre: (f64, f64),
    extent: f64,
    size: u32,
    path: P,
) -> image::ImageResult<PreviewSummary> {
    let (image, summary) = render_preview(heights, colors, centre, extent, size);
    info!(
        "Preview summary: elevation {:.1}..{:.1}, {:.1}% land",
        summary.min_elevation,
        summary.max_elevation,
        summary.land_ratio * 100.0
    );
    image.save(path)?;
    Ok(summary)
}

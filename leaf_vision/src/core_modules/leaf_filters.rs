// THEORY:
// The filter stage is the analytical heart of the engine. It takes one decoded
// leaf photograph and derives six diagnostic views of it. It is a pure
// function: no I/O, no shared state, the same input always gives the same
// outputs.
//
// Key architectural principles:
// 1.  **Fan-out, not a chain**: Every step reads from the original image (or
//     one of its colour-space re-encodings). No step feeds on another step's
//     output, except the threshold, which reads the saturation plane.
// 2.  **Luminance-only contrast**: CLAHE touches only the LAB lightness plane.
//     The chroma planes are carried through untouched so equalization does
//     not add colour artifacts.
// 3.  **Saturation as an anomaly proxy**: Diseased tissue often differs in
//     saturation from healthy tissue. The saturation plane and its binary
//     mask are cheap, fixed heuristics for it, not a classifier.
// 4.  **Named outputs**: The six views come back as a struct with one field per
//     role, so no consumer depends on positional order.

use crate::core_modules::clahe::Clahe;
use crate::core_modules::color_space::{self, HSV_SATURATION, LAB_LIGHTNESS};
use crate::core_modules::edges::color_canny;
use image::{GrayImage, Rgb, Rgb32FImage, RgbImage};
use imageproc::contrast::{ThresholdType, threshold};
use imageproc::filter::separable_filter_equal;
use serde::Deserialize;

/// Tunable constants of the filter chain. `Default` reproduces the reference chain.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Side length of the square Gaussian kernel. Must be odd.
    pub blur_kernel_size: u32,
    /// Gaussian standard deviation. `None` derives it from the kernel size.
    pub blur_sigma: Option<f32>,
    pub canny_low: f32,
    pub canny_high: f32,
    pub clahe_clip_limit: f32,
    pub clahe_tiles: u32,
    /// Saturation values strictly above this become 255 in the mask.
    pub saturation_threshold: u8,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            blur_kernel_size: 5,
            blur_sigma: None,
            canny_low: 100.0,
            canny_high: 200.0,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            saturation_threshold: 120,
        }
    }
}

impl FilterSettings {
    fn clahe(&self) -> Clahe {
        Clahe {
            clip_limit: self.clahe_clip_limit,
            tiles_x: self.clahe_tiles,
            tiles_y: self.clahe_tiles,
        }
    }
}

/// The six derived views of one source image, all with the source's dimensions.
#[derive(Debug, Clone)]
pub struct FilterOutputs {
    /// The decoded image in RGB order, for display.
    pub original_rgb: RgbImage,
    /// Canny edges, 0 or 255.
    pub edge_map: GrayImage,
    /// RGB rebuilt from LAB after CLAHE on the lightness plane.
    pub contrast_enhanced: RgbImage,
    /// HSV saturation plane.
    pub saturation_channel: GrayImage,
    /// Binary mask of the saturation plane, 0 or 255.
    pub threshold_mask: GrayImage,
    /// Gaussian-smoothed RGB.
    pub blurred: RgbImage,
}

pub fn apply_leaf_filters(image: &RgbImage, settings: &FilterSettings) -> FilterOutputs {
    // Stage 1: Colour-space views
    let original_rgb = image.clone();
    let hsv = color_space::rgb_to_hsv(image);
    let lab = color_space::rgb_to_lab(image);

    // Stage 2: Denoising blur
    let kernel = gaussian_kernel(settings.blur_kernel_size, settings.blur_sigma);
    let blurred = gaussian_blur(image, &kernel);

    // Stage 3: Edge detection across all three channels
    let edge_map = color_canny(image, settings.canny_low, settings.canny_high);

    // Stage 4: Local contrast enhancement on lightness only
    let lightness = color_space::channel(&lab, LAB_LIGHTNESS);
    let equalized = settings.clahe().apply(&lightness);
    let contrast_enhanced =
        color_space::lab_to_rgb(&color_space::replace_channel(&lab, LAB_LIGHTNESS, &equalized));

    // Stage 5: Saturation isolation
    let saturation_channel = color_space::channel(&hsv, HSV_SATURATION);

    // Stage 6: Thresholding
    let threshold_mask = threshold(
        &saturation_channel,
        settings.saturation_threshold,
        ThresholdType::Binary,
    );

    FilterOutputs {
        original_rgb,
        edge_map,
        contrast_enhanced,
        saturation_channel,
        threshold_mask,
        blurred,
    }
}

/// Blurs in float and rounds once, so a flat region keeps its exact value.
fn gaussian_blur(image: &RgbImage, kernel: &[f32]) -> RgbImage {
    let float = Rgb32FImage::from_fn(image.width(), image.height(), |x, y| {
        Rgb(image.get_pixel(x, y).0.map(f32::from))
    });
    let blurred = separable_filter_equal(&float, kernel);
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        Rgb(blurred
            .get_pixel(x, y)
            .0
            .map(|v| v.round().clamp(0.0, 255.0) as u8))
    })
}

/// Normalized 1D Gaussian taps. Without an explicit sigma it follows the
/// usual `0.3 * ((k - 1) / 2 - 1) + 0.8` rule.
pub fn gaussian_kernel(size: u32, sigma: Option<f32>) -> Vec<f32> {
    let size = (size.max(1) | 1) as i32;
    let sigma = sigma
        .filter(|s| *s > 0.0)
        .unwrap_or(0.3 * ((size - 1) as f32 * 0.5 - 1.0) + 0.8);
    let half = size / 2;

    let mut taps: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    for t in &mut taps {
        *t /= sum;
    }
    taps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_like(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let dx = x as i32 - width as i32 / 2;
            let dy = y as i32 - height as i32 / 2;
            if dx * dx + dy * dy < (width.min(height) as i32 / 3).pow(2) {
                // a brownish spot on green tissue
                if (x / 5 + y / 7) % 4 == 0 {
                    Rgb([150, 90, 30])
                } else {
                    Rgb([40, 160, 50])
                }
            } else {
                Rgb([230, 230, 225])
            }
        })
    }

    #[test]
    fn six_outputs_with_source_dimensions() {
        let source = leaf_like(97, 61);
        let out = apply_leaf_filters(&source, &FilterSettings::default());

        assert_eq!(out.original_rgb.dimensions(), (97, 61));
        assert_eq!(out.edge_map.dimensions(), (97, 61));
        assert_eq!(out.contrast_enhanced.dimensions(), (97, 61));
        assert_eq!(out.saturation_channel.dimensions(), (97, 61));
        assert_eq!(out.threshold_mask.dimensions(), (97, 61));
        assert_eq!(out.blurred.dimensions(), (97, 61));

        assert_eq!(out.edge_map.as_raw().len(), 97 * 61);
        assert_eq!(out.threshold_mask.as_raw().len(), 97 * 61);
        assert_eq!(out.blurred.as_raw().len(), 97 * 61 * 3);
        assert_eq!(out.original_rgb, source);
    }

    #[test]
    fn threshold_mask_is_binary_and_tracks_saturation() {
        let out = apply_leaf_filters(&leaf_like(80, 80), &FilterSettings::default());
        for (mask, sat) in out.threshold_mask.pixels().zip(out.saturation_channel.pixels()) {
            assert!(mask[0] == 0 || mask[0] == 255);
            assert_eq!(mask[0] == 255, sat[0] > 120);
        }
        assert!(out.threshold_mask.pixels().any(|p| p[0] == 255));
        assert!(out.threshold_mask.pixels().any(|p| p[0] == 0));
    }

    #[test]
    fn flat_image_has_no_edges() {
        let flat = RgbImage::from_pixel(64, 64, Rgb([70, 140, 60]));
        let out = apply_leaf_filters(&flat, &FilterSettings::default());
        assert!(out.edge_map.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn sharp_boundary_produces_edges() {
        let split = RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        let out = apply_leaf_filters(&split, &FilterSettings::default());
        assert!(out.edge_map.pixels().any(|p| p[0] == 255));
        assert!(out.edge_map.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn hue_boundary_of_equal_luma_shows_in_edge_map() {
        let split = RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 { Rgb([255, 0, 0]) } else { Rgb([0, 76, 0]) }
        });
        let out = apply_leaf_filters(&split, &FilterSettings::default());
        assert!(out.edge_map.pixels().any(|p| p[0] == 255));
    }

    #[test]
    fn flat_image_blurs_to_itself() {
        let flat = RgbImage::from_pixel(16, 16, Rgb([100, 101, 199]));
        let out = apply_leaf_filters(&flat, &FilterSettings::default());
        assert_eq!(out.blurred, flat);
    }

    #[test]
    fn filters_are_deterministic() {
        let source = leaf_like(50, 40);
        let a = apply_leaf_filters(&source, &FilterSettings::default());
        let b = apply_leaf_filters(&source, &FilterSettings::default());
        assert_eq!(a.edge_map, b.edge_map);
        assert_eq!(a.contrast_enhanced, b.contrast_enhanced);
        assert_eq!(a.blurred, b.blurred);
    }

    #[test]
    fn default_kernel_is_five_normalized_symmetric_taps() {
        let k = gaussian_kernel(5, None);
        assert_eq!(k.len(), 5);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((k[0] - k[4]).abs() < 1e-6 && (k[1] - k[3]).abs() < 1e-6);
        assert!(k[2] > k[1] && k[1] > k[0]);
    }
}

// THEORY:
// Composite assembly turns the six filter outputs into one reviewable
// artifact: a titled 2x3 contact sheet. The layout is fixed. Panel order and
// captions never depend on the image content, so every composite in a corpus
// reads the same way.
//
// Grid:
//   Original            | Edge Detection | Contrast Enhanced (CLAHE)
//   Saturation Channel  | Thresholding   | Gaussian Blur
//
// Single-channel outputs are shown through a plain gray colormap. Each panel
// is scaled to fit its box with the aspect ratio kept, and centred. No axes or
// ticks are drawn.

use crate::core_modules::glyphs::{self, GLYPH_HEIGHT};
use crate::core_modules::leaf_filters::FilterOutputs;
use image::buffer::ConvertBuffer;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::Deserialize;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([20, 20, 20]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelRole {
    Original,
    EdgeMap,
    ContrastEnhanced,
    SaturationChannel,
    ThresholdMask,
    Blurred,
}

impl PanelRole {
    /// Row-major grid order.
    pub const ORDER: [PanelRole; 6] = [
        PanelRole::Original,
        PanelRole::EdgeMap,
        PanelRole::ContrastEnhanced,
        PanelRole::SaturationChannel,
        PanelRole::ThresholdMask,
        PanelRole::Blurred,
    ];

    pub fn caption(self) -> &'static str {
        match self {
            PanelRole::Original => "Original",
            PanelRole::EdgeMap => "Edge Detection",
            PanelRole::ContrastEnhanced => "Contrast Enhanced (CLAHE)",
            PanelRole::SaturationChannel => "Saturation Channel",
            PanelRole::ThresholdMask => "Thresholding",
            PanelRole::Blurred => "Gaussian Blur",
        }
    }

    /// Whether the panel is a single-channel output shown in gray.
    pub fn is_grayscale(self) -> bool {
        matches!(
            self,
            PanelRole::EdgeMap | PanelRole::SaturationChannel | PanelRole::ThresholdMask
        )
    }

    fn render(self, outputs: &FilterOutputs) -> RgbImage {
        match self {
            PanelRole::Original => outputs.original_rgb.clone(),
            PanelRole::EdgeMap => outputs.edge_map.convert(),
            PanelRole::ContrastEnhanced => outputs.contrast_enhanced.clone(),
            PanelRole::SaturationChannel => outputs.saturation_channel.convert(),
            PanelRole::ThresholdMask => outputs.threshold_mask.convert(),
            PanelRole::Blurred => outputs.blurred.clone(),
        }
    }
}

/// Geometry of the contact sheet, in output pixels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompositeLayout {
    pub panel_width: u32,
    pub panel_height: u32,
    pub margin: u32,
    pub caption_height: u32,
    pub title_height: u32,
    /// Font scale for captions. The title is drawn one step larger.
    pub text_scale: u32,
}

impl Default for CompositeLayout {
    fn default() -> Self {
        Self {
            panel_width: 640,
            panel_height: 480,
            margin: 16,
            caption_height: 32,
            title_height: 56,
            text_scale: 3,
        }
    }
}

impl CompositeLayout {
    pub fn canvas_size(&self) -> (u32, u32) {
        let width = self.margin + 3 * (self.panel_width + self.margin);
        let height = self.title_height + self.margin + 2 * (self.cell_height() + self.margin);
        (width, height)
    }

    fn cell_height(&self) -> u32 {
        self.caption_height + self.panel_height
    }

    fn cell_origin(&self, index: usize) -> (u32, u32) {
        let col = (index % 3) as u32;
        let row = (index / 3) as u32;
        (
            self.margin + col * (self.panel_width + self.margin),
            self.title_height + self.margin + row * (self.cell_height() + self.margin),
        )
    }
}

/// Where one panel's image landed on the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelPlacement {
    pub role: PanelRole,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub struct CompositeArtifact {
    pub image: RgbImage,
    pub panels: Vec<PanelPlacement>,
}

pub fn title_for(file_name: &str, class_label: &str) -> String {
    format!("Leaf filters: {file_name} [{class_label}]")
}

pub fn compose(
    outputs: &FilterOutputs,
    file_name: &str,
    class_label: &str,
    layout: &CompositeLayout,
) -> CompositeArtifact {
    let (width, height) = layout.canvas_size();
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

    let title_scale = layout.text_scale + 1;
    let title_y = layout.title_height.saturating_sub(GLYPH_HEIGHT * title_scale) / 2;
    glyphs::draw_text_centered(
        &mut canvas,
        (width / 2) as i32,
        title_y as i32,
        &title_for(file_name, class_label),
        title_scale,
        width.saturating_sub(2 * layout.margin),
        INK,
    );

    let mut panels = Vec::with_capacity(PanelRole::ORDER.len());
    for (index, role) in PanelRole::ORDER.into_iter().enumerate() {
        let (cell_x, cell_y) = layout.cell_origin(index);

        let caption_y = cell_y + layout.caption_height.saturating_sub(GLYPH_HEIGHT * layout.text_scale) / 2;
        glyphs::draw_text_centered(
            &mut canvas,
            (cell_x + layout.panel_width / 2) as i32,
            caption_y as i32,
            role.caption(),
            layout.text_scale,
            layout.panel_width,
            INK,
        );

        let fitted = fit_into(&role.render(outputs), layout.panel_width, layout.panel_height);
        let x = cell_x + layout.panel_width.saturating_sub(fitted.width()) / 2;
        let y = cell_y + layout.caption_height + layout.panel_height.saturating_sub(fitted.height()) / 2;
        imageops::replace(&mut canvas, &fitted, x as i64, y as i64);

        panels.push(PanelPlacement {
            role,
            x,
            y,
            width: fitted.width(),
            height: fitted.height(),
        });
    }

    CompositeArtifact {
        image: canvas,
        panels,
    }
}

/// Scales `image` to the largest size that fits `max_w` x `max_h` with its aspect ratio kept.
fn fit_into(image: &RgbImage, max_w: u32, max_h: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return RgbImage::from_pixel(1, 1, BACKGROUND);
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    if (new_w, new_h) == (w, h) {
        return image.clone();
    }
    imageops::resize(image, new_w, new_h, FilterType::Triangle)
}

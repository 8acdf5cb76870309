// THEORY:
// Contrast-Limited Adaptive Histogram Equalization. The image is cut into a
// grid of tiles. Every tile gets its own equalization lookup table, built from
// a histogram whose peaks are clipped at `clip_limit` times the flat level.
// The clipped mass is spread back over all bins. Each output pixel blends the
// lookup tables of the four nearest tile centres bilinearly, so tile borders
// do not show.

use image::{GrayImage, Luma};

const BINS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clahe {
    /// Histogram clip level, relative to a perfectly flat histogram. Values <= 0 disable clipping.
    pub clip_limit: f32,
    /// Number of tile columns.
    pub tiles_x: u32,
    /// Number of tile rows.
    pub tiles_y: u32,
}

impl Default for Clahe {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

impl Clahe {
    pub fn apply(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return image.clone();
        }

        let tile_w = width.div_ceil(self.tiles_x.clamp(1, width));
        let tile_h = height.div_ceil(self.tiles_y.clamp(1, height));
        let tiles_x = width.div_ceil(tile_w);
        let tiles_y = height.div_ceil(tile_h);

        let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let x0 = tx * tile_w;
                let y0 = ty * tile_h;
                let x1 = (x0 + tile_w).min(width);
                let y1 = (y0 + tile_h).min(height);
                luts.push(self.tile_lut(image, x0..x1, y0..y1));
            }
        }
        let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

        GrayImage::from_fn(width, height, |x, y| {
            let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
            let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);
            let v = image.get_pixel(x, y)[0] as usize;

            let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - ax) + lut_at(tx1, ty0)[v] as f32 * ax;
            let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - ax) + lut_at(tx1, ty1)[v] as f32 * ax;
            let value = top * (1.0 - ay) + bottom * ay;

            Luma([value.round().clamp(0.0, 255.0) as u8])
        })
    }

    fn tile_lut(
        &self,
        image: &GrayImage,
        xs: std::ops::Range<u32>,
        ys: std::ops::Range<u32>,
    ) -> [u8; BINS] {
        let mut hist = [0u32; BINS];
        for y in ys.clone() {
            for x in xs.clone() {
                hist[image.get_pixel(x, y)[0] as usize] += 1;
            }
        }
        let area = (xs.len() * ys.len()) as u32;

        if self.clip_limit > 0.0 {
            let clip = ((self.clip_limit * area as f32 / BINS as f32) as u32).max(1);
            clip_histogram(&mut hist, clip);
        }

        let scale = 255.0 / area as f32;
        let mut lut = [0u8; BINS];
        let mut cdf = 0u32;
        for (bin, out) in hist.iter().zip(lut.iter_mut()) {
            cdf += bin;
            *out = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
        }
        lut
    }
}

fn clip_histogram(hist: &mut [u32; BINS], clip: u32) {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let per_bin = excess / BINS as u32;
    let mut residual = excess % BINS as u32;
    for bin in hist.iter_mut() {
        *bin += per_bin;
    }

    if residual > 0 {
        let step = (BINS as u32 / residual).max(1) as usize;
        let mut i = 0;
        while i < BINS && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

/// Indices of the two tile centres bracketing `pos` along one axis and the
/// weight of the second one.
fn neighbours(pos: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    let floor = f.floor();
    let weight = f - floor;
    let last = tiles as i64 - 1;
    let first = (floor as i64).clamp(0, last) as u32;
    let second = (floor as i64 + 1).clamp(0, last) as u32;
    (first, second, weight)
}

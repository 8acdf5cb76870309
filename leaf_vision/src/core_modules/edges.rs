// THEORY:
// Canny edge detection on a colour image. Edges are found where any channel
// changes, not only where brightness does: two tissues of equal luma but
// different hue (a brown lesion on green leaf) still give a boundary.
//
// Steps:
// 1.  **Gradient**: 3x3 Sobel per channel. Each pixel keeps the gradient of the
//     channel with the largest L1 magnitude `|gx| + |gy|`.
// 2.  **Thinning**: non-maximum suppression along the gradient direction,
//     quantized to horizontal, vertical or one of the two diagonals.
// 3.  **Hysteresis**: pixels above `high` seed edges, which then grow through
//     8-connected pixels above `low`.
// The input is not smoothed first.

use crate::core_modules::color_space;
use image::{GrayImage, Luma, RgbImage};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

const EDGE: u8 = 255;

// tan(22.5) and tan(67.5)
const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

struct Gradients {
    width: usize,
    height: usize,
    gx: Vec<i32>,
    gy: Vec<i32>,
    magnitude: Vec<i32>,
}

impl Gradients {
    fn strongest_channel(image: &RgbImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let mut grads = Self {
            width,
            height,
            gx: vec![0; width * height],
            gy: vec![0; width * height],
            magnitude: vec![0; width * height],
        };

        for c in 0..3 {
            let plane = color_space::channel(image, c);
            let dx = horizontal_sobel(&plane);
            let dy = vertical_sobel(&plane);
            for (i, (px, py)) in dx.pixels().zip(dy.pixels()).enumerate() {
                let (sx, sy) = (px[0] as i32, py[0] as i32);
                let m = sx.abs() + sy.abs();
                if c == 0 || m > grads.magnitude[i] {
                    grads.magnitude[i] = m;
                    grads.gx[i] = sx;
                    grads.gy[i] = sy;
                }
            }
        }
        grads
    }

    fn magnitude_at(&self, x: isize, y: isize) -> i32 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0;
        }
        self.magnitude[y as usize * self.width + x as usize]
    }

    /// Whether `(x, y)` is a ridge of the magnitude across its gradient.
    fn is_local_max(&self, x: usize, y: usize) -> bool {
        let i = y * self.width + x;
        let m = self.magnitude[i];
        let (gx, gy) = (self.gx[i], self.gy[i]);
        let (ax, ay) = (gx.abs() as f32, gy.abs() as f32);
        let (x, y) = (x as isize, y as isize);

        let ((px, py), (nx, ny)) = if ay <= ax * TAN_22_5 {
            ((x - 1, y), (x + 1, y))
        } else if ay >= ax * TAN_67_5 {
            ((x, y - 1), (x, y + 1))
        } else if (gx > 0) == (gy > 0) {
            ((x - 1, y - 1), (x + 1, y + 1))
        } else {
            ((x + 1, y - 1), (x - 1, y + 1))
        };

        m > self.magnitude_at(px, py) && m >= self.magnitude_at(nx, ny)
    }
}

/// Binary edge map (0 or 255) of `image` with hysteresis thresholds `low` and `high`.
pub fn color_canny(image: &RgbImage, low: f32, high: f32) -> GrayImage {
    let grads = Gradients::strongest_channel(image);
    let (width, height) = (grads.width, grads.height);
    let mut out = GrayImage::new(image.width(), image.height());

    // Thinned candidates: 0 none, 1 weak, 2 strong.
    let mut class = vec![0u8; width * height];
    let mut stack = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let m = grads.magnitude[i] as f32;
            if m <= low || !grads.is_local_max(x, y) {
                continue;
            }
            if m > high {
                class[i] = 2;
                stack.push((x, y));
            } else {
                class[i] = 1;
            }
        }
    }

    while let Some((x, y)) = stack.pop() {
        out.put_pixel(x as u32, y as u32, Luma([EDGE]));
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                let j = ny * width + nx;
                if class[j] == 1 {
                    class[j] = 2;
                    stack.push((nx, ny));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn split(left: [u8; 3], right: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(64, 64, |x, _| if x < 32 { Rgb(left) } else { Rgb(right) })
    }

    fn edge_columns(edges: &GrayImage) -> Vec<u32> {
        let mut cols: Vec<u32> = edges
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == EDGE)
            .map(|(x, _, _)| x)
            .collect();
        cols.sort();
        cols.dedup();
        cols
    }

    #[test]
    fn flat_image_has_no_edges() {
        let edges = color_canny(&RgbImage::from_pixel(40, 30, Rgb([70, 140, 60])), 100.0, 200.0);
        assert!(edges.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn black_white_boundary_is_a_thin_full_height_line() {
        let edges = color_canny(&split([0, 0, 0], [255, 255, 255]), 100.0, 200.0);
        assert_eq!(edge_columns(&edges), vec![31]);
        assert_eq!(edges.pixels().filter(|p| p[0] == EDGE).count(), 64);
    }

    #[test]
    fn equal_luma_hue_boundary_is_detected() {
        // both sides have Rec.709 luma of about 54
        let source = split([255, 0, 0], [0, 76, 0]);
        let luma = image::imageops::grayscale(&source);
        assert!(luma.get_pixel(0, 0)[0].abs_diff(luma.get_pixel(63, 0)[0]) <= 1);

        let edges = color_canny(&source, 100.0, 200.0);
        assert_eq!(edge_columns(&edges), vec![31]);
    }

    #[test]
    fn weak_edges_survive_only_when_linked_to_strong_ones() {
        // top half: a strong step; bottom half: a faint step above `low` only
        let source = RgbImage::from_fn(48, 48, |x, y| {
            if y < 24 {
                if x < 24 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
            } else if x < 24 {
                Rgb([100, 100, 100])
            } else {
                Rgb([140, 140, 140])
            }
        });
        let edges = color_canny(&source, 100.0, 200.0);
        // the faint step (L1 magnitude 160) touches the strong one, so it is kept
        assert_eq!(edges.get_pixel(23, 40)[0], EDGE);

        let isolated = RgbImage::from_fn(48, 48, |x, _| {
            if x < 24 { Rgb([100, 100, 100]) } else { Rgb([140, 140, 140]) }
        });
        assert!(color_canny(&isolated, 100.0, 200.0).pixels().all(|p| p[0] == 0));
    }
}

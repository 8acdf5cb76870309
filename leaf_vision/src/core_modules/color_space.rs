// THEORY:
// Independent 8-bit re-encodings of the same RGB source. Every view keeps three
// 8-bit channels packed in an `RgbImage` so the rest of the engine can treat
// them as ordinary buffers and split them with `channel`.
//
// The colour math itself is `palette`'s. This module only packs its float
// results into bytes:
// - HSV: H in 0..180 (degrees halved so it fits a byte), S and V in 0..=255.
// - LAB: CIE L*a*b* under D65. L is rescaled from 0..100 to 0..255, a and b are
//   offset by 128.

use image::{GrayImage, Luma, Rgb, RgbImage};
use palette::{FromColor, Hsv, IntoColor, Lab, LinSrgb, Srgb};

pub const HSV_SATURATION: usize = 1;
pub const LAB_LIGHTNESS: usize = 0;

pub fn rgb_to_hsv(image: &RgbImage) -> RgbImage {
    map_pixels(image, |Rgb([r, g, b])| {
        let hsv: Hsv = Hsv::from_color(to_srgb(r, g, b));
        let hue = hsv.hue.into_positive_degrees();
        let h = ((hue / 2.0).round() as u32 % 180) as u8;
        Rgb([h, to_u8(hsv.saturation * 255.0), to_u8(hsv.value * 255.0)])
    })
}

pub fn rgb_to_lab(image: &RgbImage) -> RgbImage {
    map_pixels(image, |Rgb([r, g, b])| {
        let linear: LinSrgb = to_srgb(r, g, b).into_linear();
        let lab: Lab = Lab::from_color(linear);
        Rgb([
            to_u8(lab.l * 255.0 / 100.0),
            to_u8(lab.a + 128.0),
            to_u8(lab.b + 128.0),
        ])
    })
}

pub fn lab_to_rgb(image: &RgbImage) -> RgbImage {
    map_pixels(image, |Rgb([l, a, b])| {
        let lab: Lab = Lab::new(
            l as f32 * 100.0 / 255.0,
            a as f32 - 128.0,
            b as f32 - 128.0,
        );
        let linear: LinSrgb = lab.into_color();
        let srgb: Srgb = Srgb::from_linear(linear);
        Rgb([
            to_u8(srgb.red.clamp(0.0, 1.0) * 255.0),
            to_u8(srgb.green.clamp(0.0, 1.0) * 255.0),
            to_u8(srgb.blue.clamp(0.0, 1.0) * 255.0),
        ])
    })
}

/// Copies channel `index` out into its own plane.
pub fn channel(image: &RgbImage, index: usize) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[index]])
    })
}

/// Returns a copy of `image` with channel `index` taken from `plane`.
pub fn replace_channel(image: &RgbImage, index: usize, plane: &GrayImage) -> RgbImage {
    debug_assert_eq!(image.dimensions(), plane.dimensions());
    let mut out = image.clone();
    for (pixel, value) in out.pixels_mut().zip(plane.pixels()) {
        pixel[index] = value[0];
    }
    out
}

fn map_pixels(image: &RgbImage, f: impl Fn(Rgb<u8>) -> Rgb<u8>) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        *dst = f(*src);
    }
    out
}

fn to_srgb(r: u8, g: u8, b: u8) -> Srgb {
    Srgb::new(r, g, b).into_format()
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(1, 1, Rgb(rgb))
    }

    #[test]
    fn hsv_of_primaries() {
        assert_eq!(rgb_to_hsv(&single([255, 0, 0])).get_pixel(0, 0).0, [0, 255, 255]);
        assert_eq!(rgb_to_hsv(&single([0, 255, 0])).get_pixel(0, 0).0, [60, 255, 255]);
        assert_eq!(rgb_to_hsv(&single([0, 0, 255])).get_pixel(0, 0).0, [120, 255, 255]);
    }

    #[test]
    fn hsv_of_grays_has_no_saturation() {
        for v in [0u8, 17, 128, 255] {
            let hsv = rgb_to_hsv(&single([v, v, v]));
            assert_eq!(hsv.get_pixel(0, 0).0, [0, 0, v]);
        }
    }

    #[test]
    fn lab_lightness_spans_black_to_white() {
        assert_eq!(rgb_to_lab(&single([0, 0, 0])).get_pixel(0, 0).0, [0, 128, 128]);
        let white = rgb_to_lab(&single([255, 255, 255]));
        let Rgb([l, a, b]) = *white.get_pixel(0, 0);
        assert_eq!(l, 255);
        assert!(a.abs_diff(128) <= 1 && b.abs_diff(128) <= 1);
    }

    #[test]
    fn lab_round_trip_stays_close() {
        let source = RgbImage::from_fn(16, 16, |x, y| {
            Rgb([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8])
        });
        let back = lab_to_rgb(&rgb_to_lab(&source));
        for (a, b) in source.pixels().zip(back.pixels()) {
            for c in 0..3 {
                assert!(a[c].abs_diff(b[c]) <= 6, "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn channel_replacement_only_touches_one_plane() {
        let source = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let plane = GrayImage::from_pixel(3, 2, Luma([99]));
        let out = replace_channel(&source, 0, &plane);
        assert!(out.pixels().all(|p| p.0 == [99, 20, 30]));
        assert!(channel(&out, 2).pixels().all(|p| p[0] == 30));
    }
}

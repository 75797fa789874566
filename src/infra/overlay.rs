use image::{Rgb, RgbImage};

use crate::domain::slice::MASK_THRESHOLD;

/// Ground-truth tint.
pub const TRUTH_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
/// Prediction tint.
pub const PREDICTION_COLOR: Rgb<u8> = Rgb([255, 64, 64]);

const ALPHA: f32 = 0.5;
const GAP: u32 = 4;

/// Grayscale slice with foreground pixels blended towards `color`.
///
/// `mask` entries above the 0.5 threshold count as foreground, so both
/// binary labels and raw probabilities can be passed.
pub fn render_overlay(image: &[f32], mask: &[f32], width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let i = (y * width + x) as usize;
        let gray = image.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0) * 255.0;
        let on = mask.get(i).map_or(false, |&m| m > MASK_THRESHOLD);
        if on {
            Rgb(color.0.map(|c| (gray * (1.0 - ALPHA) + c as f32 * ALPHA) as u8))
        } else {
            Rgb([gray as u8; 3])
        }
    })
}

/// Left: slice + ground truth. Right: slice + thresholded prediction.
pub fn render_side_by_side(
    image: &[f32],
    truth: &[f32],
    prediction: &[f32],
    width: u32,
    height: u32,
) -> RgbImage {
    let left  = render_overlay(image, truth, width, height, TRUTH_COLOR);
    let right = render_overlay(image, prediction, width, height, PREDICTION_COLOR);

    let mut canvas = RgbImage::new(2 * width + GAP, height);
    for (x, y, px) in left.enumerate_pixels() {
        canvas.put_pixel(x, y, *px);
    }
    for (x, y, px) in right.enumerate_pixels() {
        canvas.put_pixel(width + GAP + x, y, *px);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_tints_only_foreground() {
        let img = render_overlay(&[1.0, 0.0], &[1.0, 0.0], 2, 1, PREDICTION_COLOR);
        assert_eq!(*img.get_pixel(1, 0), Rgb([0, 0, 0]));
        assert_ne!(*img.get_pixel(0, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_prediction_is_thresholded() {
        let img = render_overlay(&[0.0, 0.0], &[0.5, 0.51], 2, 1, PREDICTION_COLOR);
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_ne!(*img.get_pixel(1, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_side_by_side_layout() {
        let canvas = render_side_by_side(&[0.5; 6], &[0.0; 6], &[1.0; 6], 3, 2);
        assert_eq!(canvas.dimensions(), (2 * 3 + GAP, 2));
        // Gap column stays black; right panel is tinted.
        assert_eq!(*canvas.get_pixel(3, 0), Rgb([0, 0, 0]));
        assert_ne!(*canvas.get_pixel(3 + GAP, 0), *canvas.get_pixel(0, 0));
    }
}

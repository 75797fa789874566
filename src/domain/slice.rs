// ============================================================
// Layer 3 - Slice Domain Types
// ============================================================
// A slice is one 2D cross-section of a cardiac MRI volume.
// Images are single channel, row-major, intensities in [0, 1].
// Masks are binary: 1 = left atrium, 0 = background.
//
// Reference: Rust Book §5 (Structs and Methods)

use serde::{Deserialize, Serialize};

/// Probabilities strictly above this value count as foreground.
pub const MASK_THRESHOLD: f32 = 0.5;

/// A single-channel image slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceImage {
    /// File stem the slice was loaded from, kept for traceability
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Row-major normalised intensities, `width * height` entries
    pub pixels: Vec<f32>,
}

impl SliceImage {
    pub fn new(name: impl Into<String>, width: u32, height: u32, pixels: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            pixels,
        }
    }

    /// Number of pixels the slice should hold for its dimensions.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// An (image, mask) training pair of equal spatial size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceSample {
    pub image: SliceImage,
    /// Row-major binary mask, same length as `image.pixels`
    pub mask: Vec<u8>,
}

impl SliceSample {
    pub fn new(image: SliceImage, mask: Vec<u8>) -> Self {
        Self { image, mask }
    }

    pub fn name(&self) -> &str {
        &self.image.name
    }

    pub fn dims(&self) -> (u32, u32) {
        (self.image.width, self.image.height)
    }

    /// Number of foreground pixels in the mask.
    pub fn foreground(&self) -> usize {
        self.mask.iter().filter(|&&m| m != 0).count()
    }
}

/// Turn a probability map into a binary mask.
pub fn threshold_mask(probs: &[f32]) -> Vec<u8> {
    probs.iter().map(|&p| u8::from(p > MASK_THRESHOLD)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        let mask = threshold_mask(&[0.0, 0.49, 0.5, 0.51, 1.0]);
        assert_eq!(mask, vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_foreground_counts_nonzero() {
        let image  = SliceImage::new("3", 2, 2, vec![0.0; 4]);
        let sample = SliceSample::new(image, vec![0, 1, 1, 0]);
        assert_eq!(sample.foreground(), 2);
        assert_eq!(sample.dims(), (2, 2));
        assert_eq!(sample.image.area(), 4);
    }
}

// ============================================================
// Layer 4 - Training Augmentation
// ============================================================
// Random geometric augmentation applied to training slices only.
//
//   1. Affine: scale, rotation about the slice centre, translation
//   2. Elastic: smooth random displacement field (optional)
//
// Both steps are folded into one coordinate map so every output
// pixel is resampled exactly once:
//
//   out(p) = in(A(p + d(p)))
//
// The image is sampled bilinearly, the mask with nearest neighbour
// so it stays binary. Pixels mapped from outside the slice are 0.
//
// Reference: rand crate documentation
//            image crate imageops (blur, interpolate_*)
//            Simard et al. (2003) elastic distortions

use image::{
    imageops::{blur, interpolate_bilinear, interpolate_nearest},
    ImageBuffer, Luma,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::slice::{SliceImage, SliceSample};

type FloatPlane = ImageBuffer<Luma<f32>, Vec<f32>>;
type MaskPlane  = ImageBuffer<Luma<u8>, Vec<u8>>;

/// Elastic deformation parameters, sampled uniformly per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticConfig {
    /// Displacement magnitude range in pixels
    pub alpha: (f32, f32),
    /// Gaussian smoothing sigma range in pixels
    pub sigma: (f32, f32),
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            alpha: (0.0, 40.0),
            sigma: (4.0, 8.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Uniform zoom factor range
    pub scale: (f32, f32),
    /// Rotation range in degrees
    pub rotate_deg: (f32, f32),
    /// Shift range as a fraction of width / height, drawn per axis
    pub translate: (f32, f32),
    pub elastic: Option<ElasticConfig>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            scale:      (0.85, 1.15),
            rotate_deg: (-45.0, 45.0),
            translate:  (-0.15, 0.15),
            elastic:    Some(ElasticConfig::default()),
        }
    }
}

#[cfg(test)]
impl AugmentConfig {
    /// A pipeline that leaves slices untouched.
    pub fn identity() -> Self {
        Self {
            scale:      (1.0, 1.0),
            rotate_deg: (0.0, 0.0),
            translate:  (0.0, 0.0),
            elastic:    None,
        }
    }
}

/// Applies the same random transform to a slice and its mask.
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentConfig,
}

impl Augmenter {
    pub fn new(config: AugmentConfig) -> Self {
        Self { config }
    }

    pub fn apply<R: Rng>(&self, sample: &SliceSample, rng: &mut R) -> SliceSample {
        let (w, h) = sample.dims();
        let (Some(image), Some(mask)) = (
            FloatPlane::from_raw(w, h, sample.image.pixels.clone()),
            MaskPlane::from_raw(w, h, sample.mask.clone()),
        ) else {
            // Buffers that do not match their dimensions are passed through.
            return sample.clone();
        };

        let scale = sample_range(rng, self.config.scale).max(1e-3);
        let theta = sample_range(rng, self.config.rotate_deg).to_radians();
        let tx = sample_range(rng, self.config.translate) * w as f32;
        let ty = sample_range(rng, self.config.translate) * h as f32;
        let displacement = match &self.config.elastic {
            Some(elastic) => {
                let alpha = sample_range(rng, elastic.alpha);
                let sigma = sample_range(rng, elastic.sigma);
                Some(elastic_field(w, h, alpha, sigma, rng))
            }
            None => None,
        };

        // Inverse map: output -> source. Undo the shift, then rotate by
        // -theta and shrink by 1/scale, giving a forward zoom of `scale`.
        let (cx, cy) = ((w as f32 - 1.0) / 2.0, (h as f32 - 1.0) / 2.0);
        let (sin, cos) = (-theta).sin_cos();

        let mut pixels = Vec::with_capacity(sample.image.pixels.len());
        let mut out_mask = Vec::with_capacity(sample.mask.len());
        for y in 0..h {
            for x in 0..w {
                let (mut px, mut py) = (x as f32, y as f32);
                if let Some((dx, dy)) = &displacement {
                    px += dx.get_pixel(x, y)[0];
                    py += dy.get_pixel(x, y)[0];
                }
                let (ox, oy) = ((px - tx - cx) / scale, (py - ty - cy) / scale);
                let sx = cos * ox - sin * oy + cx;
                let sy = sin * ox + cos * oy + cy;

                pixels.push(interpolate_bilinear(&image, sx, sy).map_or(0.0, |p| p[0]));
                out_mask.push(interpolate_nearest(&mask, sx, sy).map_or(0, |p| p[0]));
            }
        }

        let image = SliceImage::new(sample.image.name.clone(), w, h, pixels);
        SliceSample::new(image, out_mask)
    }
}

fn sample_range<R: Rng>(rng: &mut R, (lo, hi): (f32, f32)) -> f32 {
    if hi <= lo {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

/// Uniform noise in [-1, 1], Gaussian-smoothed and scaled by `alpha`.
fn elastic_field<R: Rng>(w: u32, h: u32, alpha: f32, sigma: f32, rng: &mut R) -> (FloatPlane, FloatPlane) {
    let mut field = || -> FloatPlane {
        let noise = FloatPlane::from_fn(w, h, |_, _| Luma([rng.gen_range(-1.0f32..=1.0)]));
        let mut smooth = blur(&noise, sigma.max(0.1));
        smooth.pixels_mut().for_each(|p| p[0] *= alpha);
        smooth
    };
    let dx = field();
    let dy = field();
    (dx, dy)
}

// ============================================================
// Layer 2 - Predict Use Case
// ============================================================
// Segments one preprocessed volume (a directory of slice PNGs):
//
//   <output>/masks/<slice>.png     ← binary mask, foreground = 255
//   <output>/overlays/<slice>.png  ← prediction tinted over the slice

use anyhow::{ensure, Context, Result};
use burn::{
    backend::{NdArray, Wgpu},
    prelude::*,
};
use std::{fs, path::Path};

use crate::application::ComputeBackend;
use crate::data::loader::{load_volume, save_mask};
use crate::domain::checkpoint::CheckpointRecord;
use crate::infra::{
    checkpoint::CheckpointStore,
    overlay::{render_overlay, PREDICTION_COLOR},
};
use crate::ml::inferencer::Inferencer;

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionReport {
    pub checkpoint: CheckpointRecord,
    pub slices:     usize,
    /// Total predicted foreground pixels over the volume
    pub foreground: usize,
}

pub struct PredictUseCase {
    checkpoint_dir: String,
    checkpoint:     Option<String>,
    backend:        ComputeBackend,
}

impl PredictUseCase {
    /// `checkpoint = None` uses the best retained checkpoint.
    pub fn new(checkpoint_dir: String, checkpoint: Option<String>, backend: ComputeBackend) -> Self {
        Self { checkpoint_dir, checkpoint, backend }
    }

    pub fn execute(&self, input_dir: &Path, output_dir: &Path) -> Result<PredictionReport> {
        match self.backend {
            ComputeBackend::Wgpu    => self.run::<Wgpu>(input_dir, output_dir),
            ComputeBackend::NdArray => self.run::<NdArray>(input_dir, output_dir),
        }
    }

    fn run<B: Backend>(&self, input_dir: &Path, output_dir: &Path) -> Result<PredictionReport> {
        let slices = load_volume(input_dir)?;
        ensure!(!slices.is_empty(), "No slice PNGs found in '{}'", input_dir.display());

        let store = CheckpointStore::new(&self.checkpoint_dir)?;
        let (inferencer, checkpoint) =
            Inferencer::<B>::from_checkpoint(&store, self.checkpoint.as_deref(), B::Device::default())?;

        let masks_dir    = output_dir.join("masks");
        let overlays_dir = output_dir.join("overlays");
        for dir in [&masks_dir, &overlays_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        }

        let masks = inferencer.segment_volume(&slices)?;
        let mut foreground = 0usize;
        for (slice, mask) in slices.iter().zip(&masks) {
            let file = format!("{}.png", slice.name);
            save_mask(&masks_dir.join(&file), mask, slice.width, slice.height)?;

            let as_float: Vec<f32> = mask.iter().map(|&m| f32::from(m)).collect();
            let overlay_path = overlays_dir.join(&file);
            render_overlay(&slice.pixels, &as_float, slice.width, slice.height, PREDICTION_COLOR)
                .save(&overlay_path)
                .with_context(|| format!("Cannot write overlay '{}'", overlay_path.display()))?;

            foreground += mask.iter().filter(|&&m| m != 0).count();
        }

        tracing::info!(
            "Segmented {} slices from '{}' into '{}'",
            slices.len(),
            input_dir.display(),
            output_dir.display()
        );
        Ok(PredictionReport { checkpoint, slices: slices.len(), foreground })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{seed_checkpoint, write_png};

    #[test]
    fn test_writes_mask_and_overlay_per_slice() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = tmp.path().join("ckpt");
        let record = seed_checkpoint(&ckpt);

        let volume = tmp.path().join("volume");
        fs::create_dir_all(&volume).unwrap();
        write_png(&volume.join("0.png"), 8, 8, |x, _| (x * 30) as u8);
        write_png(&volume.join("1.png"), 8, 8, |_, y| (y * 30) as u8);

        let out = tmp.path().join("out");
        let report = PredictUseCase::new(ckpt.to_string_lossy().into_owned(), None, ComputeBackend::NdArray)
            .execute(&volume, &out)
            .unwrap();

        assert_eq!(report.slices, 2);
        assert_eq!(report.checkpoint, record);
        for name in ["0.png", "1.png"] {
            assert!(out.join("masks").join(name).is_file());
            assert!(out.join("overlays").join(name).is_file());
        }
        let overlay = image::open(out.join("overlays").join("0.png")).unwrap();
        assert_eq!((overlay.width(), overlay.height()), (8, 8));
    }

    #[test]
    fn test_unknown_checkpoint_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = tmp.path().join("ckpt");
        seed_checkpoint(&ckpt);
        let volume = tmp.path().join("volume");
        fs::create_dir_all(&volume).unwrap();
        write_png(&volume.join("0.png"), 8, 8, |_, _| 0);

        let result = PredictUseCase::new(
            ckpt.to_string_lossy().into_owned(),
            Some("epoch_999.mpk".to_string()),
            ComputeBackend::NdArray,
        )
        .execute(&volume, &tmp.path().join("out"));
        assert!(result.is_err());
    }
}

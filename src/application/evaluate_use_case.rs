// ============================================================
// Layer 2 - Evaluate Use Case
// ============================================================
// Scores a retained checkpoint on a labelled split. Each slice is
// thresholded at 0.5 and compared with its mask; the report holds
// the per-slice Dice score and their unweighted mean.

use anyhow::{ensure, Result};
use burn::{
    backend::{NdArray, Wgpu},
    prelude::*,
};

use crate::application::ComputeBackend;
use crate::data::loader::SliceDirLoader;
use crate::domain::checkpoint::CheckpointRecord;
use crate::domain::slice::threshold_mask;
use crate::domain::traits::SliceSource;
use crate::infra::checkpoint::CheckpointStore;
use crate::ml::{
    dice::{dice_loss_values, dice_score},
    inferencer::Inferencer,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SliceScore {
    pub name: String,
    pub dice: f32,
}

/// Per-slice Dice scores for one split and their unweighted mean.
///
/// Dice is computed with the same smoothing as the training loss, so a
/// slice whose mask and prediction are both empty scores about 0, not 1.
/// On volumes with many background-only slices `mean_dice` therefore
/// understates agreement; `empty_slices` counts those slices.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub checkpoint:   CheckpointRecord,
    pub slices:       Vec<SliceScore>,
    pub mean_dice:    f32,
    pub empty_slices: usize,
}

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    checkpoint:     Option<String>,
    backend:        ComputeBackend,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: String, checkpoint: Option<String>, backend: ComputeBackend) -> Self {
        Self { checkpoint_dir, checkpoint, backend }
    }

    pub fn execute(&self, data_dir: &str, split: &str) -> Result<EvaluationReport> {
        match self.backend {
            ComputeBackend::Wgpu    => self.run::<Wgpu>(data_dir, split),
            ComputeBackend::NdArray => self.run::<NdArray>(data_dir, split),
        }
    }

    fn run<B: Backend>(&self, data_dir: &str, split: &str) -> Result<EvaluationReport> {
        let samples = SliceDirLoader::for_split(data_dir, split).load_all()?;
        ensure!(!samples.is_empty(), "No slices in split '{}' under '{}'", split, data_dir);

        let store = CheckpointStore::new(&self.checkpoint_dir)?;
        let (inferencer, checkpoint) =
            Inferencer::<B>::from_checkpoint(&store, self.checkpoint.as_deref(), B::Device::default())?;

        let mut slices = Vec::with_capacity(samples.len());
        let mut empty_slices = 0;
        for sample in &samples {
            let pred = threshold_mask(&inferencer.predict_slice(&sample.image)?);
            if sample.foreground() == 0 && pred.iter().all(|&m| m == 0) {
                empty_slices += 1;
            }
            let dice = score_slice(&pred, &sample.mask)?;
            tracing::debug!("Slice '{}': dice={:.4}", sample.name(), dice);
            slices.push(SliceScore { name: sample.name().to_string(), dice });
        }

        let mean_dice = (slices.iter().map(|s| s.dice as f64).sum::<f64>() / slices.len() as f64) as f32;
        tracing::info!("Mean Dice on '{}': {:.4} over {} slices", split, mean_dice, slices.len());
        Ok(EvaluationReport { checkpoint, slices, mean_dice, empty_slices })
    }
}

/// Smoothed Dice between a predicted and a reference binary mask.
fn score_slice(pred: &[u8], truth: &[u8]) -> Result<f32> {
    let pred: Vec<f32>  = pred.iter().map(|&m| f32::from(m)).collect();
    let truth: Vec<f32> = truth.iter().map(|&m| f32::from(m)).collect();
    Ok(dice_score(dice_loss_values(&pred, &truth)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{seed_checkpoint, write_png};
    use std::fs;

    #[test]
    fn test_reports_one_score_per_slice() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = tmp.path().join("ckpt");
        seed_checkpoint(&ckpt);

        for kind in ["images", "masks"] {
            let dir = tmp.path().join("data").join("val").join(kind);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..3u32 {
                write_png(&dir.join(format!("{i}.png")), 8, 8, |x, y| {
                    if kind == "masks" { u8::from(x + y > i) * 255 } else { (x * 20 + i) as u8 }
                });
            }
        }

        let report = EvaluateUseCase::new(ckpt.to_string_lossy().into_owned(), None, ComputeBackend::NdArray)
            .execute(&tmp.path().join("data").to_string_lossy(), "val")
            .unwrap();

        let names: Vec<&str> = report.slices.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "2"]);
        assert!(report.slices.iter().all(|s| (0.0..=1.0).contains(&s.dice)));
        let mean = report.slices.iter().map(|s| s.dice).sum::<f32>() / 3.0;
        assert!((report.mean_dice - mean).abs() < 1e-6);
    }

    #[test]
    fn test_empty_slice_scores_near_zero() {
        assert!(score_slice(&[0; 16], &[0; 16]).unwrap().abs() < 1e-3);
        assert!((score_slice(&[1, 1, 0, 0], &[1, 1, 0, 0]).unwrap() - 1.0).abs() < 1e-3);
        assert!(score_slice(&[1, 0], &[1, 0, 0]).is_err());
    }

    #[test]
    fn test_missing_split_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = tmp.path().join("ckpt");
        seed_checkpoint(&ckpt);
        let result = EvaluateUseCase::new(ckpt.to_string_lossy().into_owned(), None, ComputeBackend::NdArray)
            .execute(&tmp.path().to_string_lossy(), "test");
        assert!(result.is_err());
    }
}

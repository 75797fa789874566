// ============================================================
// Layer 5 - Dice Loss
// ============================================================
// Overlap loss between a predicted probability mask P and a
// binary ground-truth mask M, both flattened to length n:
//
//   intersection = Σ P_i · M_i
//   denominator  = Σ P_i + Σ M_i + ε
//   dice_score   = 2 · intersection / denominator
//   dice_loss    = 1 − dice_score
//
// ε is always added, so two empty masks give loss ≈ 1 instead
// of 0/0. For inputs in [0, 1] the loss lies in [0, 1]; 0 means
// perfect overlap.
//
// The tensor form flattens the WHOLE batch into one sequence and
// stays differentiable through Burn's autodiff.
//
// Reference: Milletari et al. (2016) V-Net

use burn::prelude::*;
use thiserror::Error;

/// Added to the denominator unconditionally.
pub const EPSILON: f64 = 1e-8;

#[derive(Debug, Error, PartialEq)]
pub enum DiceError {
    #[error("dice inputs differ in size: prediction {pred:?} ({pred_len} values) vs mask {mask:?} ({mask_len} values)")]
    ShapeMismatch {
        pred: Vec<usize>,
        mask: Vec<usize>,
        pred_len: usize,
        mask_len: usize,
    },
}

/// Differentiable Dice loss over tensors of any rank.
///
/// Shapes may differ as long as both flatten to the same length;
/// otherwise a `ShapeMismatch` is returned.
pub fn dice_loss<B: Backend, const D1: usize, const D2: usize>(
    pred: Tensor<B, D1>,
    mask: Tensor<B, D2>,
) -> Result<Tensor<B, 1>, DiceError> {
    let pred_dims = pred.dims().to_vec();
    let mask_dims = mask.dims().to_vec();
    let pred_len: usize = pred_dims.iter().product();
    let mask_len: usize = mask_dims.iter().product();
    if pred_len != mask_len {
        return Err(DiceError::ShapeMismatch {
            pred: pred_dims,
            mask: mask_dims,
            pred_len,
            mask_len,
        });
    }

    let pred: Tensor<B, 1> = pred.reshape([pred_len]);
    let mask: Tensor<B, 1> = mask.reshape([mask_len]);

    let intersection = (pred.clone() * mask.clone()).sum();
    let denominator  = pred.sum() + mask.sum() + EPSILON;
    let score = intersection * 2.0 / denominator;

    Ok(score.neg() + 1.0)
}

/// Host-side Dice loss, used for evaluation reports.
pub fn dice_loss_values(pred: &[f32], mask: &[f32]) -> Result<f32, DiceError> {
    if pred.len() != mask.len() {
        return Err(DiceError::ShapeMismatch {
            pred: vec![pred.len()],
            mask: vec![mask.len()],
            pred_len: pred.len(),
            mask_len: mask.len(),
        });
    }

    let (mut intersection, mut pred_sum, mut mask_sum) = (0.0f64, 0.0f64, 0.0f64);
    for (&p, &m) in pred.iter().zip(mask) {
        intersection += p as f64 * m as f64;
        pred_sum += p as f64;
        mask_sum += m as f64;
    }
    let score = 2.0 * intersection / (pred_sum + mask_sum + EPSILON);
    Ok((1.0 - score) as f32)
}

/// Dice score (higher is better) from a Dice loss.
pub fn dice_score(loss: f32) -> f32 {
    1.0 - loss
}

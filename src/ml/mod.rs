// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// Everything that runs tensors through Burn lives here.
//
//   dice.rs       - Dice overlap loss (tensor and host forms)
//
//   model.rs      - U-Net encoder/decoder and the
//                   SegmentationModel trait the step function
//                   is written against
//
//   step.rs       - One batch in Train or Eval mode: forward,
//                   sigmoid, Dice loss, logging, and in Train
//                   mode the backward pass and Adam update
//
//   trainer.rs    - Epoch driver: data loaders, train and
//                   validation passes, top-K checkpointing,
//                   stop flag
//
//   inferencer.rs - Loads a checkpoint and segments slices
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Ronneberger et al. (2015) U-Net

/// Dice loss
pub mod dice;

/// U-Net architecture
pub mod model;

/// Parametrized train/eval step
pub mod step;

/// Epoch driver with validation and checkpointing
pub mod trainer;

/// Inference engine
pub mod inferencer;

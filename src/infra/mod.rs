// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of training
// and inference:
//
//   checkpoint.rs - Retained model weights
//                   Writes weights with Burn's CompactRecorder,
//                   mirrors the retained list in checkpoints.json
//                   and stores TrainConfig so inference can
//                   rebuild the model.
//
//   metrics.rs    - Metric log
//                   Appends scalars to metrics.csv and writes
//                   visual samples as PNG files.
//
//   overlay.rs    - Visualisation
//                   Renders masks on top of slices, side by side.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// CSV + PNG metric sink
pub mod metrics;

/// Mask overlay rendering
pub mod overlay;

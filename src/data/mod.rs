// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// From preprocessed slice files to tensor batches:
//
//   PNG slices
//       │
//       ▼
//   SliceDirLoader    → reads image/mask pairs
//       │
//       ▼
//   SliceDataset      → Burn Dataset, augments training slices
//       │
//       ▼
//   SliceBatcher      → stacks samples into tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the epoch driver
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads (image, mask) slice pairs and whole volumes from disk
pub mod loader;

/// Random affine and elastic augmentation
pub mod augment;

/// Implements Burn's Dataset trait for slices
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal each: train, predict, evaluate.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination and backend selection
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// Segment a volume with a retained checkpoint
pub mod predict_use_case;

// Score a retained checkpoint on a labelled split
pub mod evaluate_use_case;

/// Burn backend a use case runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComputeBackend {
    /// GPU through wgpu
    #[default]
    Wgpu,
    /// CPU through ndarray
    NdArray,
}

#[cfg(test)]
pub(crate) mod test_support {
    use burn::backend::NdArray;
    use image::{GrayImage, Luma};
    use std::path::Path;

    use super::train_use_case::TrainConfig;
    use crate::domain::checkpoint::{CheckpointRecord, TopKCheckpoints};
    use crate::infra::checkpoint::CheckpointStore;
    use crate::ml::model::UNet;

    pub fn write_png(path: &Path, w: u32, h: u32, f: impl Fn(u32, u32) -> u8) {
        GrayImage::from_fn(w, h, |x, y| Luma([f(x, y)])).save(path).unwrap();
    }

    /// A checkpoint directory holding one untrained tiny U-Net.
    pub fn seed_checkpoint(dir: &Path) -> CheckpointRecord {
        let cfg = TrainConfig { base_channels: 2, depth: 1, ..TrainConfig::default() };
        let store = CheckpointStore::new(dir).unwrap();
        store.save_config(&cfg).unwrap();

        let model: UNet<NdArray> = cfg.model_config().init(&Default::default());
        let file = store.save_model::<NdArray, _>(&model, 1).unwrap();
        let mut policy = TopKCheckpoints::new(1);
        let record = CheckpointRecord::new(1, 0.5, file);
        let admission = policy.offer(record.clone());
        store.commit(&policy, &admission).unwrap();
        record
    }
}

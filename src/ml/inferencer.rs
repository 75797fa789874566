// ============================================================
// Layer 5 - Inferencer
// ============================================================
// Rebuilds the U-Net from train_config.json, loads a retained
// checkpoint and segments slices one at a time. Every slice is
// independent: no state is carried between calls.
//
// Reference: Burn Book §6 (Inference)

use anyhow::{anyhow, ensure, Result};
use burn::{prelude::*, tensor::activation::sigmoid};

use crate::domain::checkpoint::CheckpointRecord;
use crate::domain::slice::{threshold_mask, SliceImage};
use crate::infra::checkpoint::CheckpointStore;
use crate::ml::model::{UNet, UNetConfig};

pub struct Inferencer<B: Backend> {
    model:     UNet<B>,
    model_cfg: UNetConfig,
    device:    B::Device,
}

impl<B: Backend> Inferencer<B> {
    /// Load a checkpoint from `store`. `file = None` picks the best
    /// retained one.
    pub fn from_checkpoint(
        store:  &CheckpointStore,
        file:   Option<&str>,
        device: B::Device,
    ) -> Result<(Self, CheckpointRecord)> {
        let model_cfg = store.load_config()?.model_config();
        let model: UNet<B> = model_cfg.init(&device);

        let (model, record) = match file {
            Some(file) => {
                let record = store
                    .retained()?
                    .into_iter()
                    .find(|r| r.file == file)
                    .ok_or_else(|| anyhow!("Checkpoint '{}' is not in the retained list", file))?;
                (store.load_model::<B, _>(model, file, &device)?, record)
            }
            None => store.load_best::<B, _>(model, &device)?,
        };

        tracing::info!("Model loaded from checkpoint '{}'", record.file);
        Ok((Self::new(model, model_cfg, device), record))
    }

    pub fn new(model: UNet<B>, model_cfg: UNetConfig, device: B::Device) -> Self {
        Self { model, model_cfg, device }
    }

    /// Foreground probability for every pixel of `slice`, row-major.
    pub fn predict_slice(&self, slice: &SliceImage) -> Result<Vec<f32>> {
        self.model_cfg.check_input(slice.width, slice.height)?;
        ensure!(
            slice.pixels.len() == slice.area(),
            "Slice '{}' holds {} pixels, expected {}",
            slice.name,
            slice.pixels.len(),
            slice.area()
        );

        let shape = [1, 1, slice.height as usize, slice.width as usize];
        let input = Tensor::<B, 4>::from_data(TensorData::new(slice.pixels.clone(), shape), &self.device);
        let probs = sigmoid(self.model.forward(input));

        probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read prediction for '{}': {e:?}", slice.name))
    }

    /// Binary mask for every slice of a volume, in input order.
    pub fn segment_volume(&self, slices: &[SliceImage]) -> Result<Vec<Vec<u8>>> {
        slices
            .iter()
            .map(|slice| self.predict_slice(slice).map(|p| threshold_mask(&p)))
            .collect()
    }
}

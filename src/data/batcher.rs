// ============================================================
// Layer 4 - Slice Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<SliceSample>
// into image and mask tensors.
//
//   Input:  N samples, each H x W
//   Output: images [N, 1, H, W] (float)
//           masks  [N, 1, H, W] (int, 0 or 1)
//
// Masks stay integer here; the step function casts them to float.
// All samples of a split share one size (checked by the loader).
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::domain::slice::SliceSample;

/// A batch of slices ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct SliceBatch<B: Backend> {
    /// Shape: [batch_size, 1, height, width]
    pub images: Tensor<B, 4>,

    /// Shape: [batch_size, 1, height, width]
    pub masks: Tensor<B, 4, Int>,
}

impl<B: Backend> SliceBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }
}

#[derive(Clone, Debug)]
pub struct SliceBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SliceBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<SliceSample, SliceBatch<B>> for SliceBatcher<B> {
    fn batch(&self, items: Vec<SliceSample>) -> SliceBatch<B> {
        let batch_size = items.len();
        let (width, height) = items
            .first()
            .map(SliceSample::dims)
            .unwrap_or((0, 0));
        let shape = [batch_size, 1, height as usize, width as usize];

        let image_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.image.pixels.iter().copied())
            .collect();

        let mask_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.mask.iter().map(|&m| m as i32))
            .collect();

        let images = Tensor::<B, 4>::from_data(TensorData::new(image_flat, shape), &self.device);
        let masks  = Tensor::<B, 4, Int>::from_data(TensorData::new(mask_flat, shape), &self.device);

        SliceBatch { images, masks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::slice::SliceImage;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batch_shapes_and_values() {
        let device = Default::default();
        let batcher = SliceBatcher::<TestBackend>::new(device);
        let items = vec![
            SliceSample::new(SliceImage::new("0", 3, 2, vec![0.1; 6]), vec![1, 0, 0, 0, 0, 0]),
            SliceSample::new(SliceImage::new("1", 3, 2, vec![0.9; 6]), vec![0, 0, 0, 0, 0, 1]),
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.images.dims(), [2, 1, 2, 3]);
        assert_eq!(batch.masks.dims(), [2, 1, 2, 3]);
        assert_eq!(batch.len(), 2);

        let mask_sum: i64 = batch.masks.sum().into_scalar().elem::<i64>();
        assert_eq!(mask_sum, 2);

        let second: Vec<f32> = batch
            .images
            .slice([1..2, 0..1, 0..2, 0..3])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap();
        assert!(second.iter().all(|&v| (v - 0.9).abs() < 1e-6));
    }
}

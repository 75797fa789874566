use burn::data::dataset::Dataset;

use crate::data::augment::Augmenter;
use crate::domain::slice::SliceSample;

/// Burn dataset over in-memory slices.
/// Training datasets carry an augmenter; validation datasets never do.
pub struct SliceDataset {
    samples:   Vec<SliceSample>,
    augmenter: Option<Augmenter>,
}

impl SliceDataset {
    pub fn new(samples: Vec<SliceSample>) -> Self {
        Self { samples, augmenter: None }
    }

    pub fn with_augmenter(samples: Vec<SliceSample>, augmenter: Augmenter) -> Self {
        Self { samples, augmenter: Some(augmenter) }
    }

    pub fn is_augmented(&self) -> bool {
        self.augmenter.is_some()
    }

    /// (width, height) shared by every slice, if there are any.
    pub fn slice_dims(&self) -> Option<(u32, u32)> {
        self.samples.first().map(SliceSample::dims)
    }
}

impl Dataset<SliceSample> for SliceDataset {
    fn get(&self, index: usize) -> Option<SliceSample> {
        let sample = self.samples.get(index)?;
        match &self.augmenter {
            Some(aug) => Some(aug.apply(sample, &mut rand::thread_rng())),
            None => Some(sample.clone()),
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

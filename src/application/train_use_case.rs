// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Validate the configuration
//   Step 2: Load train / val slices     (Layer 4 - data)
//   Step 3: Check slice size vs U-Net   (Layer 5 - ml)
//   Step 4: Build datasets              (Layer 4 - data)
//   Step 5: Open checkpoint store       (Layer 6 - infra)
//   Step 6: Open metric log             (Layer 6 - infra)
//   Step 7: Run the epoch driver        (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{ensure, Result};
use burn::backend::{Autodiff, NdArray, Wgpu};
use serde::{Deserialize, Serialize};
use std::sync::{atomic::AtomicBool, Arc};

use crate::application::ComputeBackend;
use crate::data::{
    augment::{AugmentConfig, Augmenter},
    dataset::SliceDataset,
    loader::SliceDirLoader,
};
use crate::domain::traits::SliceSource;
use crate::infra::{checkpoint::CheckpointStore, metrics::FileMetricSink};
use crate::ml::{
    model::{UNetConfig, MAX_DEPTH},
    step::SampleCadence,
    trainer::{run_training, TrainingSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a training run.
// Serialisable so it can be saved next to the checkpoints and reloaded
// to rebuild the model for inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:           String,
    pub checkpoint_dir:     String,
    pub log_dir:            String,
    pub epochs:             usize,
    pub batch_size:         usize,
    pub lr:                 f64,
    pub keep_top_k:         usize,
    pub base_channels:      usize,
    pub depth:              usize,
    pub seed:               u64,
    pub train_sample_every: usize,
    pub val_sample_every:   usize,
    pub augment:            bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:           "data/slices".to_string(),
            checkpoint_dir:     "checkpoints".to_string(),
            log_dir:            "logs".to_string(),
            epochs:             75,
            batch_size:         8,
            lr:                 1e-4,
            keep_top_k:         10,
            base_channels:      64,
            depth:              4,
            seed:               42,
            train_sample_every: 50,
            val_sample_every:   2,
            augment:            true,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self) -> UNetConfig {
        UNetConfig::new()
            .with_base_channels(self.base_channels)
            .with_depth(self.depth)
    }

    pub fn cadence(&self) -> SampleCadence {
        SampleCadence {
            train_every: self.train_sample_every,
            val_every:   self.val_sample_every,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.epochs > 0, "epochs must be at least 1");
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.keep_top_k > 0, "keep_top_k must be at least 1");
        ensure!(self.base_channels > 0, "base_channels must be at least 1");
        ensure!(
            self.depth <= MAX_DEPTH,
            "depth must be at most {}, got {}",
            MAX_DEPTH,
            self.depth
        );
        ensure!(
            self.lr.is_finite() && self.lr > 0.0,
            "learning rate must be a positive number, got {}",
            self.lr
        );
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config:  TrainConfig,
    backend: ComputeBackend,
    stop:    Arc<AtomicBool>,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig, backend: ComputeBackend) -> Self {
        Self {
            config,
            backend,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting this flag ends training at the next batch boundary.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Load slices ───────────────────────────────────────────────
        tracing::info!("Loading slices from '{}'", cfg.data_dir);
        let train_samples = SliceDirLoader::for_split(&cfg.data_dir, "train").load_all()?;
        let val_samples   = SliceDirLoader::for_split(&cfg.data_dir, "val").load_all()?;
        ensure!(!train_samples.is_empty(), "No training slices under '{}'", cfg.data_dir);
        ensure!(!val_samples.is_empty(), "No validation slices under '{}'", cfg.data_dir);
        let background_only = train_samples.iter().filter(|s| s.foreground() == 0).count();
        tracing::info!(
            "{} of {} training slices have an empty mask",
            background_only,
            train_samples.len()
        );

        // ── Step 3: Slice size must fit the U-Net depth ───────────────────────
        let model_cfg = cfg.model_config();
        for sample in train_samples.first().into_iter().chain(val_samples.first()) {
            let (w, h) = sample.dims();
            model_cfg.check_input(w, h)?;
        }

        // ── Step 4: Build datasets ────────────────────────────────────────────
        // Only the training split is augmented.
        let train_dataset = if cfg.augment {
            SliceDataset::with_augmenter(train_samples, Augmenter::new(AugmentConfig::default()))
        } else {
            SliceDataset::new(train_samples)
        };
        let val_dataset = SliceDataset::new(val_samples);
        tracing::info!(
            "Slices are {:?} (w, h); training augmentation {}",
            train_dataset.slice_dims(),
            if train_dataset.is_augmented() { "on" } else { "off" }
        );

        // ── Step 5: Checkpoint store + config for inference ───────────────────
        // A store with a committed manifest belongs to an earlier run.
        let store = CheckpointStore::new(&cfg.checkpoint_dir)?;
        store.ensure_unclaimed()?;
        store.save_config(cfg)?;

        // ── Step 6: Metric log ────────────────────────────────────────────────
        let mut sink = FileMetricSink::new(&cfg.log_dir)?;
        tracing::info!(
            "Checkpoints → '{}', metrics → '{}', samples → '{}'",
            store.dir().display(),
            sink.csv_path().display(),
            sink.samples_dir().display()
        );

        // ── Step 7: Epoch driver on the chosen backend ────────────────────────
        let stop = self.stop_flag();
        match self.backend {
            ComputeBackend::Wgpu => run_training::<Autodiff<Wgpu>, _>(
                cfg, train_dataset, val_dataset, &store, &mut sink, stop,
            ),
            ComputeBackend::NdArray => run_training::<Autodiff<NdArray>, _>(
                cfg, train_dataset, val_dataset, &store, &mut sink, stop,
            ),
        }
    }
}

// ============================================================
// Layer 5 - Epoch Driver
// ============================================================
// Runs E epochs of: train pass → validation pass → checkpoint.
//
//   for epoch in 1..=E
//       for batch in train_loader   run_step(Train)   (shuffled)
//       for batch in val_loader     run_step(Eval)    (in order)
//       val = sample-weighted mean of the validation Dice losses
//       if policy.would_admit(val)
//           save weights → policy.offer → store.commit
//
// A stop flag is checked before every batch. Once it is set the
// running epoch is dropped: no checkpoint, no manifest change.
//
// Key Burn insight:
//   - Training uses B (Autodiff<...>) for gradients
//   - Both loaders produce batches on B::InnerBackend; run_step
//     lifts training batches onto the graph itself
//   - Weights are saved from model.valid(), so inference can load
//     them on a plain backend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{ensure, Result};
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::SliceBatcher, dataset::SliceDataset};
use crate::domain::checkpoint::{CheckpointRecord, TopKCheckpoints, MONITOR};
use crate::domain::traits::MetricSink;
use crate::infra::checkpoint::CheckpointStore;
use crate::ml::model::UNet;
use crate::ml::step::{run_step, StepContext, StepMode, TrainState};

/// Epoch-level scalar channels, logged once per completed epoch.
pub const TRAIN_EPOCH_CHANNEL: &str = "Train Dice Epoch";
pub const VAL_EPOCH_CHANNEL:   &str = "Val Dice Epoch";

/// Number of batches one pass over `len` samples produces.
pub fn steps_per_epoch(len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    len.div_ceil(batch_size)
}

/// What a training run left behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    pub epochs_completed: usize,

    /// The stop flag ended the run before all epochs finished
    pub interrupted: bool,

    pub global_step: u64,

    /// Retained checkpoints, best first
    pub checkpoints: Vec<CheckpointRecord>,
}

impl TrainingSummary {
    pub fn best(&self) -> Option<&CheckpointRecord> {
        self.checkpoints.first()
    }
}

/// Drives a full training run for one configuration.
pub struct Trainer<'a, B: AutodiffBackend, S: MetricSink + ?Sized> {
    cfg:    &'a TrainConfig,
    device: B::Device,
    store:  &'a CheckpointStore,
    sink:   &'a mut S,
    stop:   Arc<AtomicBool>,
}

impl<'a, B: AutodiffBackend, S: MetricSink + ?Sized> Trainer<'a, B, S> {
    pub fn new(
        cfg:    &'a TrainConfig,
        device: B::Device,
        store:  &'a CheckpointStore,
        sink:   &'a mut S,
    ) -> Self {
        Self {
            cfg,
            device,
            store,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a stop flag with whoever may want to end the run early.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn fit(self, train: SliceDataset, val: SliceDataset) -> Result<TrainingSummary> {
        let Trainer { cfg, device, store, sink, stop } = self;
        ensure!(train.len() > 0, "Training split is empty");
        ensure!(val.len() > 0, "Validation split is empty");

        // ── Build model ───────────────────────────────────────────────────────
        let model_cfg = cfg.model_config();
        let mut model: UNet<B> = model_cfg.init(&device);
        tracing::info!(
            "U-Net ready: depth={}, base_channels={}",
            model_cfg.depth, model_cfg.base_channels
        );

        // ── Adam optimiser ────────────────────────────────────────────────────
        // m = β1*m + (1-β1)*g        (mean)
        // v = β2*v + (1-β2)*g²       (variance)
        // θ = θ - lr * m / (√v + ε)  (update)
        let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

        // ── Data loaders (InnerBackend; run_step lifts training batches) ─────
        // Single-threaded: each pass yields ceil(len / batch_size) batches,
        // validation always in dataset order.
        let (train_len, val_len) = (train.len(), val.len());
        let train_loader = DataLoaderBuilder::new(SliceBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .build(train);
        let val_loader = DataLoaderBuilder::new(SliceBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(cfg.batch_size)
            .build(val);

        tracing::info!(
            "{} train slices ({} steps/epoch), {} validation slices",
            train_len,
            steps_per_epoch(train_len, cfg.batch_size),
            val_len
        );

        // ── Epoch loop ────────────────────────────────────────────────────────
        let mut state   = TrainState::default();
        let mut policy  = TopKCheckpoints::new(cfg.keep_top_k);
        let mut summary = TrainingSummary::default();
        let mut ctx = StepContext { state: &mut state, sink, cadence: cfg.cadence() };
        let stop_requested = || stop.load(Ordering::Relaxed);

        'epochs: for epoch in 1..=cfg.epochs {
            ctx.state.epoch = epoch;

            // ── Training phase ────────────────────────────────────────────────
            let mut train_sum = 0.0f64;
            let mut train_n   = 0usize;
            for (batch_idx, batch) in train_loader.iter().enumerate() {
                if stop_requested() {
                    summary.interrupted = true;
                    break 'epochs;
                }
                let n = batch.len();
                let (next, loss) =
                    run_step::<B, _, _, _>(&mut ctx, StepMode::Train, model, &mut optim, cfg.lr, batch_idx, batch)?;
                model = next;
                train_sum += loss * n as f64;
                train_n   += n;
            }

            // ── Validation phase ──────────────────────────────────────────────
            let mut val_sum = 0.0f64;
            let mut val_n   = 0usize;
            for (batch_idx, batch) in val_loader.iter().enumerate() {
                if stop_requested() {
                    summary.interrupted = true;
                    break 'epochs;
                }
                let n = batch.len();
                let (next, loss) =
                    run_step::<B, _, _, _>(&mut ctx, StepMode::Eval, model, &mut optim, cfg.lr, batch_idx, batch)?;
                model = next;
                val_sum += loss * n as f64;
                val_n   += n;
            }

            let train_mean = mean(train_sum, train_n);
            let val_mean   = mean(val_sum, val_n);
            let step = ctx.state.global_step;
            for (channel, value) in [(TRAIN_EPOCH_CHANNEL, train_mean), (VAL_EPOCH_CHANNEL, val_mean)] {
                if let Err(e) = ctx.sink.log_scalar(channel, value, step) {
                    tracing::warn!("Could not log '{}' at step {}: {e:#}", channel, step);
                }
            }

            // ── Checkpoint ────────────────────────────────────────────────────
            if policy.would_admit(val_mean) {
                let file = store.save_model::<B::InnerBackend, _>(&model.valid(), epoch)?;
                let admission = policy.offer(CheckpointRecord::new(epoch, val_mean, file));
                store.commit(&policy, &admission)?;
                tracing::info!(
                    "Checkpoint kept for epoch {} ({} = {:.4}); {}/{} retained",
                    epoch, MONITOR, val_mean, policy.len(), policy.capacity()
                );
            }

            summary.epochs_completed = epoch;

            let (best_epoch, best_metric) = policy
                .best()
                .map_or((0, f64::NAN), |r| (r.epoch, r.metric));
            println!(
                "Epoch {:>3}/{} | train_dice_loss={:.4} | val_dice_loss={:.4} | best={:.4} (epoch {})",
                epoch, cfg.epochs, train_mean, val_mean, best_metric, best_epoch,
            );
        }

        if policy.is_empty() {
            tracing::warn!("No checkpoint was kept for this run");
        }
        if summary.interrupted {
            tracing::warn!(
                "Training stopped during epoch {}; keeping checkpoints up to epoch {}",
                ctx.state.epoch, summary.epochs_completed
            );
        } else {
            tracing::info!("Training complete!");
        }

        summary.global_step = ctx.state.global_step;
        summary.checkpoints = policy.records().to_vec();
        Ok(summary)
    }
}

/// Build the device and run training on backend `B`.
pub fn run_training<B: AutodiffBackend, S: MetricSink + ?Sized>(
    cfg:   &TrainConfig,
    train: SliceDataset,
    val:   SliceDataset,
    store: &CheckpointStore,
    sink:  &mut S,
    stop:  Arc<AtomicBool>,
) -> Result<TrainingSummary> {
    let device = B::Device::default();
    tracing::info!("Using device: {:?}", device);
    Trainer::<B, S>::new(cfg, device, store, sink)
        .with_stop_flag(stop)
        .fit(train, val)
}

fn mean(sum: f64, n: usize) -> f64 {
    if n > 0 { sum / n as f64 } else { f64::NAN }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::slice::{SliceImage, SliceSample};
    use crate::infra::metrics::MemorySink;
    use burn::backend::{Autodiff, NdArray};
    use image::RgbImage;

    type TestBackend = Autodiff<NdArray<f32>>;

    const SIDE: u32 = 8;

    fn samples(n: usize, offset: usize) -> Vec<SliceSample> {
        (0..n)
            .map(|k| {
                let area = (SIDE * SIDE) as usize;
                let pixels = (0..area).map(|i| ((i + k + offset) % 5) as f32 / 4.0).collect();
                let mask = (0..area).map(|i| u8::from((i / SIDE as usize) < 3)).collect();
                SliceSample::new(SliceImage::new(k.to_string(), SIDE, SIDE, pixels), mask)
            })
            .collect()
    }

    fn tiny_config(epochs: usize, keep_top_k: usize) -> TrainConfig {
        TrainConfig {
            epochs,
            keep_top_k,
            batch_size: 2,
            base_channels: 2,
            depth: 1,
            train_sample_every: 0,
            val_sample_every: 0,
            augment: false,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_steps_per_epoch_rounds_up() {
        assert_eq!(steps_per_epoch(5, 2), 3);
        assert_eq!(steps_per_epoch(4, 2), 2);
        assert_eq!(steps_per_epoch(0, 8), 0);
        assert_eq!(steps_per_epoch(1, 8), 1);
    }

    #[test]
    fn test_fit_logs_every_batch_and_bounds_checkpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        let cfg = tiny_config(2, 1);
        let mut sink = MemorySink::default();

        let summary = Trainer::<TestBackend, _>::new(&cfg, Default::default(), &store, &mut sink)
            .fit(SliceDataset::new(samples(5, 0)), SliceDataset::new(samples(3, 1)))
            .unwrap();

        assert_eq!(summary.epochs_completed, 2);
        assert!(!summary.interrupted);
        assert_eq!(summary.global_step, 6);

        let train = sink.scalars_named("Train Dice");
        assert_eq!(train.len(), 6);
        assert_eq!(train.iter().map(|(_, s)| *s).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);

        // 3 validation slices at batch size 2 → 2 batches per epoch
        let val = sink.scalars_named("Val Dice");
        assert_eq!(val.iter().map(|(_, s)| *s).collect::<Vec<_>>(), vec![3, 3, 6, 6]);
        assert_eq!(sink.scalars_named(VAL_EPOCH_CHANNEL).len(), 2);
        assert!(sink.images.is_empty());

        assert_eq!(summary.checkpoints.len(), 1);
        let retained = store.retained().unwrap();
        assert_eq!(retained.len(), 1);
        let best = summary.best().unwrap();
        assert_eq!(retained[0].file, best.file);
        assert!((retained[0].metric - best.metric).abs() < 1e-12);
        assert!(tmp.path().join(&best.file).is_file());
    }

    #[test]
    fn test_val_epoch_metric_is_sample_weighted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        let cfg = tiny_config(1, 1);
        let mut sink = MemorySink::default();

        Trainer::<TestBackend, _>::new(&cfg, Default::default(), &store, &mut sink)
            .fit(SliceDataset::new(samples(2, 0)), SliceDataset::new(samples(3, 1)))
            .unwrap();

        let batches = sink.scalars_named("Val Dice");
        let expected = (batches[0].0 * 2.0 + batches[1].0 * 1.0) / 3.0;
        let (epoch_val, _) = sink.scalars_named(VAL_EPOCH_CHANNEL)[0];
        assert!((epoch_val - expected).abs() < 1e-9);
        assert!((store.best_record().unwrap().metric - epoch_val).abs() < 1e-12);
    }

    #[test]
    fn test_stop_flag_abandons_epoch_without_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        let cfg = tiny_config(3, 2);
        let mut sink = MemorySink::default();

        let summary = Trainer::<TestBackend, _>::new(&cfg, Default::default(), &store, &mut sink)
            .with_stop_flag(Arc::new(AtomicBool::new(true)))
            .fit(SliceDataset::new(samples(4, 0)), SliceDataset::new(samples(2, 1)))
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.epochs_completed, 0);
        assert_eq!(summary.global_step, 0);
        assert!(summary.checkpoints.is_empty());
        assert!(sink.scalars.is_empty());
        assert!(store.load_manifest().is_err());
    }

    #[test]
    fn test_each_pass_runs_ceil_batches_in_fixed_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        let cfg = TrainConfig { batch_size: 8, ..tiny_config(2, 1) };
        let mut sink = MemorySink::default();

        let summary = Trainer::<TestBackend, _>::new(&cfg, Default::default(), &store, &mut sink)
            .fit(SliceDataset::new(samples(10, 0)), SliceDataset::new(samples(10, 1)))
            .unwrap();

        // 10 slices at batch size 8 → 2 batches per pass
        assert_eq!(steps_per_epoch(10, 8), 2);
        assert_eq!(summary.global_step, 4);
        let train_steps: Vec<u64> = sink.scalars_named("Train Dice").iter().map(|(_, s)| *s).collect();
        assert_eq!(train_steps, vec![0, 1, 2, 3]);
        let val_steps: Vec<u64> = sink.scalars_named("Val Dice").iter().map(|(_, s)| *s).collect();
        assert_eq!(val_steps, vec![2, 2, 4, 4]);
    }

    /// Forwards to a MemorySink and raises the stop flag once it has
    /// seen `stop_after` scalars.
    struct StopAfter {
        inner:      MemorySink,
        stop_after: usize,
        stop:       Arc<AtomicBool>,
    }

    impl MetricSink for StopAfter {
        fn log_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<()> {
            self.inner.log_scalar(name, value, step)?;
            if self.inner.scalars.len() >= self.stop_after {
                self.stop.store(true, Ordering::Relaxed);
            }
            Ok(())
        }

        fn log_image(&mut self, name: &str, image: &RgbImage, step: u64) -> Result<()> {
            self.inner.log_image(name, image, step)
        }
    }

    #[test]
    fn test_stop_mid_epoch_keeps_last_committed_state() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        let cfg = tiny_config(3, 2);
        let stop = Arc::new(AtomicBool::new(false));

        // Epoch 1 logs 2 train + 1 val + 2 epoch scalars; the 6th is the
        // first train step of epoch 2.
        let mut sink = StopAfter { inner: MemorySink::default(), stop_after: 6, stop: Arc::clone(&stop) };

        let summary = Trainer::<TestBackend, _>::new(&cfg, Default::default(), &store, &mut sink)
            .with_stop_flag(stop)
            .fit(SliceDataset::new(samples(4, 0)), SliceDataset::new(samples(2, 1)))
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.epochs_completed, 1);
        assert_eq!(summary.global_step, 3);
        assert_eq!(sink.inner.scalars_named(VAL_EPOCH_CHANNEL).len(), 1);

        let retained = store.retained().unwrap();
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].epoch, 1);
        assert!(retained[0].file.starts_with("epoch_001."));
        assert_eq!(summary.checkpoints.len(), 1);
        assert_eq!(summary.checkpoints[0].file, retained[0].file);

        let weights: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("epoch_"))
            .collect();
        assert_eq!(weights, vec![retained[0].file.clone()]);
    }

    #[test]
    fn test_empty_split_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path()).unwrap();
        let cfg = tiny_config(1, 1);
        let mut sink = MemorySink::default();

        let result = Trainer::<TestBackend, _>::new(&cfg, Default::default(), &store, &mut sink)
            .fit(SliceDataset::new(samples(2, 0)), SliceDataset::new(Vec::new()));
        assert!(result.is_err());
    }
}

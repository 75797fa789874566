// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `predict`, `evaluate`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, enums, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::{train_use_case::TrainConfig, ComputeBackend};

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the U-Net on preprocessed slice PNGs
    Train(TrainArgs),

    /// Segment a volume with a trained checkpoint
    Predict(PredictArgs),

    /// Score a trained checkpoint on a labelled split
    Evaluate(EvaluateArgs),
}

/// Which Burn backend to run on
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendArg {
    #[default]
    Wgpu,
    Ndarray,
}

/// The application layer never sees clap types.
impl From<BackendArg> for ComputeBackend {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu    => ComputeBackend::Wgpu,
            BackendArg::Ndarray => ComputeBackend::NdArray,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Root holding `train/` and `val/`, each with `images/` and `masks/`
    #[arg(long, default_value = "data/slices")]
    pub data_dir: String,

    /// Directory for retained checkpoints and the saved config
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Directory for metrics.csv and sample images
    #[arg(long, default_value = "logs")]
    pub log_dir: String,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 75)]
    pub epochs: usize,

    /// Slices per batch
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Adam learning rate, fixed for the whole run
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// How many of the best checkpoints (lowest validation Dice loss) to keep
    #[arg(long, default_value_t = 10)]
    pub keep_top_k: usize,

    /// Channels of the first U-Net level; doubled at each level below
    #[arg(long, default_value_t = 64)]
    pub base_channels: usize,

    /// Number of down-sampling steps. Slice sides must be divisible by 2^depth
    #[arg(long, default_value_t = 4)]
    pub depth: usize,

    /// Seed for the per-epoch shuffle
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Emit a training sample image every N batches (0 = never)
    #[arg(long, default_value_t = 50)]
    pub train_sample_every: usize,

    /// Emit a validation sample image every N batches (0 = never)
    #[arg(long, default_value_t = 2)]
    pub val_sample_every: usize,

    /// Disable random affine / elastic augmentation of training slices
    #[arg(long)]
    pub no_augment: bool,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:           a.data_dir,
            checkpoint_dir:     a.checkpoint_dir,
            log_dir:            a.log_dir,
            epochs:             a.epochs,
            batch_size:         a.batch_size,
            lr:                 a.lr,
            keep_top_k:         a.keep_top_k,
            base_channels:      a.base_channels,
            depth:              a.depth,
            seed:               a.seed,
            train_sample_every: a.train_sample_every,
            val_sample_every:   a.val_sample_every,
            augment:            !a.no_augment,
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Directory of slice PNGs making up one preprocessed volume
    #[arg(long)]
    pub input: PathBuf,

    /// Where `masks/` and `overlays/` are written
    #[arg(long, default_value = "predictions")]
    pub output: PathBuf,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Checkpoint file to use instead of the best retained one
    #[arg(long)]
    pub checkpoint: Option<String>,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Root holding the split directory
    #[arg(long, default_value = "data/slices")]
    pub data_dir: String,

    /// Split to score
    #[arg(long, default_value = "val")]
    pub split: String,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Checkpoint file to use instead of the best retained one
    #[arg(long)]
    pub checkpoint: Option<String>,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

// ============================================================
// Layer 6 - Checkpoint Store
// ============================================================
// Persists the retained checkpoints chosen by TopKCheckpoints.
//
// What lives in the store directory:
//   checkpoints/
//     epoch_003.mpk         ← weights after epoch 3 (CompactRecorder)
//     epoch_007.mpk
//     checkpoints.json      ← retained records, best first
//     train_config.json     ← hyperparameters to rebuild the model
//
// Write order for a new checkpoint:
//   1. weights  → epoch_NNN_partial.<ext>, renamed to epoch_NNN.<ext>
//   2. manifest → checkpoints.json.tmp, renamed to checkpoints.json
//   3. evicted weights removed
// A crash between any two steps leaves the manifest pointing only at
// complete files. An orphaned weights file may be left behind; it is
// never listed. A file the committed manifest lists is never written
// over, and a directory that already holds a manifest is not reused
// for a new run.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{bail, ensure, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, FileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::checkpoint::{Admission, CheckpointRecord, TopKCheckpoints, MONITOR};

const MANIFEST_FILE: &str = "checkpoints.json";
const CONFIG_FILE:   &str = "train_config.json";

/// On-disk mirror of the retained checkpoint list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metric channel the records are ranked on
    pub monitor: String,

    /// Always "min": lower metric is better
    pub mode: String,

    pub capacity: usize,

    /// Best first
    pub records: Vec<CheckpointRecord>,
}

impl Manifest {
    fn from_policy(policy: &TopKCheckpoints) -> Self {
        Self {
            monitor:  MONITOR.to_string(),
            mode:     "min".to_string(),
            capacity: policy.capacity(),
            records:  policy.records().to_vec(),
        }
    }
}

/// Owns a checkpoint directory.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open (and create if needed) a checkpoint directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fail if an earlier run already committed checkpoints here.
    pub fn ensure_unclaimed(&self) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        ensure!(
            !path.exists(),
            "'{}' already holds checkpoints from an earlier run ({}). \
             Choose a fresh --checkpoint-dir.",
            self.dir.display(),
            path.display()
        );
        Ok(())
    }

    /// Whether the committed manifest lists `file`. No manifest means
    /// nothing is listed; an unreadable one is an error.
    fn is_listed(&self, file: &str) -> Result<bool> {
        if !self.dir.join(MANIFEST_FILE).exists() {
            return Ok(false);
        }
        Ok(self.retained()?.iter().any(|r| r.file == file))
    }

    /// Write model weights for `epoch` and return the file name
    /// (relative to the store) that a `CheckpointRecord` should carry.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M, epoch: usize) -> Result<String> {
        let stem = format!("epoch_{epoch:03}");
        let ext  = <CompactRecorder as FileRecorder<B>>::file_extension();
        let file = format!("{stem}.{ext}");
        ensure!(
            !self.is_listed(&file)?,
            "Refusing to overwrite retained checkpoint '{}'",
            self.dir.join(&file).display()
        );

        // The recorder appends its own extension to the stem.
        let partial_stem = self.dir.join(format!("{stem}_partial"));
        <CompactRecorder as Recorder<B>>::record(
            &CompactRecorder::new(),
            model.clone().into_record(),
            partial_stem.clone(),
        )
        .with_context(|| format!("Failed to save checkpoint to '{}'", partial_stem.display()))?;

        let target = self.dir.join(&file);
        fs::rename(partial_stem.with_extension(ext), &target)
            .with_context(|| format!("Cannot move checkpoint into '{}'", target.display()))?;

        tracing::debug!("Saved weights for epoch {} to '{}'", epoch, target.display());
        Ok(file)
    }

    /// Persist the policy's current state and delete whatever the
    /// admission pushed out.
    pub fn commit(&self, policy: &TopKCheckpoints, admission: &Admission) -> Result<()> {
        self.write_manifest(&Manifest::from_policy(policy))?;

        let stale = match admission {
            Admission::Retained { evicted } => evicted.as_ref(),
            Admission::Rejected(candidate) => Some(candidate),
        };
        if let Some(record) = stale {
            self.remove_weights(&record.file)?;
            tracing::info!(
                "Dropped checkpoint for epoch {} ({} = {:.4})",
                record.epoch, MONITOR, record.metric
            );
        }
        Ok(())
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let tmp  = self.dir.join(format!("{MANIFEST_FILE}.tmp"));

        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(&tmp, json).with_context(|| format!("Cannot write '{}'", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Cannot replace '{}'", path.display()))?;
        Ok(())
    }

    fn remove_weights(&self, file: &str) -> Result<()> {
        let path = self.dir.join(file);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Checkpoint '{}' was already gone", path.display());
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Cannot remove '{}'", path.display())),
        }
    }

    /// Read `checkpoints.json`.
    pub fn load_manifest(&self) -> Result<Manifest> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read '{}'. Have you run 'train' first?",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Corrupt checkpoint manifest '{}'", path.display()))
    }

    /// Retained records, best first.
    pub fn retained(&self) -> Result<Vec<CheckpointRecord>> {
        Ok(self.load_manifest()?.records)
    }

    pub fn best_record(&self) -> Result<CheckpointRecord> {
        match self.retained()?.into_iter().next() {
            Some(record) => Ok(record),
            None => bail!("No checkpoints recorded in '{}'", self.dir.display()),
        }
    }

    /// Restore weights from `file` into `model`.
    ///
    /// A missing or unreadable file is an error; no other checkpoint
    /// is tried in its place.
    pub fn load_model<B: Backend, M: Module<B>>(
        &self,
        model:  M,
        file:   &str,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.dir.join(file);
        ensure!(path.is_file(), "Checkpoint '{}' does not exist", path.display());

        let record = <CompactRecorder as Recorder<B>>::load(
            &CompactRecorder::new(),
            path.with_extension(""),
            device,
        )
        .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

        Ok(model.load_record(record))
    }

    /// Restore the best retained checkpoint.
    pub fn load_best<B: Backend, M: Module<B>>(
        &self,
        model:  M,
        device: &B::Device,
    ) -> Result<(M, CheckpointRecord)> {
        let best  = self.best_record()?;
        let model = self.load_model::<B, M>(model, &best.file, device)?;
        tracing::info!("Loaded checkpoint from epoch {} ({} = {:.4})", best.epoch, MONITOR, best.metric);
        Ok((model, best))
    }

    /// Save the training configuration so inference can rebuild the model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. \
                 Make sure you have run 'train' before 'predict' or 'evaluate'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

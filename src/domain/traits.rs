// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// Narrow seams between the training core and its collaborators.
//
//   - SliceDirLoader implements SliceSource
//   - FileMetricSink implements MetricSink
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use image::RgbImage;

use crate::domain::slice::SliceSample;

// ─── SliceSource ──────────────────────────────────────────────────────────────
/// Any component that can produce labelled slices.
pub trait SliceSource {
    /// Load every (image, mask) pair this source knows about,
    /// in a stable order.
    fn load_all(&self) -> Result<Vec<SliceSample>>;
}

// ─── MetricSink ───────────────────────────────────────────────────────────────
/// Append-only destination for training metrics and visual samples.
///
/// Callers treat failures as best-effort: a sink error is reported
/// and training carries on.
pub trait MetricSink {
    /// Record a scalar under `name` at `step`.
    fn log_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<()>;

    /// Record an image artifact under `name` at `step`.
    fn log_image(&mut self, name: &str, image: &RgbImage, step: u64) -> Result<()>;
}

// ============================================================
// Layer 6 - Metrics Log
// ============================================================
// Append-only record of training metrics and visual samples.
//
// Output layout:
//   logs/
//     metrics.csv                    ← one row per logged scalar
//     samples/train_sample_0000050.png
//     samples/val_sample_0000050.png
//
// Example CSV output:
//   name,step,value
//   Train Dice,0,0.981234
//   Train Dice,1,0.975120
//   Val Dice,3,0.950001
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use image::RgbImage;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use crate::domain::traits::MetricSink;

/// Writes scalars to `metrics.csv` and images to `samples/`.
pub struct FileMetricSink {
    csv_path:    PathBuf,
    samples_dir: PathBuf,
}

impl FileMetricSink {
    /// Create the log directory. Writes the CSV header only if the
    /// file is new, so repeated runs append to the same log.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let samples_dir = dir.join("samples");
        fs::create_dir_all(&samples_dir)
            .with_context(|| format!("Cannot create log directory '{}'", samples_dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "name,step,value")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, samples_dir })
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }

    pub fn samples_dir(&self) -> &PathBuf {
        &self.samples_dir
    }
}

impl MetricSink for FileMetricSink {
    fn log_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{},{},{:.6}", name, step, value)?;
        Ok(())
    }

    fn log_image(&mut self, name: &str, image: &RgbImage, step: u64) -> Result<()> {
        let path = self
            .samples_dir
            .join(format!("{}_{:07}.png", file_slug(name), step));
        image
            .save(&path)
            .with_context(|| format!("Cannot write sample '{}'", path.display()))?;
        tracing::debug!("Wrote sample '{}'", path.display());
        Ok(())
    }
}

/// "Train Sample" → "train_sample"
fn file_slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// In-memory sink for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub scalars: Vec<(String, f64, u64)>,
    pub images:  Vec<(String, u64, (u32, u32))>,
}

#[cfg(test)]
impl MemorySink {
    pub fn scalars_named(&self, name: &str) -> Vec<(f64, u64)> {
        self.scalars
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, v, s)| (*v, *s))
            .collect()
    }
}

#[cfg(test)]
impl MetricSink for MemorySink {
    fn log_scalar(&mut self, name: &str, value: f64, step: u64) -> Result<()> {
        self.scalars.push((name.to_string(), value, step));
        Ok(())
    }

    fn log_image(&mut self, name: &str, image: &RgbImage, step: u64) -> Result<()> {
        self.images.push((name.to_string(), step, image.dimensions()));
        Ok(())
    }
}

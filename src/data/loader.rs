// ============================================================
// Layer 4 - Slice Loader
// ============================================================
// Loads preprocessed MRI slices from grayscale PNG files.
//
// Expected layout for one split (e.g. `train` or `val`):
//
//   <root>/<split>/
//     images/0.png, 1.png, ...   <- normalised intensity slices
//     masks/0.png,  1.png, ...   <- matching label slices
//
// Image pixels are scaled to [0, 1]. Any non-zero mask pixel is
// foreground. Files are ordered by their numeric stem when they
// have one, so slices come back in volume order.
//
// Reference: image crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::slice::{SliceImage, SliceSample};
use crate::domain::traits::SliceSource;

/// Loads all (image, mask) pairs of one split directory.
/// Implements the SliceSource trait from Layer 3.
pub struct SliceDirLoader {
    /// Directory that holds `images/` and `masks/`
    dir: PathBuf,
}

impl SliceDirLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Convenience for `<root>/<split>`.
    pub fn for_split(root: impl AsRef<Path>, split: &str) -> Self {
        Self::new(root.as_ref().join(split))
    }
}

impl SliceSource for SliceDirLoader {
    fn load_all(&self) -> Result<Vec<SliceSample>> {
        let images_dir = self.dir.join("images");
        let masks_dir  = self.dir.join("masks");

        let mut samples = Vec::new();
        for image_path in list_pngs(&images_dir)? {
            let file_name = image_path
                .file_name()
                .context("slice path has no file name")?;
            let mask_path = masks_dir.join(file_name);
            if !mask_path.exists() {
                bail!(
                    "mask '{}' missing for slice '{}'",
                    mask_path.display(),
                    image_path.display()
                );
            }

            let image = load_slice_image(&image_path)?;
            let (mask_w, mask_h, mask) = load_mask(&mask_path)?;
            if (mask_w, mask_h) != (image.width, image.height) {
                bail!(
                    "slice '{}' is {}x{} but its mask is {}x{}",
                    image.name, image.width, image.height, mask_w, mask_h
                );
            }
            samples.push(SliceSample::new(image, mask));
        }

        check_uniform_size(&samples)?;
        tracing::info!("Loaded {} slices from '{}'", samples.len(), self.dir.display());
        Ok(samples)
    }
}

/// Load every PNG slice in a directory (a preprocessed volume) in volume order.
pub fn load_volume(dir: &Path) -> Result<Vec<SliceImage>> {
    let slices = list_pngs(dir)?
        .iter()
        .map(|p| load_slice_image(p))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!("Loaded volume of {} slices from '{}'", slices.len(), dir.display());
    Ok(slices)
}

/// Decode one grayscale slice, scaling 8-bit intensities into [0, 1].
pub fn load_slice_image(path: &Path) -> Result<SliceImage> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode slice '{}'", path.display()))?
        .to_luma8();
    let (width, height) = img.dimensions();
    let pixels = img.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();
    Ok(SliceImage::new(slice_name(path), width, height, pixels))
}

/// Write a binary mask as an 8-bit PNG (foreground = 255).
pub fn save_mask(path: &Path, mask: &[u8], width: u32, height: u32) -> Result<()> {
    let pixels = mask.iter().map(|&m| if m != 0 { 255 } else { 0 }).collect();
    let img = image::GrayImage::from_raw(width, height, pixels)
        .with_context(|| format!("Mask for '{}' does not fit {}x{}", path.display(), width, height))?;
    img.save(path)
        .with_context(|| format!("Cannot write mask '{}'", path.display()))?;
    Ok(())
}

fn load_mask(path: &Path) -> Result<(u32, u32, Vec<u8>)> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode mask '{}'", path.display()))?
        .to_luma8();
    let (width, height) = img.dimensions();
    let mask = img.into_raw().into_iter().map(|v| u8::from(v != 0)).collect();
    Ok((width, height, mask))
}

fn list_pngs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
        .collect();
    paths.sort_by_key(|p| sort_key(&slice_name(p)));
    Ok(paths)
}

fn slice_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Numeric stems first, in numeric order, then everything else by name.
fn sort_key(name: &str) -> (u8, u64, String) {
    match name.parse::<u64>() {
        Ok(n) => (0, n, String::new()),
        Err(_) => (1, 0, name.to_string()),
    }
}

fn check_uniform_size(samples: &[SliceSample]) -> Result<()> {
    if let Some(first) = samples.first() {
        if let Some(odd) = samples.iter().find(|s| s.dims() != first.dims()) {
            bail!(
                "slice '{}' is {:?} but '{}' is {:?}; all slices of a split must share one size",
                odd.name(),
                odd.dims(),
                first.name(),
                first.dims()
            );
        }
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_gray(path: &Path, w: u32, h: u32, f: impl Fn(u32, u32) -> u8) {
        GrayImage::from_fn(w, h, |x, y| Luma([f(x, y)])).save(path).unwrap();
    }

    fn make_split(root: &Path, names: &[&str], w: u32, h: u32) {
        fs::create_dir_all(root.join("images")).unwrap();
        fs::create_dir_all(root.join("masks")).unwrap();
        for name in names {
            write_gray(&root.join("images").join(format!("{name}.png")), w, h, |x, _| (x * 50) as u8);
            write_gray(&root.join("masks").join(format!("{name}.png")), w, h, |x, _| if x == 0 { 255 } else { 0 });
        }
    }

    #[test]
    fn test_loads_pairs_in_numeric_order() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["10", "2", "1"], 4, 4);

        let samples = SliceDirLoader::new(tmp.path()).load_all().unwrap();
        let names: Vec<&str> = samples.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["1", "2", "10"]);

        let first = &samples[0];
        assert_eq!(first.dims(), (4, 4));
        assert!((first.image.pixels[1] - 50.0 / 255.0).abs() < 1e-6);
        // Column 0 is foreground in every row.
        assert_eq!(first.foreground(), 4);
        assert!(first.mask.iter().all(|&m| m <= 1));
    }

    #[test]
    fn test_missing_mask_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["0"], 2, 2);
        write_gray(&tmp.path().join("images").join("1.png"), 2, 2, |_, _| 0);

        let err = SliceDirLoader::new(tmp.path()).load_all().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_mixed_slice_sizes_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        make_split(tmp.path(), &["0"], 2, 2);
        make_split(tmp.path(), &["1"], 4, 4);
        assert!(SliceDirLoader::new(tmp.path()).load_all().is_err());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(SliceDirLoader::for_split(tmp.path(), "val").load_all().is_err());
    }

    #[test]
    fn test_load_volume_reads_images_only() {
        let tmp = tempfile::tempdir().unwrap();
        write_gray(&tmp.path().join("0.png"), 3, 2, |_, _| 255);
        write_gray(&tmp.path().join("1.png"), 3, 2, |_, _| 0);
        let slices = load_volume(tmp.path()).unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!((slices[0].width, slices[0].height), (3, 2));
        assert!(slices[0].pixels.iter().all(|&p| (p - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_saved_mask_reads_back_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("m.png");
        save_mask(&path, &[1, 0, 0, 1, 1, 0], 3, 2).unwrap();
        assert_eq!(load_mask(&path).unwrap(), (3, 2, vec![1, 0, 0, 1, 1, 0]));
        assert!(save_mask(&path, &[1, 0], 3, 2).is_err());
    }
}

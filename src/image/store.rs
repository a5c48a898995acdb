use super::ImageStore;
use crate::error::ImageSaveError;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Local;
use image::ImageFormat;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Free space required in the output directory beyond the image itself.
pub const MIN_FREE_BYTES: u64 = 10 * 1024 * 1024;

/// Validate `image_data` and write it verbatim to a new file in `output_dir`.
///
/// The bytes land in a hidden temporary file first and are renamed into
/// place, so a failed save never leaves a partial image behind.
pub fn save_image(
    image_data: &[u8],
    output_dir: &Path,
) -> std::result::Result<PathBuf, ImageSaveError> {
    let format = image::guess_format(image_data)?;
    image::load_from_memory_with_format(image_data, format)?;

    fs::create_dir_all(output_dir).map_err(|source| ImageSaveError::CreateDir {
        path: output_dir.to_path_buf(),
        source,
    })?;
    check_disk_space(output_dir, MIN_FREE_BYTES + image_data.len() as u64)?;

    let path = output_dir.join(unique_filename(format));
    write_atomically(output_dir, &path, image_data).map_err(|source| ImageSaveError::Write {
        path: path.clone(),
        source,
    })?;

    tracing::info!("Successfully saved image to: {}", path.display());
    Ok(path)
}

/// Fail when `dir` has fewer than `required` bytes available. A failed query
/// is logged and treated as enough space.
pub fn check_disk_space(dir: &Path, required: u64) -> std::result::Result<(), ImageSaveError> {
    match fs4::available_space(dir) {
        Ok(available) if available < required => Err(ImageSaveError::InsufficientSpace {
            path: dir.to_path_buf(),
            available,
            required,
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!("Failed to check disk space for {}: {}", dir.display(), e);
            Ok(())
        }
    }
}

fn unique_filename(format: ImageFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    let extension = format.extensions_str().first().copied().unwrap_or("img");
    format!("generated_image_{}_{}.{}", timestamp, &suffix[..8], extension)
}

fn write_atomically(dir: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp: NamedTempFile = tempfile::Builder::new()
        .prefix(".generated_image_")
        .suffix(".part")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

pub struct DiskImageStore {
    output_dir: PathBuf,
}

impl DiskImageStore {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, image_data: &[u8]) -> Result<PathBuf> {
        tokio::task::spawn_blocking({
            let image_data = image_data.to_vec();
            let output_dir = self.output_dir.clone();
            move || save_image(&image_data, &output_dir)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Image save task join error: {}", e)))?
        .map_err(Error::from)
    }
}

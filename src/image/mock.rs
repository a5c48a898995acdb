use super::ImageStore;
use crate::error::ImageSaveError;
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory stand-in for [`super::DiskImageStore`].
#[derive(Clone)]
pub struct MockImageStore {
    save_count: Arc<Mutex<usize>>,
    base_path: PathBuf,
    should_fail: Arc<Mutex<bool>>,
}

impl MockImageStore {
    pub fn new() -> Self {
        Self {
            save_count: Arc::new(Mutex::new(0)),
            base_path: PathBuf::from("/tmp"),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Fail every save with an out-of-space write error.
    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_save_count(&self) -> usize {
        *self.save_count.lock().unwrap()
    }
}

impl Default for MockImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for MockImageStore {
    async fn save(&self, _image_data: &[u8]) -> Result<PathBuf> {
        *self.save_count.lock().unwrap() += 1;

        let path = self
            .base_path
            .join(format!("generated_image_{}.png", Uuid::new_v4().simple()));

        if *self.should_fail.lock().unwrap() {
            return Err(ImageSaveError::Write {
                path,
                source: std::io::Error::other("No space left on device"),
            }
            .into());
        }

        Ok(path)
    }
}

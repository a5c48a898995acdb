//! Image persistence
//!
//! Verifies that generated bytes decode as an image and writes them to a
//! uniquely named file in the output directory.

pub mod mock;
pub mod store;

pub use mock::MockImageStore;
pub use store::{save_image, DiskImageStore};

use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, image_data: &[u8]) -> Result<PathBuf>;
}

//! Remote image-generation backends
//!
//! A backend performs exactly one attempt per call and classifies its own
//! failures; retrying is the caller's job.

pub mod mock;
pub mod replicate;

pub use mock::MockImageBackend;
pub use replicate::ReplicateImageClient;

use crate::error::CallFailure;
use crate::models::GenerationRequest;
use async_trait::async_trait;

#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Run one generation attempt and return the raw image bytes.
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<u8>, CallFailure>;
}

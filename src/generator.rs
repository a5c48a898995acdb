//! Image generation client: prompt in, saved artifact out.

use crate::ai::{ImageBackend, ReplicateImageClient};
use crate::config::Config;
use crate::error::{ApiError, CallFailure};
use crate::image::{DiskImageStore, ImageStore};
use crate::models::{GenerationRequest, GenerationResult, RequestState};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::Result;
use tracing::{debug, error, info, warn};

/// Runs one request at a time through call, retry, and save.
pub struct ImageGenerator {
    backend: Box<dyn ImageBackend>,
    store: Box<dyn ImageStore>,
    sleeper: Box<dyn Sleeper>,
    policy: RetryPolicy,
    model: String,
}

/// Injectable service bundle used to construct [`ImageGenerator`] in tests/harnesses.
pub struct GeneratorServices {
    pub backend: Box<dyn ImageBackend>,
    pub store: Box<dyn ImageStore>,
    pub sleeper: Box<dyn Sleeper>,
}

impl ImageGenerator {
    pub fn with_services(
        services: GeneratorServices,
        policy: RetryPolicy,
        model: impl Into<String>,
    ) -> Self {
        Self {
            backend: services.backend,
            store: services.store,
            sleeper: services.sleeper,
            policy,
            model: model.into(),
        }
    }

    /// Wire up the Replicate backend, the on-disk store, and real sleeping.
    pub fn new(config: &Config) -> Result<Self> {
        let backend = ReplicateImageClient::from_config(config)?;
        info!(
            "Image provider: Replicate (model: {}, output: {})",
            backend.model(),
            config.output_dir.display()
        );

        Ok(Self::with_services(
            GeneratorServices {
                backend: Box::new(backend),
                store: Box::new(DiskImageStore::new(&config.output_dir)),
                sleeper: Box::new(TokioSleeper),
            },
            config.retry_policy(),
            config.model.clone(),
        ))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Validate `prompt` and generate an image for it with no extra parameters.
    pub async fn generate_image(&self, prompt: &str) -> Result<GenerationResult> {
        let request = GenerationRequest::new(prompt)?;
        self.generate(&request).await
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        debug!("Request {}: {:?}", RequestState::Pending, request.params());

        let (image_data, attempts) = self.call_with_retry(request).await?;
        info!(
            "Successfully generated image after {} attempt(s) ({} bytes)",
            attempts,
            image_data.len()
        );

        debug!("Request {}", RequestState::Saving);
        let path = match self.store.save(&image_data).await {
            Ok(path) => path,
            Err(e) => {
                // The remote work already succeeded; never loop back to the network.
                error!("Request {}: {}", RequestState::SaveFailed, e);
                return Err(e);
            }
        };

        debug!("Request {}: {}", RequestState::Saved, path.display());
        Ok(GenerationResult {
            prompt: request.prompt().to_string(),
            model: self.model.clone(),
            path,
            attempts,
            size_bytes: image_data.len(),
            state: RequestState::Saved,
        })
    }

    /// Call the backend until it succeeds, fails permanently, or the attempt
    /// budget is spent. Returns the bytes and the number of attempts made.
    async fn call_with_retry(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<(Vec<u8>, u32), ApiError> {
        let mut history: Vec<CallFailure> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(
                "Request {} (attempt {}/{})",
                RequestState::Calling,
                attempt,
                self.policy.max_attempts
            );

            let failure = match self.backend.generate(request).await {
                Ok(image_data) => {
                    debug!("Request {}", RequestState::Succeeded);
                    return Ok((image_data, attempt));
                }
                Err(failure) => failure,
            };

            let retry = failure.retryable && self.policy.has_budget_after(attempt);
            let delay = self.policy.backoff_for(attempt, &failure);
            if retry {
                warn!(
                    "Request {}: attempt {} failed: {}",
                    RequestState::TransientFailure,
                    attempt,
                    failure
                );
            }
            history.push(failure);

            if !retry {
                let err = ApiError {
                    attempts: attempt,
                    history,
                };
                error!(
                    "Request {}: Failed to generate image: {}",
                    err.terminal_state(),
                    err
                );
                return Err(err);
            }

            info!(
                "Request {}: retry attempt {}/{} after {:.1}s delay",
                RequestState::Backoff,
                attempt + 1,
                self.policy.max_attempts,
                delay.as_secs_f64()
            );
            self.sleeper.sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockImageBackend;
    use crate::error::{FailureKind, ImageSaveError, ValidationError};
    use crate::image::MockImageStore;
    use crate::retry::RecordingSleeper;
    use crate::Error;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const TEST_MODEL: &str = "owner/model:abc";

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            Duration::from_secs(10),
        )
    }

    fn build_generator(
        backend: MockImageBackend,
        store: MockImageStore,
        sleeper: RecordingSleeper,
        max_attempts: u32,
    ) -> ImageGenerator {
        ImageGenerator::with_services(
            GeneratorServices {
                backend: Box::new(backend),
                store: Box::new(store),
                sleeper: Box::new(sleeper),
            },
            policy(max_attempts),
            TEST_MODEL,
        )
    }

    fn server_error() -> CallFailure {
        CallFailure::transient(FailureKind::Server, "status 503: overloaded")
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let backend = MockImageBackend::new();
        let store = MockImageStore::new().with_base_path("/out");
        let sleeper = RecordingSleeper::new();
        let generator = build_generator(backend.clone(), store.clone(), sleeper.clone(), 3);

        let result = generator.generate_image("a quiet harbor").await.unwrap();

        assert_eq!(result.attempts, 1);
        assert_eq!(result.state, RequestState::Saved);
        assert_eq!(result.prompt, "a quiet harbor");
        assert_eq!(result.model, TEST_MODEL);
        assert!(result.path.starts_with("/out"));
        assert!(result.size_bytes > 0);
        assert_eq!(backend.get_call_count(), 1);
        assert_eq!(store.get_save_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let backend = MockImageBackend::new().with_failures(server_error(), 3);
        let sleeper = RecordingSleeper::new();
        let generator =
            build_generator(backend.clone(), MockImageStore::new(), sleeper.clone(), 5);

        let result = generator.generate_image("a quiet harbor").await.unwrap();

        assert_eq!(result.attempts, 4);
        assert_eq!(backend.get_call_count(), 4);
        let delays = sleeper.delays();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let backend = MockImageBackend::new().with_fallback(Err(CallFailure::permanent(
            FailureKind::Unauthorized,
            "status 401: Invalid token",
        )));
        let store = MockImageStore::new();
        let sleeper = RecordingSleeper::new();
        let generator = build_generator(backend.clone(), store.clone(), sleeper.clone(), 5);

        let err = generator.generate_image("a quiet harbor").await.unwrap_err();

        let Error::Api(api_error) = &err else {
            panic!("expected API error, got {:?}", err);
        };
        assert_eq!(api_error.attempts, 1);
        assert_eq!(api_error.history.len(), 1);
        assert!(!api_error.is_exhausted());
        assert_eq!(err.terminal_state(), Some(RequestState::PermanentFailure));
        assert_eq!(backend.get_call_count(), 1);
        assert_eq!(store.get_save_count(), 0);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let backend = MockImageBackend::new().with_fallback(Err(CallFailure::transient(
            FailureKind::Timeout,
            "operation timed out",
        )));
        let sleeper = RecordingSleeper::new();
        let generator =
            build_generator(backend.clone(), MockImageStore::new(), sleeper.clone(), 3);

        let err = generator.generate_image("a quiet harbor").await.unwrap_err();

        let Error::Api(api_error) = &err else {
            panic!("expected API error, got {:?}", err);
        };
        assert_eq!(api_error.attempts, 3);
        assert_eq!(api_error.history.len(), 3);
        assert!(api_error.is_exhausted());
        assert_eq!(api_error.last().unwrap().kind, FailureKind::Timeout);
        assert_eq!(err.terminal_state(), Some(RequestState::RetriesExhausted));
        assert_eq!(backend.get_call_count(), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_after_transient_stops_retrying() {
        let backend = MockImageBackend::new()
            .with_failure(server_error())
            .with_failure(CallFailure::permanent(
                FailureKind::InvalidRequest,
                "status 422: width must be a multiple of 8",
            ));
        let sleeper = RecordingSleeper::new();
        let generator =
            build_generator(backend.clone(), MockImageStore::new(), sleeper.clone(), 5);

        let err = generator.generate_image("a quiet harbor").await.unwrap_err();

        let Error::Api(api_error) = err else {
            panic!("expected API error");
        };
        assert_eq!(api_error.attempts, 2);
        assert_eq!(
            api_error.last().unwrap().kind,
            FailureKind::InvalidRequest
        );
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(100)]);
    }

    #[tokio::test]
    async fn test_save_failure_is_not_retried() {
        let backend = MockImageBackend::new();
        let store = MockImageStore::new().with_failure(true);
        let sleeper = RecordingSleeper::new();
        let generator = build_generator(backend.clone(), store.clone(), sleeper.clone(), 5);

        let err = generator.generate_image("a quiet harbor").await.unwrap_err();

        assert!(matches!(err, Error::ImageSave(ImageSaveError::Write { .. })));
        assert_eq!(err.terminal_state(), Some(RequestState::SaveFailed));
        assert_eq!(backend.get_call_count(), 1);
        assert_eq!(store.get_save_count(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_image_bytes_reported_as_save_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockImageBackend::new().with_image_response(b"<html>oops</html>".to_vec());
        let generator = ImageGenerator::with_services(
            GeneratorServices {
                backend: Box::new(backend.clone()),
                store: Box::new(DiskImageStore::new(dir.path())),
                sleeper: Box::new(RecordingSleeper::new()),
            },
            policy(3),
            TEST_MODEL,
        );

        let err = generator.generate_image("a quiet harbor").await.unwrap_err();

        assert!(matches!(
            err,
            Error::ImageSave(ImageSaveError::InvalidImage(_))
        ));
        assert_eq!(backend.get_call_count(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_prompt_never_reaches_backend() {
        let backend = MockImageBackend::new();
        let generator = build_generator(
            backend.clone(),
            MockImageStore::new(),
            RecordingSleeper::new(),
            3,
        );

        let err = generator.generate_image("").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::Empty)));

        let err = generator.generate_image("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::Empty)));

        let err = generator.generate_image(&"x".repeat(501)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TooLong { .. })
        ));
        assert_eq!(err.terminal_state(), None);
        assert_eq!(backend.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_hint_stretches_backoff() {
        let backend = MockImageBackend::new().with_failure(
            CallFailure::transient(FailureKind::RateLimited, "status 429")
                .with_retry_after(Some(Duration::from_secs(2))),
        );
        let sleeper = RecordingSleeper::new();
        let generator =
            build_generator(backend.clone(), MockImageStore::new(), sleeper.clone(), 3);

        let result = generator.generate_image("a quiet harbor").await.unwrap();

        assert_eq!(result.attempts, 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_params_reach_backend() {
        let backend = MockImageBackend::new();
        let generator = build_generator(
            backend.clone(),
            MockImageStore::new(),
            RecordingSleeper::new(),
            1,
        );
        let request = GenerationRequest::new("a quiet harbor")
            .unwrap()
            .with_param("num_inference_steps", 30);

        generator.generate(&request).await.unwrap();
        assert_eq!(backend.get_requests(), vec![request]);
        assert_eq!(generator.policy().max_attempts, 1);
    }
}

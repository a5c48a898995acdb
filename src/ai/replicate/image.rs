use super::client::ReplicateHttpClient;
use super::types::{CreatePredictionRequest, ModelRef, Prediction, PredictionStatus};
use crate::ai::ImageBackend;
use crate::config::Config;
use crate::error::{CallFailure, FailureKind};
use crate::models::GenerationRequest;
use crate::Result;
use async_trait::async_trait;
use base64::Engine as _;
use std::time::Duration;
use tokio::time::Instant;

/// Text-to-image backend running predictions on Replicate.
pub struct ReplicateImageClient {
    http: ReplicateHttpClient,
    model: ModelRef,
    timeout: Duration,
    poll_interval: Duration,
}

impl ReplicateImageClient {
    pub fn new(
        http: ReplicateHttpClient,
        model: ModelRef,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http,
            model,
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let model: ModelRef = config.model.parse()?;
        let http = ReplicateHttpClient::new(
            config.api_token.clone(),
            config.base_url.clone(),
            config.timeout,
        )?;
        Ok(Self::new(http, model, config.timeout, config.poll_interval))
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    async fn create_prediction(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<Prediction, CallFailure> {
        let body = CreatePredictionRequest {
            version: self.model.version.as_deref(),
            input: request.input(),
        };
        tracing::debug!("Creating Replicate prediction for model {}", self.model);
        self.http.post(&self.model.predictions_path(), &body).await
    }

    /// Poll until the prediction reaches a terminal status or the attempt
    /// deadline passes.
    async fn wait_for_completion(
        &self,
        mut prediction: Prediction,
        deadline: Instant,
    ) -> std::result::Result<Prediction, CallFailure> {
        loop {
            match prediction.status {
                PredictionStatus::Succeeded => return Ok(prediction),
                PredictionStatus::Failed => {
                    return Err(CallFailure::permanent(
                        FailureKind::Prediction,
                        format!(
                            "prediction {} failed: {}",
                            prediction.id(),
                            prediction.error_message()
                        ),
                    ))
                }
                PredictionStatus::Canceled | PredictionStatus::Aborted => {
                    return Err(CallFailure::permanent(
                        FailureKind::Canceled,
                        format!("prediction {} was canceled", prediction.id()),
                    ))
                }
                PredictionStatus::Starting
                | PredictionStatus::Processing
                | PredictionStatus::Unknown => {}
            }

            if Instant::now() >= deadline {
                return Err(CallFailure::transient(
                    FailureKind::Timeout,
                    format!(
                        "prediction {} did not finish within {:?}",
                        prediction.id(),
                        self.timeout
                    ),
                ));
            }

            let poll_url = prediction.poll_url().map(str::to_string).ok_or_else(|| {
                CallFailure::permanent(
                    FailureKind::MalformedResponse,
                    "pending prediction has no status URL",
                )
            })?;

            tracing::debug!(
                "Prediction {} is {:?}, polling again in {:?}",
                prediction.id(),
                prediction.status,
                self.poll_interval
            );
            tokio::time::sleep(self.poll_interval).await;
            prediction = self.http.get(&poll_url).await?;
        }
    }

    async fn fetch_output(&self, output: &str) -> std::result::Result<Vec<u8>, CallFailure> {
        if let Some(data_uri) = output.strip_prefix("data:") {
            let (_, payload) = data_uri.split_once(";base64,").ok_or_else(|| {
                CallFailure::permanent(
                    FailureKind::MalformedResponse,
                    "output data URI is not base64-encoded",
                )
            })?;
            return base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map_err(|e| {
                    CallFailure::permanent(
                        FailureKind::MalformedResponse,
                        format!("Failed to decode base64 image: {}", e),
                    )
                });
        }

        if output.starts_with("http://") || output.starts_with("https://") {
            tracing::debug!("Downloading generated image from {}", output);
            return self.http.download(output).await;
        }

        Err(CallFailure::permanent(
            FailureKind::MalformedResponse,
            format!("unsupported output reference: {}", output),
        ))
    }
}

#[async_trait]
impl ImageBackend for ReplicateImageClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<Vec<u8>, CallFailure> {
        let deadline = Instant::now() + self.timeout;

        let prediction = self.create_prediction(request).await?;
        tracing::info!(
            "Replicate prediction {} created ({:?})",
            prediction.id(),
            prediction.status
        );

        let prediction = self.wait_for_completion(prediction, deadline).await?;
        let output = prediction.first_output().ok_or_else(|| {
            CallFailure::permanent(
                FailureKind::MalformedResponse,
                format!("prediction {} succeeded without output", prediction.id()),
            )
        })?;

        self.fetch_output(output).await
    }
}

//! Minimal client for hosted text-to-image models
//!
//! Validates a prompt, runs a prediction on Replicate with bounded
//! exponential backoff on transient failures, and saves the resulting image
//! to a uniquely named file.

pub mod ai;
pub mod config;
pub mod error;
pub mod generator;
pub mod image;
pub mod models;
pub mod prompts;
pub mod retry;

pub use config::Config;
pub use error::{Error, Result};
pub use generator::{GeneratorServices, ImageGenerator};
pub use models::{GenerationRequest, GenerationResult, RequestState};

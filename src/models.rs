//! Data models and structures
//!
//! Defines the per-call request and result values and the request state
//! machine. Nothing here outlives a single generation call except the file
//! a successful call writes to disk.

use crate::error::ValidationError;
use crate::prompts::validate_prompt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of one generation request.
///
/// `Pending -> Calling -> [TransientFailure -> Backoff -> Calling]* ->
/// Succeeded | PermanentFailure | RetriesExhausted`, then
/// `Succeeded -> Saving -> Saved | SaveFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Calling,
    TransientFailure,
    Backoff,
    Succeeded,
    PermanentFailure,
    RetriesExhausted,
    Saving,
    Saved,
    SaveFailed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Saved | Self::SaveFailed | Self::PermanentFailure | Self::RetriesExhausted
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Calling => "CALLING",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Backoff => "BACKOFF",
            Self::Succeeded => "SUCCEEDED",
            Self::PermanentFailure => "PERMANENT_FAILURE",
            Self::RetriesExhausted => "RETRIES_EXHAUSTED",
            Self::Saving => "SAVING",
            Self::Saved => "SAVED",
            Self::SaveFailed => "SAVE_FAILED",
        };
        f.write_str(s)
    }
}

/// A validated prompt plus model-specific options.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    params: BTreeMap<String, Value>,
}

impl GenerationRequest {
    pub fn new(prompt: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            prompt: validate_prompt(prompt)?.to_string(),
            params: BTreeMap::new(),
        })
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params<I, K>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// Model input object: the parameters with `prompt` set last so it
    /// cannot be shadowed by a parameter of the same name.
    pub fn input(&self) -> Value {
        let mut input: Map<String, Value> = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        input.insert("prompt".to_string(), Value::String(self.prompt.clone()));
        Value::Object(input)
    }
}

/// Outcome of a successful generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub prompt: String,
    pub model: String,
    pub path: PathBuf,
    pub attempts: u32,
    pub size_bytes: usize,
    pub state: RequestState,
}

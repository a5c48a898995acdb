//! Replicate predictions API payloads.

use crate::config::MODEL_VAR;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A model reference of the form `owner/name` or `owner/name:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl ModelRef {
    /// Path of the endpoint that creates a prediction for this model.
    pub fn predictions_path(&self) -> String {
        match self.version {
            Some(_) => "/v1/predictions".to_string(),
            None => format!("/v1/models/{}/{}/predictions", self.owner, self.name),
        }
    }
}

impl FromStr for ModelRef {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::Invalid {
            var: MODEL_VAR,
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (path, version) = match s.split_once(':') {
            Some((path, version)) if !version.is_empty() => (path, Some(version.to_string())),
            Some(_) => return Err(invalid("version after ':' is empty")),
            None => (s, None),
        };

        match path.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    version,
                })
            }
            _ => Err(invalid("expected owner/name or owner/name:version")),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct CreatePredictionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'a str>,
    pub input: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Aborted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

/// Image models return either a single file URL or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Single(String),
    Many(Vec<String>),
    Other(Value),
}

#[derive(Debug, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

impl Prediction {
    pub fn first_output(&self) -> Option<&str> {
        let url = match self.output.as_ref()? {
            PredictionOutput::Single(url) => Some(url.as_str()),
            PredictionOutput::Many(urls) => urls.first().map(String::as_str),
            PredictionOutput::Other(_) => None,
        };
        url.filter(|url| !url.is_empty())
    }

    pub fn poll_url(&self) -> Option<&str> {
        self.urls.as_ref()?.get.as_deref()
    }

    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Null) | None => "no error detail".to_string(),
            Some(other) => other.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("<unknown>")
    }
}

use crate::error::{CallFailure, FailureKind};
use crate::Result;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Thin REST client for the Replicate API. Every error it returns is a
/// classified [`CallFailure`].
pub struct ReplicateHttpClient {
    client: Client,
    api_token: String,
    base_url: String,
}

impl ReplicateHttpClient {
    pub fn new(api_token: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(api_token, base_url, client))
    }

    pub fn new_with_client(api_token: String, base_url: String, client: Client) -> Self {
        Self {
            client,
            api_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, CallFailure> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send request to Replicate: {}", e);
            CallFailure::from(e)
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Replicate API error (status {}): {}", status, error_text);
            return Err(CallFailure::from_status(status, &error_text).with_retry_after(retry_after));
        }

        Ok(response)
    }

    async fn parse<Resp: DeserializeOwned>(
        response: Response,
    ) -> std::result::Result<Resp, CallFailure> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Replicate response: {}\nBody: {}", e, body);
            CallFailure::permanent(
                FailureKind::MalformedResponse,
                format!("Failed to parse Replicate response: {}", e),
            )
        })
    }

    /// POST to an API path, asking the server to hold the connection until
    /// the prediction finishes where it can.
    pub async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> std::result::Result<Resp, CallFailure> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .send(
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_token)
                    .header("Prefer", "wait")
                    .json(request),
            )
            .await?;
        Self::parse(response).await
    }

    /// GET an absolute API URL, such as a prediction's `urls.get`.
    pub async fn get<Resp: DeserializeOwned>(
        &self,
        url: &str,
    ) -> std::result::Result<Resp, CallFailure> {
        let response = self
            .send(self.client.get(url).bearer_auth(&self.api_token))
            .await?;
        Self::parse(response).await
    }

    /// Fetch an output file. The token is only sent back to the API host.
    pub async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, CallFailure> {
        let mut request = self.client.get(url);
        if self.is_api_origin(url) {
            request = request.bearer_auth(&self.api_token);
        }
        let response = self.send(request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Same scheme, host and effective port as the configured base URL.
    fn is_api_origin(&self, url: &str) -> bool {
        match (Url::parse(&self.base_url), Url::parse(url)) {
            (Ok(base), Ok(target)) => {
                base.scheme() == target.scheme()
                    && base.host_str() == target.host_str()
                    && base.port_or_known_default() == target.port_or_known_default()
            }
            _ => false,
        }
    }
}

/// `Retry-After` as delay-seconds or an HTTP-date. A date in the past means
/// no extra wait.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        at.with_timezone(&Utc)
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

use std::time::Duration;

use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

const BASE_BACKOFF_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl HttpError {
    /// Transport failures, rate limits and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// JSON-over-HTTP client shared by the chat and embedding providers.
#[derive(Clone, Debug)]
pub struct JsonClient {
    client: Client,
    max_retries: u32,
}

impl JsonClient {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, HttpError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|error| HttpError::Transport(error.to_string()))?;

        Ok(Self { client, max_retries })
    }

    pub async fn post<B, T>(
        &self,
        url: &str,
        bearer: Option<&SecretString>,
        body: &B,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            match self.post_once(url, bearer, body).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "agent.http.retry",
                        url,
                        attempt,
                        error = %error,
                        "provider request failed; retrying"
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn post_once<B, T>(
        &self,
        url: &str,
        bearer: Option<&SecretString>,
        body: &B,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| HttpError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status { status: status.as_u16(), body });
        }

        response.json::<T>().await.map_err(|error| HttpError::Decode(error.to_string()))
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(6)))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{backoff, join_url, HttpError};

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(HttpError::Transport("connection reset".into()).is_retryable());
        assert!(HttpError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(HttpError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!HttpError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!HttpError::Decode("missing field".into()).is_retryable());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1000));
        assert_eq!(backoff(40), backoff(6));
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.groq.com/openai/v1/", "/chat/completions"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }
}

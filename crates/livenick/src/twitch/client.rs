//! Twitch Helix HTTP client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{TwitchError, TwitchResult};
use super::types::{ApiErrorResponse, StreamsResponse};
use super::{StatusOracle, StreamStatus};

/// Default Helix endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Client for the Helix streams endpoint.
#[derive(Debug, Clone)]
pub struct TwitchClient {
    /// HTTP client.
    client: Client,
    /// Base URL for Helix (e.g., "https://api.twitch.tv/helix").
    base_url: String,
    /// Application client ID.
    client_id: String,
    /// App or user access token.
    access_token: String,
}

impl TwitchClient {
    /// Create a new Twitch client with a per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> TwitchResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            access_token: access_token.into(),
        })
    }

    /// Check whether `login` is broadcasting right now.
    pub async fn is_live(&self, login: &str) -> TwitchResult<bool> {
        let url = format!("{}/streams", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("user_login", login)])
            .header("Client-ID", &self.client_id)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .send()
            .await?;

        let streams: StreamsResponse = self.handle_response(response).await?;
        if let Some(stream) = streams.data.first() {
            debug!(twitch = %login, title = %stream.title, "Stream is live");
        }
        Ok(!streams.data.is_empty())
    }

    /// Handle response and parse JSON or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> TwitchResult<T> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| TwitchError::ParseError(format!("Failed to parse response: {}", e)));
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(TwitchError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                let reset = response
                    .headers()
                    .get("Ratelimit-Reset")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok());
                Err(TwitchError::RateLimited { reset })
            }
            _ => {
                let message = match response.json::<ApiErrorResponse>().await {
                    Ok(body) if !body.message.is_empty() => body.message,
                    Ok(body) => body.error,
                    Err(_) => String::new(),
                };
                Err(TwitchError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl StatusOracle for TwitchClient {
    async fn query(&self, login: &str) -> StreamStatus {
        match self.is_live(login).await {
            Ok(true) => StreamStatus::Live,
            Ok(false) => StreamStatus::NotLive,
            Err(e) => {
                warn!(twitch = %login, "Twitch status lookup failed: {}", e);
                StreamStatus::Unknown
            }
        }
    }
}

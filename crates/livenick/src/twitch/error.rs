//! Twitch client error types.

use thiserror::Error;

/// Result type for Twitch operations.
pub type TwitchResult<T> = Result<T, TwitchError>;

/// Errors that can occur while querying the Helix API.
#[derive(Debug, Error)]
pub enum TwitchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Client ID or access token rejected.
    #[error("Unauthorized: invalid client id or access token")]
    Unauthorized,

    /// Rate limit exhausted.
    #[error("Rate limited by Twitch (resets at {reset:?})")]
    RateLimited { reset: Option<u64> },

    /// Twitch returned an unexpected status.
    #[error("Twitch API error: {status} {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

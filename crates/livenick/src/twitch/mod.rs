//! Twitch stream status module.
//!
//! Answers "is this login live right now" and folds every failure into
//! [`StreamStatus::Unknown`] so callers never change a nickname on a guess.

mod client;
mod error;
mod types;

use async_trait::async_trait;

pub use client::{DEFAULT_API_BASE_URL, TwitchClient};
pub use error::{TwitchError, TwitchResult};
pub use types::{StreamInfo, StreamsResponse};

/// Result of a stream status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Live,
    NotLive,
    /// The lookup failed or timed out.
    Unknown,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::NotLive => "offline",
            Self::Unknown => "unknown",
        }
    }
}

/// Source of live status for a Twitch login.
#[async_trait]
pub trait StatusOracle: Send + Sync {
    /// Look up `login`. Never fails; errors become [`StreamStatus::Unknown`].
    async fn query(&self, login: &str) -> StreamStatus;
}

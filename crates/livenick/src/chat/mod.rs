//! Chat platform abstraction.
//!
//! The sync engine only needs to list guild members, look one up and change
//! a nickname. [`crate::discord::DiscordPlatform`] implements this over the
//! Discord REST API.

use async_trait::async_trait;
use thiserror::Error;

use crate::mapping::MemberKey;

/// Result type for chat platform operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors returned by the chat platform.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing permission, or the member outranks the bot.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Guild or member does not exist (e.g. the member left).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other platform failure.
    #[error("chat platform error: {0}")]
    Api(String),
}

/// A guild member as seen by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    pub guild_id: u64,
    pub user_id: u64,
    /// Account name used in log lines.
    pub tag: String,
    /// Guild nickname, or the account name when no nickname is set.
    pub display_name: String,
    pub is_bot: bool,
}

impl GuildMember {
    pub fn key(&self) -> MemberKey {
        MemberKey::new(self.guild_id, self.user_id)
    }
}

/// Membership and nickname operations of a chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// All members of a guild, bots included.
    async fn list_members(&self, guild_id: u64) -> ChatResult<Vec<GuildMember>>;

    /// One member of a guild.
    async fn get_member(&self, guild_id: u64, user_id: u64) -> ChatResult<GuildMember>;

    /// Replace a member's guild nickname.
    async fn set_nickname(&self, guild_id: u64, user_id: u64, nickname: &str) -> ChatResult<()>;
}

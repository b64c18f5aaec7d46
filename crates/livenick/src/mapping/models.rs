//! Mapping data models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one member of one guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberKey {
    pub guild_id: u64,
    pub user_id: u64,
}

impl MemberKey {
    pub fn new(guild_id: u64, user_id: u64) -> Self {
        Self { guild_id, user_id }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.guild_id, self.user_id)
    }
}

/// A row of the `user_mapping` table.
///
/// Snowflakes are stored as decimal text so the table stays readable by
/// other tooling that treats Discord IDs as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserMapping {
    pub guild_id: String,
    pub user_id: String,
    /// Twitch login the member registered.
    pub twitch_username: String,
    /// Nickname captured when the marker was applied. `Some` only while the
    /// marker is believed to be on the member's nickname.
    pub original_nickname: Option<String>,
}

impl UserMapping {
    /// Twitch login, or `None` if the row carries an empty value.
    pub fn twitch_login(&self) -> Option<&str> {
        let login = self.twitch_username.trim();
        if login.is_empty() { None } else { Some(login) }
    }

    /// Stored original nickname, ignoring empty values.
    pub fn restore_point(&self) -> Option<&str> {
        self.original_nickname
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

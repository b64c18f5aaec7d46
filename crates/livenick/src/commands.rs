//! Chat command handling.
//!
//! The only command is `!setTwitch <username>`, which registers or updates
//! the Twitch login of the member who sent it.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::chat::{ChatPlatform, GuildMember};
use crate::mapping::{MappingStore, MemberKey};

/// Command keyword, matched case-sensitively.
pub const SET_TWITCH_COMMAND: &str = "!setTwitch";

/// Reply for a `!setTwitch` without an argument.
pub const USAGE: &str = "Please provide your Twitch username, e.g., !setTwitch <username>";

/// Longest login Twitch allows.
const MAX_TWITCH_LOGIN_LEN: usize = 25;

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    SetTwitch { username: Option<String> },
}

/// Parse a message. Returns `None` for anything that is not a command.
pub fn parse_command(content: &str) -> Option<ChatCommand> {
    let mut parts = content.split_whitespace();
    match parts.next()? {
        SET_TWITCH_COMMAND => Some(ChatCommand::SetTwitch {
            username: parts.next().map(str::to_string),
        }),
        _ => None,
    }
}

/// Twitch logins are ASCII letters, digits and underscores.
pub fn is_valid_twitch_login(login: &str) -> bool {
    !login.is_empty()
        && login.len() <= MAX_TWITCH_LOGIN_LEN
        && login
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reply to send back, plus the member to reconcile once it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub text: String,
    pub reconcile: Option<GuildMember>,
}

impl CommandReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reconcile: None,
        }
    }
}

/// Applies chat commands to the mapping store.
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<dyn MappingStore>,
    platform: Arc<dyn ChatPlatform>,
}

impl CommandHandler {
    pub fn new(store: Arc<dyn MappingStore>, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { store, platform }
    }

    /// Handle a guild message from a human author.
    ///
    /// Returns `None` when the message is not a command.
    pub async fn handle(
        &self,
        guild_id: u64,
        author_id: u64,
        content: &str,
    ) -> Result<Option<CommandReply>> {
        let Some(command) = parse_command(content) else {
            return Ok(None);
        };

        let reply = match command {
            ChatCommand::SetTwitch { username: None } => CommandReply::text(USAGE),
            ChatCommand::SetTwitch {
                username: Some(username),
            } => self.set_twitch(guild_id, author_id, &username).await?,
        };
        Ok(Some(reply))
    }

    #[instrument(skip(self))]
    async fn set_twitch(
        &self,
        guild_id: u64,
        author_id: u64,
        username: &str,
    ) -> Result<CommandReply> {
        if !is_valid_twitch_login(username) {
            return Ok(CommandReply::text(format!(
                "`{}` is not a valid Twitch username. Use letters, digits and underscores only.",
                username
            )));
        }

        let member = self
            .platform
            .get_member(guild_id, author_id)
            .await
            .context("Failed to resolve command author")?;
        let key = MemberKey::new(guild_id, author_id);

        let text = match self.store.get(key).await? {
            Some(existing) => {
                // Keep the restore point of a live member.
                self.store
                    .upsert(key, username, existing.original_nickname.as_deref())
                    .await?;
                format!("Your Twitch username has been updated to {}.", username)
            }
            None => {
                self.store.upsert(key, username, None).await?;
                info!(
                    guild_id,
                    user_id = author_id,
                    twitch = %username,
                    "Added {} ({}) with Twitch username {}",
                    member.tag,
                    member.display_name,
                    username
                );
                format!("Your Twitch username has been set to {}.", username)
            }
        };

        Ok(CommandReply {
            text,
            reconcile: Some(member),
        })
    }
}

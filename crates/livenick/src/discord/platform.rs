//! Discord REST implementation of [`ChatPlatform`].

use async_trait::async_trait;
use serenity::builder::EditMember;
use serenity::http::Http;
use serenity::model::guild::Member;
use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tracing::debug;

use crate::chat::{ChatError, ChatPlatform, ChatResult, GuildMember};

/// Largest page the member list endpoint returns.
const MEMBER_PAGE_SIZE: u64 = 1000;

/// Chat platform backed by serenity's HTTP client.
#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn list_members(&self, guild_id: u64) -> ChatResult<Vec<GuildMember>> {
        let guild = GuildId::new(guild_id);
        let mut members = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let page = guild
                .members(&*self.http, Some(MEMBER_PAGE_SIZE), after)
                .await
                .map_err(map_error)?;
            let page_len = page.len() as u64;
            after = page.last().map(|member| member.user.id);
            members.extend(page.iter().map(|member| to_guild_member(guild_id, member)));

            if page_len < MEMBER_PAGE_SIZE {
                break;
            }
        }

        debug!(guild_id, count = members.len(), "Fetched guild members");
        Ok(members)
    }

    async fn get_member(&self, guild_id: u64, user_id: u64) -> ChatResult<GuildMember> {
        let member = GuildId::new(guild_id)
            .member(&*self.http, UserId::new(user_id))
            .await
            .map_err(map_error)?;
        Ok(to_guild_member(guild_id, &member))
    }

    async fn set_nickname(&self, guild_id: u64, user_id: u64, nickname: &str) -> ChatResult<()> {
        GuildId::new(guild_id)
            .edit_member(
                &*self.http,
                UserId::new(user_id),
                EditMember::new().nickname(nickname),
            )
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

/// Display name is the guild nickname, else the account name.
fn to_guild_member(guild_id: u64, member: &Member) -> GuildMember {
    GuildMember {
        guild_id,
        user_id: member.user.id.get(),
        tag: member.user.name.clone(),
        display_name: member
            .nick
            .clone()
            .unwrap_or_else(|| member.user.name.clone()),
        is_bot: member.user.bot,
    }
}

fn map_error(err: serenity::Error) -> ChatError {
    let status = match &err {
        serenity::Error::Http(http_err) => http_err.status_code().map(|code| code.as_u16()),
        _ => None,
    };
    match status {
        Some(403) => ChatError::Forbidden(err.to_string()),
        Some(404) => ChatError::NotFound(err.to_string()),
        _ => ChatError::Api(err.to_string()),
    }
}

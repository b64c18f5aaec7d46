//! Discord integration.
//!
//! Connects the sync engine to Discord through serenity: a REST-backed
//! [`ChatPlatform`](crate::chat::ChatPlatform) and a gateway event handler.

mod handler;
mod platform;

use serenity::all::GatewayIntents;

pub use handler::DiscordHandler;
pub use platform::DiscordPlatform;

/// Gateway intents the bot needs: guild list, member list and message text.
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

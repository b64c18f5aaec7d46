//! Gateway event handler.

use serenity::all::{Context, EventHandler, Guild, Message, Ready, ResumedEvent, UnavailableGuild};
use serenity::async_trait;
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::sync::Scheduler;

/// Routes gateway events to the scheduler and command handler.
pub struct DiscordHandler {
    scheduler: Scheduler,
    commands: CommandHandler,
}

impl DiscordHandler {
    pub fn new(scheduler: Scheduler, commands: CommandHandler) -> Self {
        Self {
            scheduler,
            commands,
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "{} is online in {} guild(s)",
            ready.user.name,
            ready.guilds.len()
        );
        // A repeated ready (new session) runs an immediate pass per guild.
        for guild in &ready.guilds {
            self.scheduler.start_guild(guild.id.get());
        }
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        info!("Gateway session resumed");
        self.scheduler.trigger_all();
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, is_new: Option<bool>) {
        // Guilds present at startup are started from `ready`.
        if is_new == Some(true) {
            info!(guild_id = guild.id.get(), "Joined guild {}", guild.name);
            self.scheduler.start_guild(guild.id.get());
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // `unavailable` means an outage, not a removal.
        if !incomplete.unavailable {
            self.scheduler.stop_guild(incomplete.id.get());
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let reply = match self
            .commands
            .handle(guild_id.get(), msg.author.id.get(), &msg.content)
            .await
        {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(e) => {
                warn!(
                    guild_id = guild_id.get(),
                    user_id = msg.author.id.get(),
                    "Command failed: {:#}",
                    e
                );
                return;
            }
        };

        if let Err(e) = msg.reply(&ctx, &reply.text).await {
            warn!(guild_id = guild_id.get(), "Failed to send reply: {}", e);
        }

        if let Some(member) = reply.reconcile {
            match self.scheduler.reconcile_member_now(&member).await {
                Ok(outcome) => debug!(
                    guild_id = member.guild_id,
                    user_id = member.user_id,
                    outcome = outcome.as_str(),
                    "Reconciled command author"
                ),
                Err(e) => warn!(
                    guild_id = member.guild_id,
                    user_id = member.user_id,
                    "Reconciliation failed for {}: {:#}",
                    member.tag,
                    e
                ),
            }
        }
    }
}

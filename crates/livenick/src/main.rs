use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serenity::http::Http;
use tracing::{info, warn};

use livenick::chat::ChatPlatform;
use livenick::commands::CommandHandler;
use livenick::config::{self, APP_NAME, AppConfig};
use livenick::db::Database;
use livenick::discord::{self, DiscordHandler, DiscordPlatform};
use livenick::sync::{Reconciler, Scheduler};
use livenick::twitch::{StatusOracle, TwitchClient};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_run(ctx: RuntimeContext, cmd: RunCommand) -> Result<()> {
    handle_run(&ctx, cmd).await
}

#[tokio::main]
async fn async_check(ctx: RuntimeContext, cmd: CheckCommand) -> Result<()> {
    handle_check(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();

    match cli.command {
        Command::Run(cmd) => async_run(ctx, cmd),
        Command::Check(cmd) => async_check(ctx, cmd),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Livenick - marks Discord nicknames while members are live on Twitch.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON (logs and `config show`)
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to Discord and keep nicknames in sync
    Run(RunCommand),
    /// Ask Twitch whether a login is live right now
    Check(CheckCommand),
    /// Create the default config file
    Init(InitCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct TwitchArgs {
    /// Twitch application client ID
    #[arg(long, env = "TWITCH_CLIENT_ID", hide_env_values = true)]
    twitch_client_id: Option<String>,
    /// Twitch access token
    #[arg(long, env = "TWITCH_ACCESS_TOKEN", hide_env_values = true)]
    twitch_access_token: Option<String>,
}

impl TwitchArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(client_id) = self.twitch_client_id {
            config.twitch.client_id = Some(client_id);
        }
        if let Some(token) = self.twitch_access_token {
            config.twitch.access_token = Some(token);
        }
    }
}

#[derive(Debug, Clone, Args)]
struct RunCommand {
    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    discord_token: Option<String>,
    /// Database URL (postgres:// or sqlite://)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
    #[command(flatten)]
    twitch: TwitchArgs,
    /// Seconds between sync passes
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,
}

impl RunCommand {
    fn apply(self, config: &mut AppConfig) {
        if let Some(token) = self.discord_token {
            config.discord.token = Some(token);
        }
        if let Some(url) = self.database_url {
            config.database.url = Some(url);
        }
        if let Some(interval) = self.interval {
            config.sync.interval_secs = interval;
        }
        self.twitch.apply(config);
    }
}

#[derive(Debug, Clone, Args)]
struct CheckCommand {
    /// Twitch login to look up
    #[arg(value_name = "LOGIN")]
    login: String,
    #[command(flatten)]
    twitch: TwitchArgs,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration with secrets redacted
    Show,
    /// Print the config file path
    Path,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = config::config_path(common.config.clone())?;
        let config = AppConfig::load(&config_file)?;
        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.effective_log_level();
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("livenick={level},serenity=warn")));

        if self.common.json || self.config.logging.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color)
                        .with_target(self.common.trace),
                )
                .try_init()
                .ok();
        }
    }

    fn effective_log_level(&self) -> String {
        if self.common.quiet {
            "error".to_string()
        } else if self.common.trace {
            "trace".to_string()
        } else if self.common.debug {
            "debug".to_string()
        } else {
            match self.common.verbose {
                0 => self.config.logging.level.clone(),
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            }
        }
    }
}

async fn handle_run(ctx: &RuntimeContext, cmd: RunCommand) -> Result<()> {
    let mut config = ctx.config.clone();
    cmd.apply(&mut config);
    config.validate()?;

    let token = config.discord.token.clone().unwrap_or_default();
    let database_url = config.database.url.clone().unwrap_or_default();

    let database = Database::connect(&database_url, config.database.max_connections).await?;
    let store = database.mapping_store();

    let twitch = TwitchClient::new(
        config.twitch.api_base_url.clone(),
        config.twitch.client_id.clone().unwrap_or_default(),
        config.twitch.access_token.clone().unwrap_or_default(),
        Duration::from_secs(config.twitch.timeout_secs),
    )
    .context("building Twitch client")?;

    let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordPlatform::new(Arc::new(Http::new(&token))));
    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(twitch),
        platform.clone(),
        config.reconciler_config(),
    );
    let scheduler = Scheduler::new(reconciler, config.scheduler_config());
    let commands = CommandHandler::new(store, platform);
    let handler = DiscordHandler::new(scheduler.clone(), commands);

    let mut client = serenity::Client::builder(&token, discord::intents())
        .event_handler(handler)
        .await
        .context("building Discord client")?;

    let shard_manager = client.shard_manager.clone();
    let shutdown_scheduler = scheduler.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping sync loops...");
        shutdown_scheduler.shutdown();
        shard_manager.shutdown_all().await;
    });

    info!(
        interval_secs = config.sync.interval_secs,
        marker = %config.sync.marker,
        "Starting Discord client"
    );
    let result = client
        .start()
        .await
        .context("Discord gateway client stopped unexpectedly");

    scheduler.shutdown();
    database.close().await;
    info!("Shutdown complete");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn handle_check(ctx: &RuntimeContext, cmd: CheckCommand) -> Result<()> {
    let mut config = ctx.config.clone();
    cmd.twitch.apply(&mut config);
    config.validate_twitch()?;

    let client = TwitchClient::new(
        config.twitch.api_base_url.clone(),
        config.twitch.client_id.clone().unwrap_or_default(),
        config.twitch.access_token.clone().unwrap_or_default(),
        Duration::from_secs(config.twitch.timeout_secs),
    )
    .context("building Twitch client")?;

    let status = client.query(&cmd.login).await;
    println!("{}: {}", cmd.login, status.as_str());
    Ok(())
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    config::write_default_config(&ctx.config_file, cmd.force)?;
    info!("Wrote default config to {}", ctx.config_file.display());
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let redacted = ctx.config.redacted();
            let rendered = if ctx.common.json {
                serde_json::to_string_pretty(&redacted).context("serializing config to JSON")?
            } else {
                toml::to_string_pretty(&redacted).context("serializing config to TOML")?
            };
            println!("{rendered}");
        }
        ConfigCommand::Path => println!("{}", ctx.config_file.display()),
    }
    Ok(())
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

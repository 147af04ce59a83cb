//! Modbot CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use serenity::all::GatewayIntents;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modbot")]
#[command(about = "Discord moderation bot configured from a channel message")]
struct Cli {
    /// Path to the settings file (defaults to <config dir>/modbot/settings.toml)
    #[arg(short, long)]
    settings: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log moderation actions without performing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("modbot=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut settings = modbot::settings::Settings::load(cli.settings.as_deref())
        .context("failed to load settings")?;
    settings.dry_run |= cli.dry_run;

    tracing::info!(
        guild_id = settings.guild_id,
        config_channel_id = settings.config_channel_id,
        dry_run = settings.dry_run,
        "starting modbot"
    );

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;

    let (fatal_tx, mut fatal_rx) = tokio::sync::mpsc::channel(1);
    let handler = modbot::messaging::DiscordHandler::new(settings.clone(), fatal_tx);

    let mut client = serenity::Client::builder(&settings.discord_token, intents)
        .event_handler(handler)
        .await
        .context("failed to build discord client")?;
    let shard_manager = client.shard_manager.clone();

    let mut gateway = tokio::spawn(async move { client.start().await });

    let result = tokio::select! {
        Some(error) = fatal_rx.recv() => {
            Err(anyhow::Error::new(error).context("startup failed"))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            Ok(())
        }
        joined = &mut gateway => {
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(error)) => Err(anyhow::Error::new(error).context("discord gateway stopped")),
                Err(error) => Err(anyhow::Error::new(error).context("discord gateway task panicked")),
            }
        }
    };

    shard_manager.shutdown_all().await;
    gateway.abort();
    result
}

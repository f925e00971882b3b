// Leaderboard bot entry point.
//
// Startup sequence:
// 1. Load .env and initialize tracing (log to file)
// 2. Load config
// 3. Build the state store, Riot client and Discord REST client
// 4. Create the orchestrator and start the refresh worker
// 5. Queue the startup refresh
// 6. Spawn the gateway and command tasks
// 7. Wait for Ctrl+C
// 8. Shut down: gateway, command loop, then the refresh worker

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rankboard_app::commands::{self, CommandHandler};
use rankboard_app::config;
use rankboard_app::discord::gateway::{self, GATEWAY_URL};
use rankboard_app::discord::{DiscordRest, EmbedStyle};
use rankboard_core::orchestrator::Orchestrator;
use rankboard_core::store::JsonFileStore;
use rankboard_riot::RiotClient;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment and tracing
    let _ = dotenvy::from_filename(".env");
    init_tracing()?;
    info!("rankboard starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: channel {}, refresh every {}s, {} emoji markers",
        config.discord.channel_id,
        config.refresh.interval_secs,
        config.emojis.len()
    );

    // 3. Collaborators
    let store = Arc::new(JsonFileStore::new(
        &config.storage.roster_path,
        &config.storage.publish_state_path,
    ));
    let riot = RiotClient::new(
        config.riot_api_key().to_string(),
        config.riot.account_region.clone(),
        Duration::from_secs(config.riot.request_timeout_secs),
    )
    .context("failed to build Riot client")?;
    let rest = Arc::new(
        DiscordRest::new(
            config.bot_token().to_string(),
            config.discord.channel_id.clone(),
            EmbedStyle::new(&config.discord.embed_title, &config.discord.footer_label),
        )
        .context("failed to build Discord client")?,
    );

    // 4. Orchestrator and refresh worker
    let orchestrator = Arc::new(
        Orchestrator::new(
            Arc::new(riot),
            rest.clone(),
            store,
            config.marker_table()?,
            config.refresh_settings(),
        )
        .context("failed to load persisted state")?,
    );
    let refresh = orchestrator.start();

    // 5. Startup refresh
    if config.refresh.refresh_on_start {
        refresh.request_refresh();
    }

    // 6. Gateway and commands
    let (events_tx, events_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut gateway_handle = tokio::spawn(gateway::run(
        GATEWAY_URL.to_string(),
        config.bot_token().to_string(),
        events_tx,
        shutdown_rx,
    ));

    let handler = Arc::new(CommandHandler::new(
        Arc::clone(&orchestrator),
        rest,
        refresh.trigger(),
        config.discord.application_id().map(str::to_string),
        config.discord.register_commands,
    ));
    let commands_handle = tokio::spawn(commands::run(handler, events_rx));

    info!("rankboard ready");

    // 7. Wait for Ctrl+C
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    // 8. Cleanup
    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(Duration::from_secs(5), &mut gateway_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Gateway task error: {e:#}"),
        Ok(Err(e)) => error!("Gateway task panicked: {e}"),
        Err(_) => {
            warn!("Gateway did not stop within 5s, aborting");
            gateway_handle.abort();
        }
    }
    // The gateway dropped its sender, so the command loop drains and exits.
    if let Err(e) = commands_handle.await {
        error!("Command task panicked: {e}");
    }
    refresh.shutdown().await;

    info!("rankboard shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/rankboard.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("rankboard.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rankboard=info,rankboard_app=info,rankboard_core=info,rankboard_riot=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

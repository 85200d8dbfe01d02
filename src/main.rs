use anyhow::Result;
use dotenvy::dotenv;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tokio::time::sleep;

use clipdrop::cli::Cli;
use clipdrop::core::{config, init_logger, install_panic_hook, log_toolchain_configuration};
use clipdrop::download::http::build_client;
use clipdrop::download::pipeline::sweep_stale_artifacts;
use clipdrop::download::{Pipeline, PipelineSettings, YtDlpExtractor};
use clipdrop::storage::{CorrelationStore, Correlator, MemoryStore, SqliteStore};
use clipdrop::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps, TeloxideTransport};

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Load environment variables from .env if present, then let flags win
    let _ = dotenv();
    cli.apply_env_overrides();

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH, &config::LOG_LEVEL)?;
    install_panic_hook();

    let use_webhook = cli.webhook();
    if cli.command.is_none() {
        log::info!("No command specified, running bot in polling mode");
    }
    log::info!("Running bot (webhook: {})", use_webhook);
    run_bot(use_webhook).await
}

/// Picks the correlation store: SQLite when a path is configured, memory otherwise.
fn open_store(use_webhook: bool) -> Result<Arc<dyn CorrelationStore>> {
    match config::correlator::DB_PATH.as_deref() {
        Some(path) => {
            log::info!("🗄️  Pending requests stored in {}", path);
            Ok(Arc::new(SqliteStore::open(path)?))
        }
        None => {
            if use_webhook {
                log::warn!(
                    "⚠️  Webhook mode with the in-memory store: menus become stale whenever the process restarts. \
                     Set CORRELATOR_DB_PATH to keep them across invocations."
                );
            }
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Retries getMe while the Bot API is still coming up.
async fn fetch_bot_username(bot: &Bot) -> Result<Option<String>> {
    let startup_max_retries = 60; // Up to 5 minutes (60 * 5s)
    let mut startup_retry = 0;
    loop {
        match bot.get_me().await {
            Ok(info) => return Ok(info.username.clone()),
            Err(e) => {
                let err_str = e.to_string();
                let is_retryable = err_str.contains("restart")
                    || err_str.contains("network")
                    || err_str.contains("connection")
                    || err_str.contains("timed out")
                    || err_str.contains("Connection refused");

                startup_retry += 1;
                if startup_retry >= startup_max_retries || !is_retryable {
                    return Err(anyhow::anyhow!(
                        "Failed to connect to Bot API after {} retries: {}",
                        startup_retry,
                        e
                    ));
                }

                log::warn!(
                    "Bot API not ready (attempt {}/{}): {}. Retrying in 5 seconds...",
                    startup_retry,
                    startup_max_retries,
                    err_str
                );
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

async fn run_bot(use_webhook: bool) -> Result<()> {
    let bot_init_start = std::time::Instant::now();
    log::info!("Starting bot...");

    if config::BOT_TOKEN.is_empty() {
        return Err(anyhow::anyhow!("No bot token: set BOT_TOKEN or pass --token"));
    }

    let ffmpeg_available = which::which(config::FFMPEG_BIN.as_str()).is_ok();
    log_toolchain_configuration(ffmpeg_available);

    let output_dir = Path::new(config::DOWNLOAD_FOLDER.as_str());
    std::fs::create_dir_all(output_dir)?;
    let swept = sweep_stale_artifacts(output_dir, config::correlator::ttl());
    log::info!("📁 Download folder: {} ({} stale files removed)", output_dir.display(), swept);

    let correlator = Arc::new(Correlator::new(open_store(use_webhook)?, config::correlator::ttl()));
    Arc::clone(&correlator).spawn_eviction_task(config::correlator::evict_interval());

    // Create bot instance
    let bot = create_bot()?;
    let bot_username = fetch_bot_username(&bot).await?;
    log::info!("Bot username: {:?}", bot_username);

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    let transport = Arc::new(TeloxideTransport::new(bot.clone(), bot_username));
    let extractor = Arc::new(YtDlpExtractor::from_config(ffmpeg_available));
    let pipeline = Arc::new(Pipeline::new(
        transport.clone(),
        extractor,
        correlator,
        build_client(config::download::http_fetch_timeout())?,
        PipelineSettings::from_config(),
    ));
    let handler = schema(HandlerDeps::new(pipeline, transport));

    let init_elapsed = bot_init_start.elapsed();
    log::info!("================================================");
    log::info!("🎉 Bot initialization complete in {:.2}s", init_elapsed.as_secs_f64());

    if use_webhook {
        let url = config::webhook::URL
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--webhook needs WEBHOOK_URL"))?;
        let url = url::Url::parse(url)?;
        let addr = config::webhook::LISTEN_ADDR
            .parse::<std::net::SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid WEBHOOK_LISTEN_ADDR {}: {}", *config::webhook::LISTEN_ADDR, e))?;

        log::info!("📡 Webhook mode: {} (listening on {})", url, addr);
        log::info!("================================================");

        let listener = webhooks::axum(bot.clone(), webhooks::Options::new(addr, url)).await?;
        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
        log::info!("Dispatcher shutdown gracefully");
        return Ok(());
    }

    log::info!("📡 Long polling mode, ready to receive updates!");
    log::info!("================================================");

    let max_retries = config::retry::MAX_DISPATCHER_RETRIES;
    let mut retry_count = 0;

    // Run the dispatcher with retry logic
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        // A panic inside the dispatcher surfaces through the JoinHandle
        let handle = tokio::spawn(async move {
            use teloxide::update_listeners::Polling;

            // Create polling listener that drops pending updates on start
            let listener = Polling::builder(bot_clone.clone()).drop_pending_updates().build();

            Dispatcher::builder(bot_clone, handler_clone)
                .enable_ctrlc_handler()
                .build()
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) if join_err.is_panic() => {
                log::error!("Dispatcher panicked: {}", join_err);
                if retry_count >= max_retries {
                    log::error!("Max retries reached after panic. Exiting...");
                    break;
                }
                retry_count += 1;
                log::info!(
                    "Retrying dispatcher connection after panic (attempt {}/{})...",
                    retry_count,
                    max_retries
                );
                sleep(config::retry::backoff(retry_count)).await;
            }
            Err(join_err) => {
                log::warn!("Dispatcher task was cancelled: {}", join_err);
                break;
            }
        }

        // Add a delay between retries to avoid overwhelming the API
        sleep(config::retry::dispatcher_delay()).await;
    }

    Ok(())
}

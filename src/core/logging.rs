//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A panic hook that routes panics into the log
//! - A startup summary of the extraction toolchain

use anyhow::Result;
use simplelog::*;
use std::fs::OpenOptions;

use crate::core::config;

/// Maps a textual level (as found in LOG_LEVEL) to a filter, defaulting to Info.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file (appended to, created if missing)
/// * `level` - Level name, see [`parse_level`]
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to open the file or a logger is already set
pub fn init_logger(log_file_path: &str, level: &str) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", log_file_path, e))?;

    let filter = parse_level(level);

    CombinedLogger::init(vec![
        TermLogger::new(filter, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(filter, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Installs a panic hook that logs the panic instead of only printing to stderr.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));
}

/// Logs which external tools were found and what the bot will do without them.
pub fn log_toolchain_configuration(ffmpeg_available: bool) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("🧰 Toolchain Check");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    match which::which(config::YTDL_BIN.as_str()) {
        Ok(path) => log::info!("✅ yt-dlp: {}", path.display()),
        Err(_) => log::error!("❌ yt-dlp: '{}' not found in PATH, every download will fail", *config::YTDL_BIN),
    }

    if ffmpeg_available {
        log::info!("✅ ffmpeg: '{}' found, formats will be merged and audio converted to MP3", *config::FFMPEG_BIN);
    } else {
        log::warn!("⚠️  ffmpeg: '{}' not found", *config::FFMPEG_BIN);
        log::warn!("   Video falls back to single-file formats, audio keeps its native container");
    }

    log::info!("📁 Download folder: {}", *config::DOWNLOAD_FOLDER);
    log::info!("📦 Size ceiling: {} bytes", *config::download::MAX_FILESIZE);
    match config::correlator::DB_PATH.as_deref() {
        Some(path) => log::info!("🗄️  Pending requests stored in SQLite: {}", path),
        None => log::info!("🧠 Pending requests stored in memory (lost on restart)"),
    }
}

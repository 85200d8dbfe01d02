use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

// Configuration for the bot, read once from the environment.
// `.env` is loaded by `main` before any of these statics is touched, and the
// CLI overrides BOT_TOKEN / DOWNLOAD_FOLDER by exporting them first.

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Cached yt-dlp binary path
/// Read from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// ffmpeg binary used to decide whether merging/transcoding is possible
/// Read from FFMPEG_BIN environment variable or defaults to "ffmpeg"
pub static FFMPEG_BIN: Lazy<String> = Lazy::new(|| env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()));

/// Download folder path
/// Read from DOWNLOAD_FOLDER environment variable
/// Supports tilde (~) expansion for home directory
pub static DOWNLOAD_FOLDER: Lazy<String> = Lazy::new(|| {
    let raw = env::var("DOWNLOAD_FOLDER").unwrap_or_else(|_| "~/downloads/clipdrop".to_string());
    shellexpand::tilde(&raw).to_string()
});

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: clipdrop.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "clipdrop.log".to_string()));

/// Log level for both console and file output (error, warn, info, debug, trace)
pub static LOG_LEVEL: Lazy<String> = Lazy::new(|| env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));

/// Custom Bot API server (e.g. a local telegram-bot-api instance)
pub static BOT_API_URL: Lazy<Option<String>> = Lazy::new(|| env::var("BOT_API_URL").ok());

/// Parses a numeric env var, falling back to `default` when unset or invalid.
fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid value for {}: {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Download configuration
pub mod download {
    use super::{env_u64, Duration, Lazy};

    /// Maximum file size passed to yt-dlp as --max-filesize (bytes).
    /// Telegram bots cannot upload more than 50 MB through the public Bot API.
    pub static MAX_FILESIZE: Lazy<u64> = Lazy::new(|| env_u64("MAX_FILESIZE", 50_000_000));

    /// Timeout for a single yt-dlp invocation (in seconds)
    pub static YTDLP_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| env_u64("YTDLP_TIMEOUT_SECS", 600));

    /// Timeout for direct HTTP file fetches (in seconds)
    pub const HTTP_FETCH_TIMEOUT_SECS: u64 = 10;

    /// yt-dlp command timeout duration
    pub fn ytdlp_timeout() -> Duration {
        Duration::from_secs(*YTDLP_TIMEOUT_SECS)
    }

    /// Direct fetch timeout duration
    pub fn http_fetch_timeout() -> Duration {
        Duration::from_secs(HTTP_FETCH_TIMEOUT_SECS)
    }
}

/// Request correlation configuration
pub mod correlator {
    use super::{env_u64, Duration, Lazy};

    /// SQLite file backing the correlation table.
    /// When unset, pending requests live in process memory only.
    pub static DB_PATH: Lazy<Option<String>> = Lazy::new(|| {
        std::env::var("CORRELATOR_DB_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(|p| shellexpand::tilde(&p).to_string())
    });

    /// How long an unanswered menu stays valid (in seconds)
    pub static TTL_SECS: Lazy<u64> = Lazy::new(|| env_u64("CORRELATOR_TTL_SECS", 3600));

    /// Interval between eviction sweeps (in seconds)
    pub static EVICT_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| env_u64("CORRELATOR_EVICT_INTERVAL_SECS", 300));

    /// Entry time-to-live
    pub fn ttl() -> Duration {
        Duration::from_secs(*TTL_SECS)
    }

    /// Eviction sweep interval
    pub fn evict_interval() -> Duration {
        Duration::from_secs((*EVICT_INTERVAL_SECS).max(1))
    }
}

/// Progress reporting configuration
pub mod progress {
    use super::{env_u64, Duration, Lazy};

    /// Minimum gap between two progress edits of the same message (in seconds).
    /// Telegram starts answering 429 when a message is edited faster.
    pub static UPDATE_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| env_u64("PROGRESS_UPDATE_INTERVAL_SECS", 2));

    /// Progress edit interval duration
    pub fn update_interval() -> Duration {
        Duration::from_secs(*UPDATE_INTERVAL_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API calls (in seconds)
    /// Large enough for a 50 MB upload on a slow link
    pub const REQUEST_TIMEOUT_SECS: u64 = 300;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Dispatcher reconnection settings
pub mod retry {
    use super::Duration;

    /// Maximum number of retries for dispatcher reconnection
    pub const MAX_DISPATCHER_RETRIES: u32 = 5;

    /// Delay between dispatcher retry attempts (in seconds)
    pub const DISPATCHER_RETRY_DELAY_SECS: u64 = 5;

    /// Base for the exponential backoff after a dispatcher panic
    pub const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

    /// Dispatcher retry delay duration
    pub fn dispatcher_delay() -> Duration {
        Duration::from_secs(DISPATCHER_RETRY_DELAY_SECS)
    }

    /// Backoff before reconnect attempt `attempt` (1-based)
    pub fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt))
    }
}

/// Webhook configuration
pub mod webhook {
    use super::Lazy;

    /// Public URL Telegram posts updates to
    /// Read from WEBHOOK_URL environment variable
    pub static URL: Lazy<Option<String>> = Lazy::new(|| std::env::var("WEBHOOK_URL").ok());

    /// Local socket address the webhook server binds to
    pub static LISTEN_ADDR: Lazy<String> =
        Lazy::new(|| std::env::var("WEBHOOK_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8443".to_string()));
}

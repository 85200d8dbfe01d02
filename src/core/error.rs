use thiserror::Error;

/// Centralized error type for infrastructure failures
///
/// Wraps the errors of every crate the bot talks to (SQLite, Bot API, HTTP, IO)
/// so startup code and the storage layer can use `?` freely.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// HTTP/Fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// A fetched body grew past the configured ceiling
    #[error("File exceeds maximum size: {size} bytes > {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

/// Maximum number of characters of a raw diagnostic shown to the user.
const DIAGNOSTIC_PREVIEW_CHARS: usize = 100;

/// Why a single user request ended in `Failed`.
///
/// Every variant maps to exactly one user-facing message. None of them is
/// retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No URL in the message, malformed URL or an unknown button payload
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Extractor failed (unsupported site, private video, network, ...)
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),

    /// The artifact is above the configured size ceiling
    #[error("file exceeds the size ceiling")]
    SizeExceeded,

    /// The extractor reported success but nothing usable is on disk
    #[error("file not found after download: {0}")]
    FileNotFound(String),

    /// A Bot API call failed
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The button token is unknown, consumed or belongs to another chat
    #[error("session expired")]
    ExpiredSession,

    /// The correlation store could not record the pending request
    #[error("correlation store unavailable: {0}")]
    CorrelationUnavailable(String),
}

impl RequestError {
    /// Short machine-friendly category, used in logs
    pub fn subcategory(&self) -> &'static str {
        match self {
            RequestError::InvalidInput(_) => "invalid_input",
            RequestError::ExtractionFailure(_) => "extraction_failure",
            RequestError::SizeExceeded => "size_exceeded",
            RequestError::FileNotFound(_) => "file_not_found",
            RequestError::TransportFailure(_) => "transport_failure",
            RequestError::ExpiredSession => "expired_session",
            RequestError::CorrelationUnavailable(_) => "correlation_unavailable",
        }
    }

    /// Whether the failure is the user's to fix rather than a system error
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            RequestError::InvalidInput(_) | RequestError::SizeExceeded | RequestError::ExpiredSession
        )
    }

    /// Message shown to the user, formatted for MarkdownV2.
    ///
    /// `ExpiredSession` is the exception: it is shown as a plain-text
    /// callback notice, which does not parse markup.
    pub fn user_message(&self) -> String {
        use crate::core::utils::escape_markdown_v2 as esc;

        match self {
            RequestError::InvalidInput(_) => "⚠️ No valid link found\\. Please send a video URL\\.".to_string(),
            RequestError::ExtractionFailure(diag) => {
                format!("❌ *Error Occurred*\n`{}`", esc(&truncate_diagnostic(diag)))
            }
            RequestError::SizeExceeded => "❌ *File Too Large*\nTelegram bots are limited to 50MB uploads\\.\n\
                 Try 📱 *Mobile* or 🎵 *Audio* instead\\."
                .to_string(),
            RequestError::FileNotFound(_) => "❌ *Error Occurred*\n`File not found after download\\.`".to_string(),
            RequestError::TransportFailure(diag) => {
                format!("❌ *Upload Failed*\n`{}`", esc(&truncate_diagnostic(diag)))
            }
            RequestError::ExpiredSession => "❌ Session expired. Please send the link again.".to_string(),
            RequestError::CorrelationUnavailable(_) => "❌ *Error Occurred*\nPlease try again later\\.".to_string(),
        }
    }
}

/// Cuts a raw diagnostic down to what fits in a chat bubble
pub fn truncate_diagnostic(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= DIAGNOSTIC_PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(DIAGNOSTIC_PREVIEW_CHARS).collect();
    format!("{}...", head)
}

//! clipdrop - Telegram bot that turns a media link into an uploaded file
//!
//! A user sends a link, picks a quality from the menu, and gets the file back
//! with live download progress. Extraction is done by yt-dlp.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging and text utilities
//! - `storage`: Pending request correlation (in-memory or SQLite)
//! - `download`: Extractor interface, yt-dlp adapter and the request pipeline
//! - `telegram`: Telegram bot integration and handlers

pub mod cli;
pub mod core;
pub mod download;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult, RequestError};
pub use download::{DownloadMode, Pipeline, PipelineSettings, YtDlpExtractor};
pub use storage::{create_pool, get_connection, Correlator, DbConnection, DbPool, MemoryStore, SqliteStore};

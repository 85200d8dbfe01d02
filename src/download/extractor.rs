//! Narrow interface to the external media extractor.
//!
//! The pipeline only talks to [`Extractor`]; the yt-dlp adapter lives in
//! [`super::ytdlp`] and tests substitute a scripted implementation.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

use super::mode::DownloadMode;

/// What the menu shows about a link before anything is downloaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub title: String,
    /// Seconds
    pub duration: Option<u64>,
    pub uploader: Option<String>,
    pub thumbnail_url: Option<String>,
    pub view_count: Option<u64>,
}

/// A single download to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub url: String,
    pub mode: DownloadMode,
    /// Largest artifact accepted, in bytes
    pub size_ceiling: u64,
    /// Directory the artifact is written to
    pub output_dir: PathBuf,
    /// File name prefix owned by this request; every file it creates starts with it
    pub prefix: String,
}

impl DownloadJob {
    /// yt-dlp output template: `<dir>/<prefix>_<id>.<ext>`.
    pub fn output_template(&self) -> String {
        self.output_dir
            .join(format!("{}_%(id)s.%(ext)s", self.prefix))
            .to_string_lossy()
            .into_owned()
    }
}

/// One progress sample from a running download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
}

/// A finished download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    pub file_path: PathBuf,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Extractor failure, already classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The artifact would be larger than the job's size ceiling
    #[error("file exceeds the size ceiling")]
    SizeExceeded,

    /// The extractor finished without error but left no artifact behind
    #[error("no output file for {0}")]
    NoOutput(String),

    /// Anything else; carries the extractor's own diagnostic
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable name, for logs
    fn name(&self) -> &str;

    /// Fetches title, duration and friends without downloading the media.
    async fn fetch_metadata(&self, url: &str) -> Result<MediaMetadata, ExtractError>;

    /// Downloads `job`, reporting progress through `progress_tx` when the
    /// extractor knows it. The channel is dropped when the call returns.
    async fn download(
        &self,
        job: &DownloadJob,
        progress_tx: mpsc::UnboundedSender<ProgressUpdate>,
    ) -> Result<DownloadedMedia, ExtractError>;
}

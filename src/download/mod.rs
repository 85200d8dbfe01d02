//! Download pipeline: extractor interface, yt-dlp adapter, progress and stages

pub mod extractor;
pub mod http;
pub mod mode;
pub mod pipeline;
pub mod progress;
pub mod stage;
pub mod ytdlp;

// Re-exports for convenience
pub use extractor::{DownloadJob, DownloadedMedia, ExtractError, Extractor, MediaMetadata, ProgressUpdate};
pub use mode::DownloadMode;
pub use pipeline::{Pipeline, PipelineSettings};
pub use progress::ProgressReporter;
pub use stage::{RequestOutcome, RequestReport, Stage};
pub use ytdlp::YtDlpExtractor;

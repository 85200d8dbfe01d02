use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality mode chosen from the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    /// Highest resolution up to 1080p, which keeps most clips under the upload ceiling
    Best,
    /// 480p or lower, finishes faster on slow hosts
    Mobile,
    /// Audio stream only
    #[serde(rename = "audio")]
    AudioOnly,
}

impl DownloadMode {
    /// All modes, in menu order.
    pub fn all() -> &'static [Self] {
        &[Self::Best, Self::Mobile, Self::AudioOnly]
    }

    /// Short code used in callback payloads and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Mobile => "mobile",
            Self::AudioOnly => "audio",
        }
    }

    /// Parse from a stored/callback code.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "best" => Some(Self::Best),
            "mobile" => Some(Self::Mobile),
            "audio" => Some(Self::AudioOnly),
            _ => None,
        }
    }

    /// Label for the menu button.
    pub fn button_label(&self) -> &'static str {
        match self {
            Self::Best => "🎬 Best Quality",
            Self::Mobile => "📱 Mobile (480p)",
            Self::AudioOnly => "🎵 Audio",
        }
    }

    /// Name shown in captions ("Quality: Mobile").
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Best => "Best",
            Self::Mobile => "Mobile",
            Self::AudioOnly => "Audio",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::AudioOnly)
    }

    /// Height cap for video modes.
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::Best => Some(1080),
            Self::Mobile => Some(480),
            Self::AudioOnly => None,
        }
    }

    /// yt-dlp `--format` selector for this mode.
    ///
    /// Without ffmpeg yt-dlp cannot merge separate video and audio streams, so
    /// only progressive (single-file) formats are requested.
    pub fn format_selector(&self, can_merge: bool) -> String {
        match (self, can_merge) {
            (Self::AudioOnly, _) => "bestaudio/best".to_string(),
            (Self::Best, true) => "bestvideo[height<=1080][ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
            (Self::Mobile, true) => {
                "bestvideo[height<=480][ext=mp4]+bestaudio[ext=m4a]/best[height<=480][ext=mp4]/best".to_string()
            }
            (mode, false) => {
                let h = mode.max_height().unwrap_or(1080);
                format!("best[height<={h}][ext=mp4]/best[height<={h}]/best")
            }
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

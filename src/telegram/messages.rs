//! User-facing texts, all in MarkdownV2.

use crate::core::utils::{escape_markdown_v2 as esc, format_count, format_duration};
use crate::download::extractor::MediaMetadata;
use crate::download::mode::DownloadMode;

/// Titles are cut so captions stay under Telegram's 1024 character limit.
const MAX_TITLE_CHARS: usize = 200;

fn short_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let head: String = title.chars().take(MAX_TITLE_CHARS).collect();
    format!("{}…", head)
}

fn signature(bot_username: Option<&str>) -> String {
    match bot_username {
        Some(name) if !name.is_empty() => format!("\nVia @{}", esc(name)),
        _ => String::new(),
    }
}

pub fn welcome(first_name: Option<&str>) -> String {
    let greeting = match first_name {
        Some(name) => format!("👋 *Welcome, {}\\!*", esc(name)),
        None => "👋 *Welcome\\!*".to_string(),
    };
    format!(
        "{}\n\n\
         I am a *Media Downloader Bot*\\. 🚀\n\
         Send me a link from:\n\
         • YouTube\n\
         • Instagram \\(Reels/Posts\\)\n\
         • TikTok\n\
         • Twitter / X\n\
         • Facebook\n\n\
         ✨ *Features:*\n\
         • Select Quality \\(HD / Data Saver\\)\n\
         • Extract Audio \\(MP3\\)\n\
         • Calendar files \\(\\.ics\\) sent as documents\n\n\
         👇 _Just paste a link to start\\!_",
        greeting
    )
}

pub fn analyzing() -> &'static str {
    "🔎 *Analyzing Link\\.\\.\\.*"
}

pub fn menu_caption(meta: &MediaMetadata) -> String {
    format!(
        "🎬 *{}*\n\n👤 *Channel:* {}\n⏱ *Duration:* {}\n👁 *Views:* {}\n\n👇 *Select format:*",
        esc(&short_title(&meta.title)),
        esc(meta.uploader.as_deref().unwrap_or("Unknown Author")),
        esc(&format_duration(meta.duration)),
        esc(&format_count(meta.view_count.unwrap_or(0))),
    )
}

pub fn starting(mode: DownloadMode) -> String {
    format!("🚀 *Starting download\\.\\.\\.*\nMode: _{}_", esc(mode.display_name()))
}

/// Wraps a rendered progress line.
pub fn downloading(progress: &str) -> String {
    format!("⬇️ *Downloading\\.\\.\\.*\n\n{}", esc(progress))
}

pub fn uploading() -> &'static str {
    "📤 *Uploading to Telegram\\.\\.\\.*\n_This may take a moment\\._"
}

pub fn audio_caption(title: &str, bot_username: Option<&str>) -> String {
    format!("🎵 *{}*{}", esc(&short_title(title)), signature(bot_username))
}

pub fn video_caption(title: &str, mode: DownloadMode, bot_username: Option<&str>) -> String {
    format!(
        "🎬 *{}*\n✨ Quality: {}{}",
        esc(&short_title(title)),
        esc(mode.display_name()),
        signature(bot_username)
    )
}

pub fn calendar_fetching() -> &'static str {
    "📅 *Downloading iCalendar\\.\\.\\.*"
}

pub fn sending_file() -> &'static str {
    "📤 Sending file\\.\\.\\."
}

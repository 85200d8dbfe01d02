//! Throttled progress rendering for a single download

use std::time::{Duration, Instant};

const BAR_CELLS: usize = 10;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Latest known progress of one download.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub bytes_downloaded: u64,
    pub bytes_total: Option<u64>,
    /// When the UI was last edited; `None` until the first edit
    pub last_ui_update_at: Option<Instant>,
}

/// Decides which progress samples reach the chat.
///
/// Owned by a single request run. Samples arrive far more often than the Bot
/// API tolerates edits, so at most one text is emitted per `interval`.
#[derive(Debug)]
pub struct ProgressReporter {
    interval: Duration,
    snapshot: ProgressSnapshot,
}

impl ProgressReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            snapshot: ProgressSnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Records a sample and returns the text to show, if an edit is due.
    ///
    /// An edit is due on the first sample and whenever strictly more than
    /// `interval` has passed since the previous emitted one.
    pub fn on_progress(&mut self, downloaded: u64, total: Option<u64>, now: Instant) -> Option<String> {
        self.snapshot.bytes_downloaded = downloaded;
        self.snapshot.bytes_total = total;

        let due = match self.snapshot.last_ui_update_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        };
        if !due {
            return None;
        }

        self.snapshot.last_ui_update_at = Some(now);
        Some(render_progress(downloaded, total))
    }
}

/// `Downloading: ▓▓▓░░░░░░░ 30.0%` plus the total size, or a generic
/// indicator when the total is unknown.
pub fn render_progress(downloaded: u64, total: Option<u64>) -> String {
    let total = match total {
        Some(t) if t > 0 => t,
        _ => return "⏳ Processing...".to_string(),
    };

    let ratio = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
    let filled = ((BAR_CELLS as f64) * ratio) as usize;
    let bar = format!("{}{}", "▓".repeat(filled), "░".repeat(BAR_CELLS - filled));

    format!(
        "Downloading: {} {:.1}%\n📦 Size: {:.1}MB",
        bar,
        ratio * 100.0,
        total as f64 / BYTES_PER_MB
    )
}

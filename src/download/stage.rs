use std::fmt;

use crate::core::error::RequestError;
use crate::download::mode::DownloadMode;
use crate::storage::PendingRequest;

/// Lifecycle of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Analyzing,
    AwaitingModeChoice,
    Downloading,
    Uploading,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `self -> next` is a legal edge.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        use Stage::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Analyzing)
                | (Analyzing, AwaitingModeChoice)
                // direct fetches skip the menu
                | (Analyzing, Downloading)
                | (AwaitingModeChoice, Downloading)
                // cancel from the menu
                | (AwaitingModeChoice, Done)
                | (Downloading, Uploading)
                | (Uploading, Done)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::AwaitingModeChoice => "awaiting_mode_choice",
            Self::Downloading => "downloading",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a run ended, as far as this process is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// Menu is shown; the request now lives in the correlator
    AwaitingChoice { token: String, request: PendingRequest },
    /// File uploaded
    Delivered { mode: Option<DownloadMode> },
    /// User pressed Cancel on the menu
    Cancelled { token: String },
    Failed { error: RequestError },
}

/// Stage history of one run plus its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestReport {
    pub stages: Vec<Stage>,
    pub outcome: RequestOutcome,
}

impl RequestReport {
    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Idle)
    }

    pub fn error(&self) -> Option<&RequestError> {
        match &self.outcome {
            RequestOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Records the stages a run walks through and refuses illegal edges.
#[derive(Debug, Clone)]
pub struct StageTracker {
    stages: Vec<Stage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self { stages: vec![Stage::Idle] }
    }

    /// Starts from `stage`, for runs resumed from a stored request.
    pub fn resumed(stage: Stage) -> Self {
        Self { stages: vec![stage] }
    }

    pub fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Idle)
    }

    pub fn advance(&mut self, next: Stage) {
        let current = self.current();
        if current.can_advance_to(next) {
            log::debug!("Stage {} -> {}", current, next);
            self.stages.push(next);
        } else {
            log::error!("Illegal stage transition {} -> {}, ignored", current, next);
        }
    }

    pub fn finish(mut self, outcome: RequestOutcome) -> RequestReport {
        if let RequestOutcome::Failed { .. } = outcome {
            if self.current() != Stage::Failed {
                self.advance(Stage::Failed);
            }
        }
        RequestReport {
            stages: self.stages,
            outcome,
        }
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

//! Mode menu layout and callback payload encoding.
//!
//! Payloads carry only a token: `dl:<mode>:<token>` or `cancel:<token>`.
//! Telegram limits `callback_data` to 64 bytes.

use crate::download::mode::DownloadMode;

/// Telegram's limit on `callback_data`.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

const DOWNLOAD_PREFIX: &str = "dl";
const CANCEL_PREFIX: &str = "cancel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub data: String,
}

/// Transport-neutral inline keyboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineMenu {
    pub rows: Vec<Vec<MenuButton>>,
}

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Download { mode: DownloadMode, token: String },
    Cancel { token: String },
}

impl CallbackAction {
    pub fn token(&self) -> &str {
        match self {
            Self::Download { token, .. } | Self::Cancel { token } => token,
        }
    }

    /// Encodes the action, or `None` when it would not fit in 64 bytes.
    pub fn encode(&self) -> Option<String> {
        let data = match self {
            Self::Download { mode, token } => format!("{}:{}:{}", DOWNLOAD_PREFIX, mode.as_str(), token),
            Self::Cancel { token } => format!("{}:{}", CANCEL_PREFIX, token),
        };
        (data.len() <= MAX_CALLBACK_DATA_BYTES).then_some(data)
    }

    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        match (parts.next()?, parts.next(), parts.next()) {
            (DOWNLOAD_PREFIX, Some(mode), Some(token)) if is_token(token) => Some(Self::Download {
                mode: DownloadMode::parse(mode)?,
                token: token.to_string(),
            }),
            (CANCEL_PREFIX, Some(token), None) if is_token(token) => Some(Self::Cancel {
                token: token.to_string(),
            }),
            _ => None,
        }
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_CALLBACK_DATA_BYTES && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn button(label: &str, action: CallbackAction) -> Option<MenuButton> {
    Some(MenuButton {
        label: label.to_string(),
        data: action.encode()?,
    })
}

/// The quality menu: Best on its own row, Mobile and Audio side by side, then Cancel.
///
/// Buttons whose payload would not fit are left out, which can only happen
/// with an oversized token.
pub fn build_mode_menu(token: &str) -> InlineMenu {
    let download = |mode: DownloadMode| {
        button(
            mode.button_label(),
            CallbackAction::Download {
                mode,
                token: token.to_string(),
            },
        )
    };

    let rows = vec![
        [download(DownloadMode::Best)].into_iter().flatten().collect::<Vec<_>>(),
        [download(DownloadMode::Mobile), download(DownloadMode::AudioOnly)]
            .into_iter()
            .flatten()
            .collect(),
        [button(
            "❌ Cancel",
            CallbackAction::Cancel {
                token: token.to_string(),
            },
        )]
        .into_iter()
        .flatten()
        .collect(),
    ];

    InlineMenu {
        rows: rows.into_iter().filter(|row| !row.is_empty()).collect(),
    }
}

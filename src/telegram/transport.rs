//! Outbound chat operations behind a trait, plus the teloxide implementation.
//!
//! The request pipeline never touches `teloxide::Bot` directly, so it can be
//! driven against a recording transport in tests.

use async_trait::async_trait;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ParseMode, ReplyParameters,
};
use thiserror::Error;

use super::keyboard::InlineMenu;

/// Inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
}

/// Inbound button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub chat_id: i64,
    /// Message carrying the pressed keyboard
    pub message_id: i32,
    pub query_id: String,
    pub data: String,
}

/// Options for outgoing text and photo messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reply_to: Option<i32>,
    pub keyboard: Option<InlineMenu>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioMeta {
    pub title: String,
    pub performer: String,
    pub caption: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMeta {
    pub caption: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Why a chat API call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The Bot API refused the upload because of its size
    #[error("file is too large for the Bot API")]
    EntityTooLarge,

    #[error("{0}")]
    Api(String),
}

impl TransportError {
    /// Classifies a raw Bot API error description.
    pub fn from_description(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("too large") || lower.contains("too big") {
            Self::EntityTooLarge
        } else {
            Self::Api(description.to_string())
        }
    }
}

impl From<teloxide::RequestError> for TransportError {
    fn from(err: teloxide::RequestError) -> Self {
        Self::from_description(&err.to_string())
    }
}

/// Outbound chat operations. Text, captions and edits use MarkdownV2.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Username of the bot, without `@`, if known
    fn bot_username(&self) -> Option<String>;

    /// Returns the id of the sent message.
    async fn send_text(&self, chat_id: i64, text: &str, options: SendOptions) -> Result<i32, TransportError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
        options: SendOptions,
    ) -> Result<i32, TransportError>;

    async fn send_audio(&self, chat_id: i64, file: &Path, meta: AudioMeta) -> Result<i32, TransportError>;

    async fn send_video(&self, chat_id: i64, file: &Path, meta: VideoMeta) -> Result<i32, TransportError>;

    async fn send_document(&self, chat_id: i64, file: &Path, file_name: &str) -> Result<i32, TransportError>;

    /// Replaces the caption of a media message, or the text of a text message.
    /// The keyboard is removed either way.
    async fn edit_caption_or_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), TransportError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), TransportError>;

    /// Acknowledges a button press, optionally with a short notice.
    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), TransportError>;
}

fn to_markup(menu: &InlineMenu) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(menu.rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.data.clone()))
            .collect::<Vec<_>>()
    }))
}

/// [`ChatTransport`] over the Telegram Bot API.
#[derive(Clone)]
pub struct TeloxideTransport {
    bot: Bot,
    username: Option<String>,
}

impl TeloxideTransport {
    pub fn new(bot: Bot, username: Option<String>) -> Self {
        Self { bot, username }
    }
}

#[async_trait]
impl ChatTransport for TeloxideTransport {
    fn bot_username(&self) -> Option<String> {
        self.username.clone()
    }

    async fn send_text(&self, chat_id: i64, text: &str, options: SendOptions) -> Result<i32, TransportError> {
        let mut req = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::MarkdownV2);
        if let Some(reply_to) = options.reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply());
        }
        if let Some(menu) = &options.keyboard {
            req = req.reply_markup(to_markup(menu));
        }
        Ok(req.await?.id.0)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
        options: SendOptions,
    ) -> Result<i32, TransportError> {
        let url = url::Url::parse(photo_url).map_err(|e| TransportError::Api(format!("bad photo url: {}", e)))?;
        let mut req = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::url(url))
            .caption(caption)
            .parse_mode(ParseMode::MarkdownV2);
        if let Some(reply_to) = options.reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply());
        }
        if let Some(menu) = &options.keyboard {
            req = req.reply_markup(to_markup(menu));
        }
        Ok(req.await?.id.0)
    }

    async fn send_audio(&self, chat_id: i64, file: &Path, meta: AudioMeta) -> Result<i32, TransportError> {
        let msg = self
            .bot
            .send_audio(ChatId(chat_id), InputFile::file(file.to_path_buf()))
            .title(meta.title)
            .performer(meta.performer)
            .caption(meta.caption)
            .parse_mode(ParseMode::MarkdownV2)
            .await?;
        Ok(msg.id.0)
    }

    async fn send_video(&self, chat_id: i64, file: &Path, meta: VideoMeta) -> Result<i32, TransportError> {
        let mut req = self
            .bot
            .send_video(ChatId(chat_id), InputFile::file(file.to_path_buf()))
            .caption(meta.caption)
            .parse_mode(ParseMode::MarkdownV2)
            .supports_streaming(true);
        if let Some(width) = meta.width {
            req = req.width(width);
        }
        if let Some(height) = meta.height {
            req = req.height(height);
        }
        Ok(req.await?.id.0)
    }

    async fn send_document(&self, chat_id: i64, file: &Path, file_name: &str) -> Result<i32, TransportError> {
        let input = InputFile::file(file.to_path_buf()).file_name(file_name.to_string());
        Ok(self.bot.send_document(ChatId(chat_id), input).await?.id.0)
    }

    async fn edit_caption_or_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), TransportError> {
        let caption_req = self
            .bot
            .edit_message_caption(ChatId(chat_id), MessageId(message_id))
            .caption(text)
            .parse_mode(ParseMode::MarkdownV2);

        match caption_req.await {
            Ok(_) => Ok(()),
            Err(_) => {
                self.bot
                    .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
                    .parse_mode(ParseMode::MarkdownV2)
                    .await?;
                Ok(())
            }
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), TransportError> {
        self.bot.delete_message(ChatId(chat_id), MessageId(message_id)).await?;
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), TransportError> {
        let mut req = self.bot.answer_callback_query(CallbackQueryId(query_id.to_string()));
        if let Some(text) = text {
            req = req.text(text).show_alert(true);
        }
        req.await?;
        Ok(())
    }
}

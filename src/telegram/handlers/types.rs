//! Handler types, dependencies, and update conversion helpers

use std::sync::Arc;

use teloxide::types::{CallbackQuery, Message};

use crate::download::pipeline::Pipeline;
use crate::telegram::transport::{CallbackEvent, ChatTransport, TextMessage};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub pipeline: Arc<Pipeline>,
    pub transport: Arc<dyn ChatTransport>,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(pipeline: Arc<Pipeline>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { pipeline, transport }
    }
}

/// Transport-neutral view of a text message; `None` for non-text updates.
pub fn text_message_from(msg: &Message) -> Option<TextMessage> {
    Some(TextMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: msg.text()?.to_string(),
    })
}

/// Transport-neutral view of a button press.
///
/// `None` when the pressed message is no longer known to Telegram or the
/// query carries no data (game buttons).
pub fn callback_event_from(q: &CallbackQuery) -> Option<CallbackEvent> {
    let message = q.message.as_ref()?;
    Some(CallbackEvent {
        chat_id: message.chat().id.0,
        message_id: message.id().0,
        query_id: q.id.0.clone(),
        data: q.data.clone()?,
    })
}

//! Command handler implementations (/start, /help)

use teloxide::types::Message;

use super::types::{HandlerDeps, HandlerError};
use crate::telegram::messages;
use crate::telegram::transport::SendOptions;

/// Handle /start and /help: both show the welcome text.
pub(super) async fn handle_welcome_command(msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let first_name = msg.from.as_ref().map(|u| u.first_name.as_str());
    let options = SendOptions {
        reply_to: Some(msg.id.0),
        keyboard: None,
    };

    deps.transport
        .send_text(msg.chat.id.0, &messages::welcome(first_name), options)
        .await?;
    Ok(())
}

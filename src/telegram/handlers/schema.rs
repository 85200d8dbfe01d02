//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::commands::handle_welcome_command;
use super::types::{callback_event_from, text_message_from, HandlerDeps, HandlerError};
use crate::telegram::bot::Command;

/// Creates the dispatcher schema for the bot.
///
/// Commands first, then plain text, then button presses. The same tree is
/// used for polling and webhook mode.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("🎯 Received command: {:?} from chat {}", cmd, msg.chat.id);

                match cmd {
                    Command::Start | Command::Help => handle_welcome_command(&msg, &deps).await?,
                }
                Ok(())
            }
        },
    ))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some())
        .endpoint(move |msg: Message| {
            let deps = deps.clone();
            async move {
                let Some(text_msg) = text_message_from(&msg) else {
                    return Ok(());
                };
                let report = deps.pipeline.handle_text(&text_msg).await;
                log::debug!(
                    "Message {} in chat {} ended at {}",
                    text_msg.message_id,
                    text_msg.chat_id,
                    report.final_stage()
                );
                Ok(())
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            let Some(event) = callback_event_from(&q) else {
                log::debug!("Ignoring callback {} without message or data", q.id.0);
                if let Err(e) = deps.transport.answer_callback(&q.id.0, None).await {
                    log::debug!("Failed to answer callback {}: {}", q.id.0, e);
                }
                return Ok(());
            };

            // Downloads take minutes; keep the chat's update queue moving.
            let pipeline = deps.pipeline.clone();
            tokio::spawn(async move {
                let report = pipeline.handle_callback(&event).await;
                match report.error() {
                    Some(e) => log::debug!("Callback in chat {} failed: {}", event.chat_id, e),
                    None => log::debug!("Callback in chat {} ended at {}", event.chat_id, report.final_stage()),
                }
            });
            Ok(())
        }
    })
}

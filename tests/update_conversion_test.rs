//! Conversion of raw Telegram updates into the pipeline's inputs
//!
//! Messages are built from Bot API JSON, the same way they arrive.

use pretty_assertions::assert_eq;
use teloxide::types::{CallbackQuery, Message};

use clipdrop::telegram::handlers::{callback_event_from, text_message_from};
use clipdrop::telegram::transport::{CallbackEvent, TextMessage};

fn message_json(message_id: i32, chat_id: i64, text: Option<&str>) -> serde_json::Value {
    let mut msg = serde_json::json!({
        "message_id": message_id,
        "date": 1234567890,
        "chat": {
            "id": chat_id,
            "type": "private",
            "first_name": "Test"
        },
        "from": {
            "id": chat_id,
            "is_bot": false,
            "first_name": "Test",
            "username": "testuser"
        }
    });
    if let Some(text) = text {
        msg["text"] = serde_json::Value::from(text);
    }
    msg
}

#[test]
fn test_text_message_from_update() {
    let msg: Message = serde_json::from_value(message_json(7, 123, Some("see https://example.com/v/1"))).unwrap();

    assert_eq!(
        text_message_from(&msg),
        Some(TextMessage {
            chat_id: 123,
            message_id: 7,
            text: "see https://example.com/v/1".to_string(),
        })
    );
}

#[test]
fn test_non_text_message_is_skipped() {
    let mut json = message_json(7, 123, None);
    json["dice"] = serde_json::json!({ "emoji": "🎲", "value": 3 });
    let msg: Message = serde_json::from_value(json).unwrap();

    assert_eq!(text_message_from(&msg), None);
}

#[test]
fn test_callback_event_from_query() {
    let query: CallbackQuery = serde_json::from_value(serde_json::json!({
        "id": "4382",
        "from": { "id": 123, "is_bot": false, "first_name": "Test" },
        "message": message_json(55, 123, Some("menu")),
        "chat_instance": "-1",
        "data": "cancel:0123456789abcdef"
    }))
    .unwrap();

    assert_eq!(
        callback_event_from(&query),
        Some(CallbackEvent {
            chat_id: 123,
            message_id: 55,
            query_id: "4382".to_string(),
            data: "cancel:0123456789abcdef".to_string(),
        })
    );
}

#[test]
fn test_callback_without_data_is_skipped() {
    let query: CallbackQuery = serde_json::from_value(serde_json::json!({
        "id": "4383",
        "from": { "id": 123, "is_bot": false, "first_name": "Test" },
        "message": message_json(55, 123, Some("menu")),
        "chat_instance": "-1",
        "game_short_name": "game"
    }))
    .unwrap();

    assert_eq!(callback_event_from(&query), None);
}

//! End-to-end request flows
//!
//! These tests drive the pipeline exactly the way the dispatcher does, with
//! an in-process transport and an extractor that never spawns yt-dlp.
//!
//! Run with: cargo test --test pipeline_flow_test

mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;

use clipdrop::download::{DownloadMode, ExtractError, RequestOutcome, Stage};
use clipdrop::storage::SqliteStore;
use clipdrop::RequestError;
use common::fixtures::CHAT_ID;
use common::{callback, serve_once, text_message, RecordedCall, ScriptedExtractor, TestEnvironment};

/// Sends a link and returns the token and menu message id.
async fn open_menu(env: &TestEnvironment, text: &str) -> (String, i32) {
    let report = env.pipeline.handle_text(&text_message(1, text)).await;
    let RequestOutcome::AwaitingChoice { token, .. } = report.outcome else {
        panic!("expected the menu, got {:?}", report.outcome);
    };
    let menu_id = env.transport.menu_message_id().expect("menu was sent");
    (token, menu_id)
}

/// Flow:
/// 1. User sends a message with a link in it
/// 2. Bot replies with the mode menu
/// 3. User presses Audio
/// 4. Bot downloads, uploads exactly one audio file and cleans up
#[tokio::test]
async fn e2e_link_to_audio_upload() {
    let env = TestEnvironment::new();

    let report = env
        .pipeline
        .handle_text(&text_message(1, "check this out https://example.com/v/123"))
        .await;
    assert_eq!(
        report.stages,
        vec![Stage::Idle, Stage::Analyzing, Stage::AwaitingModeChoice]
    );
    let RequestOutcome::AwaitingChoice { token, request } = report.outcome else {
        panic!("expected the menu");
    };
    assert_eq!(request.url, "https://example.com/v/123");
    assert_eq!(request.chat_id, CHAT_ID);
    assert_eq!(request.token, token);

    let menu_id = env.transport.menu_message_id().unwrap();
    let calls = env.transport.calls();
    let menu = calls
        .iter()
        .find_map(|c| match c {
            RecordedCall::SendPhoto { keyboard: Some(k), .. } => Some(k.clone()),
            _ => None,
        })
        .unwrap();
    let audio_button = menu
        .rows
        .iter()
        .flatten()
        .find(|b| b.data.starts_with("dl:audio:"))
        .unwrap();
    assert_eq!(audio_button.data, format!("dl:audio:{}", token));

    let report = env
        .pipeline
        .handle_callback(&callback("q1", menu_id, &audio_button.data))
        .await;
    assert_eq!(
        report.stages,
        vec![
            Stage::AwaitingModeChoice,
            Stage::Downloading,
            Stage::Uploading,
            Stage::Done
        ]
    );
    assert_eq!(
        report.outcome,
        RequestOutcome::Delivered {
            mode: Some(DownloadMode::AudioOnly)
        }
    );

    assert_eq!(env.transport.audio_uploads(), 1);
    assert_eq!(env.transport.video_uploads(), 0);
    assert!(env.transport.upload_saw_file());
    assert_eq!(env.extractor.download_count(), 1);
    assert_eq!(env.extractor.jobs()[0].prefix, token);
    assert!(env.leftover_files().is_empty(), "left behind: {:?}", env.leftover_files());

    // the menu turned into the status message and went away at the end
    assert!(env.transport.edits().iter().any(|e| e.contains("Downloading")));
    assert!(env
        .transport
        .calls()
        .contains(&RecordedCall::Delete { message_id: menu_id }));
}

#[tokio::test]
async fn e2e_best_mode_uploads_video() {
    let env = TestEnvironment::new();
    let (token, menu_id) = open_menu(&env, "https://example.com/v/9").await;

    let report = env
        .pipeline
        .handle_callback(&callback("q1", menu_id, &format!("dl:best:{}", token)))
        .await;

    assert_eq!(report.final_stage(), Stage::Done);
    assert_eq!(env.transport.video_uploads(), 1);
    assert_eq!(env.transport.audio_uploads(), 0);
    assert_eq!(env.extractor.jobs()[0].mode, DownloadMode::Best);
}

/// The second press on the same menu finds nothing to download.
#[tokio::test]
async fn e2e_second_press_is_rejected() {
    let env = TestEnvironment::new();
    let (token, menu_id) = open_menu(&env, "https://example.com/v/1").await;
    let data = format!("dl:mobile:{}", token);

    let first = env.pipeline.handle_callback(&callback("q1", menu_id, &data)).await;
    assert_eq!(first.final_stage(), Stage::Done);

    let second = env.pipeline.handle_callback(&callback("q2", menu_id, &data)).await;
    assert_eq!(second.error(), Some(&RequestError::ExpiredSession));
    assert_eq!(second.final_stage(), Stage::Failed);

    assert_eq!(env.extractor.download_count(), 1);
    assert_eq!(env.transport.video_uploads(), 1);
    assert_eq!(
        env.transport.answers().last().cloned().flatten(),
        Some(RequestError::ExpiredSession.user_message())
    );
}

#[tokio::test]
async fn e2e_concurrent_presses_download_once() {
    let env = TestEnvironment::new();
    let (token, menu_id) = open_menu(&env, "https://example.com/v/1").await;
    let best = format!("dl:best:{}", token);
    let audio = format!("dl:audio:{}", token);

    let cb_best = callback("q1", menu_id, &best);
    let cb_audio = callback("q2", menu_id, &audio);
    let (a, b) = tokio::join!(
        env.pipeline.handle_callback(&cb_best),
        env.pipeline.handle_callback(&cb_audio)
    );

    let delivered = [&a, &b]
        .iter()
        .filter(|r| matches!(r.outcome, RequestOutcome::Delivered { .. }))
        .count();
    assert_eq!(delivered, 1);
    assert_eq!(env.extractor.download_count(), 1);
}

#[tokio::test]
async fn e2e_unknown_token_never_downloads() {
    let env = TestEnvironment::new();

    let report = env
        .pipeline
        .handle_callback(&callback("q1", 77, "dl:best:deadbeefdeadbeef"))
        .await;

    assert_eq!(report.error(), Some(&RequestError::ExpiredSession));
    assert_eq!(env.extractor.download_count(), 0);
    assert_eq!(env.transport.video_uploads(), 0);
}

#[tokio::test]
async fn e2e_garbage_payload_is_answered() {
    let env = TestEnvironment::new();

    let report = env.pipeline.handle_callback(&callback("q1", 77, "rm -rf /")).await;

    assert!(matches!(report.error(), Some(RequestError::InvalidInput(_))));
    assert_eq!(env.transport.answers().len(), 1);
    assert_eq!(env.extractor.download_count(), 0);
}

#[tokio::test]
async fn e2e_press_from_another_chat_is_rejected() {
    let env = TestEnvironment::new();
    let (token, menu_id) = open_menu(&env, "https://example.com/v/1").await;

    let mut foreign = callback("q1", menu_id, &format!("dl:best:{}", token));
    foreign.chat_id = CHAT_ID + 1;
    let report = env.pipeline.handle_callback(&foreign).await;

    assert_eq!(report.error(), Some(&RequestError::ExpiredSession));
    assert_eq!(env.extractor.download_count(), 0);
}

#[tokio::test]
async fn e2e_cancel_discards_the_request() {
    let env = TestEnvironment::new();
    let (token, menu_id) = open_menu(&env, "https://example.com/v/1").await;

    let report = env
        .pipeline
        .handle_callback(&callback("q1", menu_id, &format!("cancel:{}", token)))
        .await;
    assert_eq!(report.outcome, RequestOutcome::Cancelled { token: token.clone() });
    assert_eq!(report.final_stage(), Stage::Done);
    assert!(env
        .transport
        .calls()
        .contains(&RecordedCall::Delete { message_id: menu_id }));

    let late = env
        .pipeline
        .handle_callback(&callback("q2", menu_id, &format!("dl:best:{}", token)))
        .await;
    assert_eq!(late.error(), Some(&RequestError::ExpiredSession));
    assert_eq!(env.extractor.download_count(), 0);
}

#[tokio::test]
async fn e2e_message_without_link() {
    let env = TestEnvironment::new();

    let report = env.pipeline.handle_text(&text_message(1, "hello there")).await;

    assert!(matches!(report.error(), Some(RequestError::InvalidInput(_))));
    assert_eq!(report.stages, vec![Stage::Idle, Stage::Failed]);
    let calls = env.transport.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], RecordedCall::SendText { text, keyboard: None, .. } if text.contains("No valid link")));
    assert_eq!(env.pipeline.correlator().len().await.unwrap(), 0);
}

#[tokio::test]
async fn e2e_menu_falls_back_to_text_when_photo_fails() {
    let env = TestEnvironment::new();
    env.transport.fail_photos();

    let (token, _) = open_menu(&env, "https://example.com/v/1").await;

    let calls = env.transport.calls();
    let menu_text = calls.iter().find_map(|c| match c {
        RecordedCall::SendText {
            keyboard: Some(k), text, ..
        } => Some((k.clone(), text.clone())),
        _ => None,
    });
    let (keyboard, text) = menu_text.expect("text menu");
    assert!(text.contains("Sample clip"));
    assert!(keyboard
        .rows
        .iter()
        .flatten()
        .any(|b| b.data == format!("cancel:{}", token)));
}

#[tokio::test]
async fn e2e_extractor_size_limit() {
    let env = TestEnvironment::with_extractor(ScriptedExtractor::failing_with(ExtractError::SizeExceeded));
    let (token, menu_id) = open_menu(&env, "https://example.com/v/1").await;

    let report = env
        .pipeline
        .handle_callback(&callback("q1", menu_id, &format!("dl:best:{}", token)))
        .await;

    assert_eq!(report.error(), Some(&RequestError::SizeExceeded));
    assert_eq!(
        report.stages,
        vec![Stage::AwaitingModeChoice, Stage::Downloading, Stage::Failed]
    );
    assert_eq!(env.transport.video_uploads(), 0);
    assert!(env.transport.edits().iter().any(|e| e.contains("File Too Large")));
    // the partial file is gone too
    assert!(env.leftover_files().is_empty(), "left behind: {:?}", env.leftover_files());
}

#[tokio::test]
async fn e2e_extractor_failure_shows_diagnostic() {
    let env = TestEnvironment::with_extractor(ScriptedExtractor::failing_with(ExtractError::Failed(
        "ERROR: Unsupported URL".to_string(),
    )));
    let (token, menu_id) = open_menu(&env, "https://example.com/v/1").await;

    let report = env
        .pipeline
        .handle_callback(&callback("q1", menu_id, &format!("dl:audio:{}", token)))
        .await;

    assert!(matches!(report.error(), Some(RequestError::ExtractionFailure(d)) if d.contains("Unsupported URL")));
    let failure_notices = env
        .transport
        .edits()
        .into_iter()
        .filter(|e| e.contains("Error Occurred"))
        .count();
    assert_eq!(failure_notices, 1);
}

#[tokio::test]
async fn e2e_upload_rejected_as_too_large() {
    let env = TestEnvironment::new();
    env.transport.reject_uploads_as_too_large();
    let (token, menu_id) = open_menu(&env, "https://example.com/v/1").await;

    let report = env
        .pipeline
        .handle_callback(&callback("q1", menu_id, &format!("dl:best:{}", token)))
        .await;

    assert_eq!(report.error(), Some(&RequestError::SizeExceeded));
    assert_eq!(
        report.stages,
        vec![
            Stage::AwaitingModeChoice,
            Stage::Downloading,
            Stage::Uploading,
            Stage::Failed
        ]
    );
    assert!(env.transport.upload_saw_file());
    assert!(env.leftover_files().is_empty(), "left behind: {:?}", env.leftover_files());
}

/// The menu is answered by a different pipeline instance sharing only the
/// SQLite file, like two invocations of a webhook deployment.
#[tokio::test]
async fn e2e_menu_survives_restart_with_sqlite_store() {
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("pending.sqlite");
    let db_path = db_path.to_str().unwrap();

    let first = TestEnvironment::with_parts(
        ScriptedExtractor::new(),
        Arc::new(SqliteStore::open(db_path).unwrap()),
    );
    let (token, menu_id) = open_menu(&first, "https://example.com/v/42").await;
    drop(first);

    let second = TestEnvironment::with_parts(
        ScriptedExtractor::new(),
        Arc::new(SqliteStore::open(db_path).unwrap()),
    );
    let report = second
        .pipeline
        .handle_callback(&callback("q1", menu_id, &format!("dl:audio:{}", token)))
        .await;

    assert_eq!(report.final_stage(), Stage::Done);
    assert_eq!(second.extractor.jobs()[0].url, "https://example.com/v/42");
    assert_eq!(second.transport.audio_uploads(), 1);
    assert_eq!(second.pipeline.correlator().len().await.unwrap(), 0);
}

#[tokio::test]
async fn e2e_metadata_failure_is_shown_on_the_status_message() {
    let env = TestEnvironment::with_extractor(ScriptedExtractor::failing_metadata(ExtractError::Failed(
        "ERROR: Private video".to_string(),
    )));

    let report = env.pipeline.handle_text(&text_message(1, "https://example.com/v/1")).await;

    assert!(matches!(report.error(), Some(RequestError::ExtractionFailure(d)) if d.contains("Private video")));
    assert_eq!(report.stages, vec![Stage::Idle, Stage::Analyzing, Stage::Failed]);
    // status message 1000 carries the notice; no menu, nothing registered
    assert_eq!(
        env.transport
            .calls()
            .iter()
            .filter(|c| matches!(c, RecordedCall::Edit { message_id: 1000, text } if text.contains("Error Occurred")))
            .count(),
        1
    );
    assert_eq!(env.transport.menu_message_id(), None);
    assert_eq!(env.pipeline.correlator().len().await.unwrap(), 0);
}

#[tokio::test]
async fn e2e_malformed_link_is_invalid_input() {
    let env = TestEnvironment::new();

    let report = env.pipeline.handle_text(&text_message(1, "look https://[")).await;

    assert!(matches!(report.error(), Some(RequestError::InvalidInput(_))));
    assert_eq!(report.final_stage(), Stage::Failed);
    assert!(env.transport.edits().iter().any(|e| e.contains("No valid link")));
    assert_eq!(env.transport.menu_message_id(), None);
}

/// Both the photo and the text menu are refused: the status message must
/// still be there to show the failure.
#[tokio::test]
async fn e2e_refused_menu_still_notifies_the_user() {
    let env = TestEnvironment::new();
    env.transport.reject_menus();

    let report = env.pipeline.handle_text(&text_message(1, "https://example.com/v/1")).await;

    assert!(matches!(report.error(), Some(RequestError::TransportFailure(_))));
    let calls = env.transport.calls();
    assert!(!calls.contains(&RecordedCall::Delete { message_id: 1000 }));
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, RecordedCall::Edit { message_id: 1000, .. }))
            .count(),
        1
    );
    assert_eq!(env.pipeline.correlator().len().await.unwrap(), 0);
}

#[tokio::test]
async fn e2e_reported_file_missing_on_disk() {
    let env = TestEnvironment::with_extractor(ScriptedExtractor::reporting_missing_file());
    let (token, menu_id) = open_menu(&env, "https://example.com/v/1").await;

    let report = env
        .pipeline
        .handle_callback(&callback("q1", menu_id, &format!("dl:best:{}", token)))
        .await;

    assert!(matches!(report.error(), Some(RequestError::FileNotFound(_))));
    assert_eq!(
        report.stages,
        vec![Stage::AwaitingModeChoice, Stage::Downloading, Stage::Failed]
    );
    assert_eq!(env.transport.video_uploads(), 0);
    assert!(env.transport.edits().iter().any(|e| e.contains("File not found")));
}

/// Flow:
/// 1. User sends a link to an `.ics` file
/// 2. Bot fetches it directly, no menu
/// 3. Bot sends it as a document and removes status message and file
#[tokio::test]
async fn e2e_calendar_link_is_sent_as_document() {
    let env = TestEnvironment::new();
    let base = serve_once("200 OK", b"BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n".to_vec(), true).await;

    let report = env
        .pipeline
        .handle_text(&text_message(1, &format!("{}/cal/team.ics", base)))
        .await;

    assert_eq!(report.outcome, RequestOutcome::Delivered { mode: None });
    assert_eq!(
        report.stages,
        vec![
            Stage::Idle,
            Stage::Analyzing,
            Stage::Downloading,
            Stage::Uploading,
            Stage::Done
        ]
    );
    let calls = env.transport.calls();
    assert!(calls.contains(&RecordedCall::SendDocument {
        chat_id: CHAT_ID,
        file_name: "team.ics".to_string(),
    }));
    assert!(env.transport.upload_saw_file());
    assert!(calls.contains(&RecordedCall::Delete { message_id: 1000 }));
    assert_eq!(env.transport.menu_message_id(), None);
    assert!(env.leftover_files().is_empty(), "left behind: {:?}", env.leftover_files());
}

#[tokio::test]
async fn e2e_calendar_http_error_is_extraction_failure() {
    let env = TestEnvironment::new();
    let base = serve_once("404 Not Found", b"nope".to_vec(), true).await;

    let report = env
        .pipeline
        .handle_text(&text_message(1, &format!("{}/missing.ics", base)))
        .await;

    assert!(matches!(report.error(), Some(RequestError::ExtractionFailure(_))));
    assert!(env.transport.edits().iter().any(|e| e.contains("Error Occurred")));
    assert!(env.leftover_files().is_empty(), "left behind: {:?}", env.leftover_files());
}

#[tokio::test]
async fn e2e_calendar_over_ceiling_with_announced_length() {
    let env = TestEnvironment::with_size_ceiling(1_000);
    let base = serve_once("200 OK", vec![b'x'; 5_000], true).await;

    let report = env
        .pipeline
        .handle_text(&text_message(1, &format!("{}/big.ics", base)))
        .await;

    assert_eq!(report.error(), Some(&RequestError::SizeExceeded));
    assert!(!env
        .transport
        .calls()
        .iter()
        .any(|c| matches!(c, RecordedCall::SendDocument { .. })));
    assert!(env.leftover_files().is_empty(), "left behind: {:?}", env.leftover_files());
}

#[tokio::test]
async fn e2e_calendar_over_ceiling_while_streaming() {
    let env = TestEnvironment::with_size_ceiling(1_000);
    let base = serve_once("200 OK", vec![b'x'; 50_000], false).await;

    let report = env
        .pipeline
        .handle_text(&text_message(1, &format!("{}/big.ics", base)))
        .await;

    assert_eq!(report.error(), Some(&RequestError::SizeExceeded));
    assert!(env.transport.edits().iter().any(|e| e.contains("File Too Large")));
    assert!(env.leftover_files().is_empty(), "left behind: {:?}", env.leftover_files());
}

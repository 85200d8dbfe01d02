//! In-process chat transport that records every outbound call
//!
//! Message ids are handed out from a counter so tests can follow which
//! message a later edit or delete refers to.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use clipdrop::telegram::keyboard::InlineMenu;
use clipdrop::telegram::transport::{AudioMeta, ChatTransport, SendOptions, TransportError, VideoMeta};

/// One outbound API call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    SendText {
        chat_id: i64,
        text: String,
        keyboard: Option<InlineMenu>,
    },
    SendPhoto {
        chat_id: i64,
        caption: String,
        keyboard: Option<InlineMenu>,
    },
    SendAudio {
        chat_id: i64,
        path: PathBuf,
        title: String,
    },
    SendVideo {
        chat_id: i64,
        path: PathBuf,
    },
    SendDocument {
        chat_id: i64,
        file_name: String,
    },
    Edit {
        message_id: i32,
        text: String,
    },
    Delete {
        message_id: i32,
    },
    Answer {
        query_id: String,
        text: Option<String>,
    },
}

pub struct RecordingTransport {
    calls: Mutex<Vec<RecordedCall>>,
    next_id: AtomicI32,
    fail_photo: AtomicBool,
    reject_menus: AtomicBool,
    reject_uploads_as_too_large: AtomicBool,
    /// Whether the uploaded file still existed when the upload call ran
    upload_saw_file: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(1000),
            fail_photo: AtomicBool::new(false),
            reject_menus: AtomicBool::new(false),
            reject_uploads_as_too_large: AtomicBool::new(false),
            upload_saw_file: AtomicBool::new(false),
        }
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every photo send fails, forcing the text fallback.
    pub fn fail_photos(&self) {
        self.fail_photo.store(true, Ordering::SeqCst);
    }

    /// Any message carrying a keyboard is refused, photo or text.
    pub fn reject_menus(&self) {
        self.reject_menus.store(true, Ordering::SeqCst);
    }

    /// Audio and video uploads fail the way the Bot API rejects oversized files.
    pub fn reject_uploads_as_too_large(&self) {
        self.reject_uploads_as_too_large.store(true, Ordering::SeqCst);
    }

    pub fn upload_saw_file(&self) -> bool {
        self.upload_saw_file.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Id of the message carrying the mode menu, if one was sent.
    pub fn menu_message_id(&self) -> Option<i32> {
        // ids are assigned in call order, so replay the counter
        let mut id = 1000;
        for call in self.calls() {
            match call {
                RecordedCall::SendText { keyboard: Some(_), .. } | RecordedCall::SendPhoto { keyboard: Some(_), .. } => {
                    return Some(id)
                }
                RecordedCall::SendText { .. }
                | RecordedCall::SendPhoto { .. }
                | RecordedCall::SendAudio { .. }
                | RecordedCall::SendVideo { .. }
                | RecordedCall::SendDocument { .. } => id += 1,
                _ => {}
            }
        }
        None
    }

    pub fn audio_uploads(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::SendAudio { .. }))
    }

    pub fn video_uploads(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::SendVideo { .. }))
    }

    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCall::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn answers(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCall::Answer { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&RecordedCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_message_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn bot_username(&self) -> Option<String> {
        Some("clipdrop_test_bot".to_string())
    }

    async fn send_text(&self, chat_id: i64, text: &str, options: SendOptions) -> Result<i32, TransportError> {
        if options.keyboard.is_some() && self.reject_menus.load(Ordering::SeqCst) {
            return Err(TransportError::Api("Bad Request: menu refused".to_string()));
        }
        self.record(RecordedCall::SendText {
            chat_id,
            text: text.to_string(),
            keyboard: options.keyboard,
        });
        Ok(self.next_message_id())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _photo_url: &str,
        caption: &str,
        options: SendOptions,
    ) -> Result<i32, TransportError> {
        let refused = options.keyboard.is_some() && self.reject_menus.load(Ordering::SeqCst);
        if refused || self.fail_photo.load(Ordering::SeqCst) {
            return Err(TransportError::Api("Bad Request: wrong file identifier".to_string()));
        }
        self.record(RecordedCall::SendPhoto {
            chat_id,
            caption: caption.to_string(),
            keyboard: options.keyboard,
        });
        Ok(self.next_message_id())
    }

    async fn send_audio(&self, chat_id: i64, file: &Path, meta: AudioMeta) -> Result<i32, TransportError> {
        self.upload_saw_file.store(file.is_file(), Ordering::SeqCst);
        if self.reject_uploads_as_too_large.load(Ordering::SeqCst) {
            return Err(TransportError::from_description("Bad Request: Request Entity Too Large"));
        }
        self.record(RecordedCall::SendAudio {
            chat_id,
            path: file.to_path_buf(),
            title: meta.title,
        });
        Ok(self.next_message_id())
    }

    async fn send_video(&self, chat_id: i64, file: &Path, _meta: VideoMeta) -> Result<i32, TransportError> {
        self.upload_saw_file.store(file.is_file(), Ordering::SeqCst);
        if self.reject_uploads_as_too_large.load(Ordering::SeqCst) {
            return Err(TransportError::from_description("Bad Request: Request Entity Too Large"));
        }
        self.record(RecordedCall::SendVideo {
            chat_id,
            path: file.to_path_buf(),
        });
        Ok(self.next_message_id())
    }

    async fn send_document(&self, chat_id: i64, file: &Path, file_name: &str) -> Result<i32, TransportError> {
        self.upload_saw_file.store(file.is_file(), Ordering::SeqCst);
        self.record(RecordedCall::SendDocument {
            chat_id,
            file_name: file_name.to_string(),
        });
        Ok(self.next_message_id())
    }

    async fn edit_caption_or_text(&self, _chat_id: i64, message_id: i32, text: &str) -> Result<(), TransportError> {
        self.record(RecordedCall::Edit {
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, _chat_id: i64, message_id: i32) -> Result<(), TransportError> {
        self.record(RecordedCall::Delete { message_id });
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), TransportError> {
        self.record(RecordedCall::Answer {
            query_id: query_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}

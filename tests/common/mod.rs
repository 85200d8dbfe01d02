//! Common test utilities
//!
//! This module is shared across all integration tests

pub mod fixtures;
pub mod recorder;

#[allow(unused_imports)]
pub use fixtures::{callback, serve_once, text_message, ScriptedExtractor, TestEnvironment};
#[allow(unused_imports)]
pub use recorder::{RecordedCall, RecordingTransport};

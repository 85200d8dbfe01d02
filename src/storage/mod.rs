//! Request correlation storage
//!
//! A pending request is what the bot remembers between sending the quality
//! menu and the user pressing one of its buttons. The button payload only
//! carries a short token; everything else lives in a [`CorrelationStore`].
//!
//! Two stores are provided:
//! - [`MemoryStore`] for a single long-running process (polling mode)
//! - [`SqliteStore`] for deployments where the process may be restarted or
//!   replaced between the two round-trips (webhook / serverless hosting)

pub mod correlator;
pub mod db;
pub mod memory;
pub mod migrations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::core::error::AppResult;
use crate::download::mode::DownloadMode;

// Re-exports for convenience
pub use correlator::{generate_token, Correlator, TOKEN_LEN};
pub use db::{create_pool, get_connection, DbConnection, DbPool, SqliteStore};
pub use memory::MemoryStore;

/// A URL waiting for the user to pick a download mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Opaque key carried in the button payloads; assigned by [`Correlator::register`]
    pub token: String,
    /// Source URL exactly as extracted from the user's message
    pub url: String,
    /// Set once, when a mode button is pressed
    pub mode: Option<DownloadMode>,
    pub created_at: DateTime<Utc>,
    /// Chat the menu was sent to
    pub chat_id: i64,
    /// Message that contained the link
    pub origin_message_id: i32,
}

impl PendingRequest {
    pub fn new(url: impl Into<String>, chat_id: i64, origin_message_id: i32) -> Self {
        Self {
            token: String::new(),
            url: url.into(),
            mode: None,
            created_at: Utc::now(),
            chat_id,
            origin_message_id,
        }
    }

    /// Returns the request with the chosen mode recorded.
    pub fn with_mode(mut self, mode: DownloadMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// True when `created_at + ttl < now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.created_at < expiry_cutoff(now, ttl)
    }
}

/// Oldest `created_at` that is still alive at `now`.
pub(crate) fn expiry_cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    // Clamp to ~100 years so the conversion to a signed duration cannot overflow.
    const MAX_TTL_MS: u128 = 100 * 365 * 24 * 60 * 60 * 1000;
    let ttl_ms = ttl.as_millis().min(MAX_TTL_MS) as i64;
    now.checked_sub_signed(chrono::Duration::milliseconds(ttl_ms))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Backing store for pending requests.
///
/// Implementations must be safe to call concurrently from many in-flight
/// requests, and `take` must hand a given entry to at most one caller.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Human-readable backend name, for logs
    fn name(&self) -> &'static str;

    /// Stores the request under `request.token`.
    ///
    /// Returns `false` and stores nothing when the token is already taken.
    async fn insert(&self, request: &PendingRequest) -> AppResult<bool>;

    /// Removes and returns the entry for `token`, if any.
    async fn take(&self, token: &str) -> AppResult<Option<PendingRequest>>;

    /// Removes every entry created strictly before `cutoff`; returns how many.
    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize>;

    /// Number of live entries.
    async fn len(&self) -> AppResult<usize>;
}

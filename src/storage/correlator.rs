//! Token to pending-request correlation with use-once and TTL semantics

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{expiry_cutoff, CorrelationStore, PendingRequest};
use crate::core::error::{AppError, AppResult};

/// Length of generated tokens, in hex characters.
pub const TOKEN_LEN: usize = 16;

/// Attempts at finding an unused token before giving up.
const REGISTER_ATTEMPTS: usize = 3;

/// Generates a short random token (64 bits of a v4 UUID, hex encoded).
pub fn generate_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(TOKEN_LEN);
    token
}

/// Maps button tokens back to the request that produced the menu.
pub struct Correlator {
    store: Arc<dyn CorrelationStore>,
    ttl: Duration,
}

impl Correlator {
    pub fn new(store: Arc<dyn CorrelationStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    /// Stores `request` under a fresh token and returns the token.
    pub async fn register(&self, mut request: PendingRequest) -> AppResult<String> {
        for _ in 0..REGISTER_ATTEMPTS {
            request.token = generate_token();
            if self.store.insert(&request).await? {
                log::debug!(
                    "Registered {} for chat {} ({})",
                    request.token,
                    request.chat_id,
                    self.store.name()
                );
                return Ok(request.token);
            }
            log::warn!("Token collision on {}, regenerating", request.token);
        }
        Err(AppError::Validation("could not allocate a unique token".to_string()))
    }

    /// Consumes the entry for `token`.
    ///
    /// Returns `None` for unknown, already consumed and expired tokens, and
    /// when the press comes from a chat other than the one the menu was
    /// sent to. Store errors are logged and treated the same way.
    pub async fn resolve(&self, token: &str, chat_id: i64) -> Option<PendingRequest> {
        let request = match self.store.take(token).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                log::debug!("Token {} not found", token);
                return None;
            }
            Err(e) => {
                log::error!("Failed to resolve token {}: {}", token, e);
                return None;
            }
        };

        if request.is_expired(Utc::now(), self.ttl) {
            log::debug!("Token {} expired (created {})", token, request.created_at);
            return None;
        }
        if request.chat_id != chat_id {
            log::warn!(
                "Token {} pressed in chat {} but registered for chat {}",
                token,
                chat_id,
                request.chat_id
            );
            return None;
        }
        Some(request)
    }

    /// Drops the entry for `token` without using it.
    pub async fn discard(&self, token: &str) {
        match self.store.take(token).await {
            Ok(Some(_)) => log::debug!("Discarded token {}", token),
            Ok(None) => {}
            Err(e) => log::warn!("Failed to discard token {}: {}", token, e),
        }
    }

    /// Removes every entry with `created_at + ttl < now`.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        self.store.remove_created_before(expiry_cutoff(now, self.ttl)).await
    }

    /// Number of live entries, expired ones included until the next eviction.
    pub async fn len(&self) -> AppResult<usize> {
        self.store.len().await
    }

    /// Runs `evict_expired` every `interval` until the runtime shuts down.
    pub fn spawn_eviction_task(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            log::info!(
                "🧹 Correlator eviction started ({} store, ttl {}s, every {}s)",
                self.backend(),
                self.ttl.as_secs(),
                interval.as_secs()
            );

            loop {
                tokio::time::sleep(interval).await;

                match self.evict_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => log::info!("🧹 Evicted {} expired pending requests", removed),
                    Err(e) => log::warn!("Correlator eviction failed: {}", e),
                }
            }
        })
    }
}

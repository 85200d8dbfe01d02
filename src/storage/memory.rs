use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{CorrelationStore, PendingRequest};
use crate::core::error::AppResult;

/// Process-local correlation table.
///
/// Entries vanish with the process, which the correlator reports as an
/// expired session. Use [`super::SqliteStore`] when the process is not
/// guaranteed to survive between the menu and the button press.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, PendingRequest>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorrelationStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, request: &PendingRequest) -> AppResult<bool> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&request.token) {
            return Ok(false);
        }
        entries.insert(request.token.clone(), request.clone());
        Ok(true)
    }

    async fn take(&self, token: &str) -> AppResult<Option<PendingRequest>> {
        Ok(self.entries.lock().await.remove(token))
    }

    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, req| req.created_at >= cutoff);
        Ok(before - entries.len())
    }

    async fn len(&self) -> AppResult<usize> {
        Ok(self.entries.lock().await.len())
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: OffsetDateTime,
}

impl RateLimitEntry {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.reset_at
    }
}

/// Keyed counter backing the limiter. The in-process map is the default; a
/// shared cache can implement this for multi-instance deployments.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<RateLimitEntry>>;
    async fn set(&self, key: &str, entry: RateLimitEntry) -> anyhow::Result<()>;
    /// Drops every entry whose window has ended; returns how many were removed.
    async fn sweep(&self, now: OffsetDateTime) -> anyhow::Result<usize>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<RateLimitEntry>> {
        Ok(self.entries.lock().await.get(key).copied())
    }

    async fn set(&self, key: &str, entry: RateLimitEntry) -> anyhow::Result<()> {
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn sweep(&self, now: OffsetDateTime) -> anyhow::Result<usize> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(before - entries.len())
    }
}

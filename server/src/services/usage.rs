//! Usage counter: monthly analysis counts with a short-lived in-memory cache.
//!
//! DESIGN
//! ======
//! Counts live in Supabase (one row per analysis); this service only reads
//! and appends. Reads are cached per user for `USAGE_CACHE_TTL_SECS` behind a
//! `Mutex<HashMap<..>>`, pruned lazily on access. Recording an analysis
//! always re-counts from the source before enforcing the limit, then drops
//! the cached entry.
//!
//! TRADE-OFFS
//! ==========
//! Two concurrent `record` calls can both pass the limit check. The dashboard
//! records one analysis per user action, so the overshoot is bounded by the
//! number of tabs a user has open.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use time::OffsetDateTime;

pub const DEFAULT_MONTHLY_LIMIT: u64 = 50;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;
pub const DEFAULT_USAGE_TABLE: &str = "analyses";

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("monthly analysis limit reached ({limit})")]
    LimitReached { limit: u64 },
    #[error("usage store request failed: {0}")]
    Store(String),
    #[error("usage store returned {status}: {message}")]
    StoreStatus { status: u16, message: String },
    #[error("unparseable usage count: {0}")]
    BadCount(String),
}

/// Monthly usage as returned by `GET /api/usage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
}

impl UsageReport {
    #[must_use]
    pub fn new(used: u64, limit: u64) -> Self {
        Self { used, limit, remaining: limit.saturating_sub(used) }
    }
}

/// First instant of the month containing `now`, RFC 3339.
#[must_use]
pub fn month_start(now: OffsetDateTime) -> String {
    format!("{:04}-{:02}-01T00:00:00Z", now.year(), u8::from(now.month()))
}

// =============================================================================
// SOURCE
// =============================================================================

/// Backing store for analysis rows.
#[async_trait::async_trait]
pub trait UsageSource: Send + Sync {
    /// Number of analyses by `user_id` created at or after `since`.
    async fn count_since(&self, user_id: &str, since: &str) -> Result<u64, UsageError>;

    /// Append one analysis row for `user_id`.
    async fn record(&self, user_id: &str) -> Result<(), UsageError>;
}

/// Supabase PostgREST implementation using the service-role key.
pub struct SupabaseUsage {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    table: String,
}

impl SupabaseUsage {
    #[must_use]
    pub fn new(base_url: &str, service_key: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            service_key: service_key.into(),
            table: table.into(),
        }
    }

    fn table_endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

/// Total from a PostgREST `Content-Range` header (`0-0/42`, `*/0`).
pub(crate) fn parse_content_range_total(header: &str) -> Result<u64, UsageError> {
    header
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse::<u64>().ok())
        .ok_or_else(|| UsageError::BadCount(header.to_owned()))
}

async fn status_error(resp: reqwest::Response) -> UsageError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    UsageError::StoreStatus { status, message }
}

#[async_trait::async_trait]
impl UsageSource for SupabaseUsage {
    async fn count_since(&self, user_id: &str, since: &str) -> Result<u64, UsageError> {
        let user_filter = format!("eq.{user_id}");
        let since_filter = format!("gte.{since}");
        let resp = self
            .http
            .head(self.table_endpoint())
            .query(&[("select", "id"), ("user_id", user_filter.as_str()), ("created_at", since_filter.as_str())])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| UsageError::Store(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UsageError::BadCount("missing content-range".to_owned()))?;
        parse_content_range_total(range)
    }

    async fn record(&self, user_id: &str) -> Result<(), UsageError> {
        let resp = self
            .http
            .post(self.table_endpoint())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "user_id": user_id }))
            .send()
            .await
            .map_err(|e| UsageError::Store(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(())
    }
}

// =============================================================================
// CACHE
// =============================================================================

struct CacheEntry {
    used: u64,
    stored_at: Instant,
}

/// Per-user TTL cache of monthly counts.
#[derive(Clone)]
pub struct UsageCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl UsageCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), ttl }
    }

    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<u64> {
        self.get_at(user_id, Instant::now())
    }

    fn get_at(&self, user_id: &str, now: Instant) -> Option<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        entries.retain(|_, e| now.duration_since(e.stored_at) < ttl);
        entries.get(user_id).map(|e| e.used)
    }

    pub fn insert(&self, user_id: &str, used: u64) {
        self.insert_at(user_id, used, Instant::now());
    }

    fn insert_at(&self, user_id: &str, used: u64, now: Instant) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_owned(), CacheEntry { used, stored_at: now });
    }

    pub fn invalidate(&self, user_id: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// =============================================================================
// SERVICE
// =============================================================================

pub struct UsageService {
    source: Arc<dyn UsageSource>,
    cache: UsageCache,
    monthly_limit: u64,
}

impl UsageService {
    #[must_use]
    pub fn new(source: Arc<dyn UsageSource>, cache: UsageCache, monthly_limit: u64) -> Self {
        Self { source, cache, monthly_limit }
    }

    /// Current-month usage, served from cache when fresh.
    pub async fn report(&self, user_id: &str) -> Result<UsageReport, UsageError> {
        if let Some(used) = self.cache.get(user_id) {
            return Ok(UsageReport::new(used, self.monthly_limit));
        }
        let used = self.fresh_count(user_id).await?;
        self.cache.insert(user_id, used);
        tracing::debug!(user_id, used, cached_users = self.cache.len(), "usage counted");
        Ok(UsageReport::new(used, self.monthly_limit))
    }

    /// Record one analysis if the user is under the monthly limit.
    pub async fn record(&self, user_id: &str) -> Result<UsageReport, UsageError> {
        let used = self.fresh_count(user_id).await?;
        if used >= self.monthly_limit {
            self.cache.insert(user_id, used);
            return Err(UsageError::LimitReached { limit: self.monthly_limit });
        }
        self.source.record(user_id).await?;
        self.cache.invalidate(user_id);
        tracing::info!(user_id, used = used + 1, limit = self.monthly_limit, "analysis recorded");
        Ok(UsageReport::new(used + 1, self.monthly_limit))
    }

    async fn fresh_count(&self, user_id: &str) -> Result<u64, UsageError> {
        let since = month_start(OffsetDateTime::now_utc());
        self.source.count_since(user_id, &since).await
    }
}

#[cfg(test)]
#[path = "usage_test.rs"]
mod tests;

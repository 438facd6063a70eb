//! Idempotency coordinator
//!
//! Requests carrying an `idempotencyKey` are executed at most once per key
//! and request fingerprint within the record TTL. The first arrival claims
//! the key by atomically storing a PROCESSING record; later arrivals either
//! get a conflict (still processing) or the cached response (completed).
//!
//! Records are never deleted, they only expire. If a claimed dispatch is
//! dropped without completing, the PROCESSING record blocks the key until it
//! expires.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{GateError, Result};
use crate::types::{PostRequest, PublishOutcome};

/// How many times a claim is retried when the record expires between the
/// failed claim and the follow-up read
const CLAIM_ATTEMPTS: usize = 3;

/// Key-value store with per-entry expiry
#[async_trait]
pub trait TtlCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Store `value` only if `key` is absent or expired
    ///
    /// Returns `true` when the value was stored. Must be atomic with respect
    /// to concurrent callers.
    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> Result<bool>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// In-process `TtlCache`; expired entries are dropped lazily
#[derive(Debug, Default)]
pub struct MemoryTtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryTtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| !e.is_expired()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| GateError::Cache("cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl TtlCache for MemoryTtlCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let mut entries = self.lock()?;
        entries.retain(|_, entry| !entry.is_expired());
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> Result<bool> {
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|entry| !entry.is_expired()) {
            return Ok(false);
        }
        entries.retain(|_, entry| !entry.is_expired());
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdempotencyRecord {
    pub status: IdempotencyStatus,
    /// Present only once the request has completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<PublishOutcome>,
}

/// Outcome of the dedup gate
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// No idempotency key; dispatch without recording anything
    Untracked,
    /// Key claimed; the caller must dispatch and then complete it
    Claimed(String),
    /// Key already completed; return the cached response as is
    Replay(PublishOutcome),
}

pub struct IdempotencyCoordinator {
    cache: Arc<dyn TtlCache>,
    ttl: Duration,
}

impl IdempotencyCoordinator {
    pub fn new(cache: Arc<dyn TtlCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Derive the cache key, `None` when the request carries no idempotency key
    ///
    /// The fingerprint covers the fields that change what gets published, in
    /// a fixed order. Object keys are sorted recursively before hashing, so
    /// auth and options are order-independent.
    pub fn build_key(request: &PostRequest) -> Option<String> {
        let client_key = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())?;

        let canonical = canonicalize(json!([
            request.platform.trim().to_lowercase(),
            request.channel_name(),
            request.auth,
            request.body,
            request.post_type,
            request.cover,
            request.video,
            request.audio,
            request.document,
            request.media,
            request.options,
        ]));

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Some(format!("idempotency:{}:{:x}", client_key, hasher.finalize()))
    }

    pub async fn get_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        match self.cache.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| GateError::Cache(format!("corrupt idempotency record: {}", e))),
            None => Ok(None),
        }
    }

    /// Atomically claim `key`; `false` if a live record already exists
    pub async fn set_processing(&self, key: &str) -> Result<bool> {
        let record = IdempotencyRecord {
            status: IdempotencyStatus::Processing,
            response: None,
        };
        self.cache
            .set_if_absent(key, to_value(&record)?, self.ttl)
            .await
    }

    pub async fn set_completed(&self, key: &str, outcome: &PublishOutcome) -> Result<()> {
        let record = IdempotencyRecord {
            status: IdempotencyStatus::Completed,
            response: Some(outcome.clone()),
        };
        self.cache.set(key, to_value(&record)?, self.ttl).await
    }

    /// Run the dedup gate for `request`
    ///
    /// # Errors
    ///
    /// Returns `GateError::Conflict` while another dispatch holds the key.
    pub async fn begin(&self, request: &PostRequest) -> Result<Admission> {
        let Some(key) = Self::build_key(request) else {
            return Ok(Admission::Untracked);
        };

        for _ in 0..CLAIM_ATTEMPTS {
            if self.set_processing(&key).await? {
                tracing::debug!(key = %key, "Claimed idempotency key");
                return Ok(Admission::Claimed(key));
            }

            match self.get_record(&key).await? {
                Some(IdempotencyRecord {
                    status: IdempotencyStatus::Completed,
                    response: Some(outcome),
                }) => {
                    tracing::info!(key = %key, "Replaying cached response");
                    return Ok(Admission::Replay(outcome));
                }
                Some(_) => {
                    tracing::info!(key = %key, "Duplicate request while processing");
                    return Err(GateError::Conflict("request already in progress".to_string()));
                }
                // Expired between the claim and the read
                None => continue,
            }
        }

        Err(GateError::Conflict("request already in progress".to_string()))
    }
}

/// Rebuild `value` with every object's keys in sorted order
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn to_value(record: &IdempotencyRecord) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| GateError::Cache(format!("failed to encode idempotency record: {}", e)))
}

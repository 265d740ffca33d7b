//! Extraction cache and in-flight request deduplication
//!
//! Both structures are owned by the intent extractor instance, not ambient
//! process state. The cache is TTL- and capacity-bounded with oldest-first
//! eviction; the in-flight map gives concurrent callers of the same
//! normalized query one shared outcome instead of duplicate external calls.

use crate::models::Extraction;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry {
    value: Extraction,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
}

/// TTL + capacity bounded cache keyed by normalized query text.
pub struct ExtractionCache {
    ttl: Duration,
    capacity: usize,
    inner: RwLock<CacheInner>,
}

impl ExtractionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    /// Look up a cached extraction. Entries older than the TTL are treated
    /// as misses and purged.
    pub async fn get(&self, key: &str) -> Option<Extraction> {
        let now = Instant::now();

        {
            let inner = self.inner.read().await;
            match inner.entries.get(key) {
                Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: purge under the write lock, rechecking freshness since a
        // writer may have replaced the entry in between.
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get(key) {
            if now.duration_since(entry.inserted_at) < self.ttl {
                return Some(entry.value.clone());
            }
            debug!(key, "evicting expired cache entry");
            inner.entries.remove(key);
            inner.insertion_order.retain(|k| k != key);
        }
        None
    }

    pub async fn put(&self, key: String, value: Extraction) {
        let mut inner = self.inner.write().await;

        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        if inner.entries.insert(key.clone(), entry).is_none() {
            inner.insertion_order.push_back(key);
        }

        while inner.entries.len() > self.capacity {
            match inner.insertion_order.pop_front() {
                Some(oldest) => {
                    debug!(key = %oldest, "evicting oldest cache entry over capacity");
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

/// Outcome of an atomic check-then-insert on the in-flight map.
pub enum Claim {
    /// This caller runs the extraction and publishes the outcome.
    Owner(OwnedSlot),
    /// Another caller is already processing the same normalized query;
    /// await its published outcome.
    Waiter(watch::Receiver<Option<Extraction>>),
}

pub struct OwnedSlot {
    tx: watch::Sender<Option<Extraction>>,
}

impl OwnedSlot {
    pub fn publish(&self, outcome: Extraction) {
        let _ = self.tx.send(Some(outcome));
    }
}

/// Map of normalized query text to the pending extraction for it.
pub struct InFlightMap {
    inner: Mutex<HashMap<String, watch::Receiver<Option<Extraction>>>>,
}

impl InFlightMap {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically claim a key. The first caller becomes the owner; later
    /// callers with the same key receive a waiter handle.
    pub async fn try_claim(&self, key: &str) -> Claim {
        let mut map = self.inner.lock().await;

        if let Some(rx) = map.get(key) {
            return Claim::Waiter(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        map.insert(key.to_string(), rx);
        Claim::Owner(OwnedSlot { tx })
    }

    pub async fn release(&self, key: &str) {
        self.inner.lock().await.remove(key);
    }

    pub async fn pending(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl Default for InFlightMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Await the owner's published outcome. Returns `None` only if the owner
/// vanished without publishing (task panic).
pub async fn await_shared(
    mut rx: watch::Receiver<Option<Extraction>>,
) -> Option<Extraction> {
    loop {
        if let Some(outcome) = rx.borrow().clone() {
            return Some(outcome);
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMode;

    fn outcome(intent: &str) -> Extraction {
        Extraction {
            structured_query: Some(Default::default()),
            intent: intent.to_string(),
            confidence: 0.9,
            used_model: true,
            mode: ExtractionMode::Model,
            error: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_is_a_miss() {
        let cache = ExtractionCache::new(Duration::from_secs(60), 10);
        cache.put("q".into(), outcome("filter")).await;

        assert!(cache.get("q").await.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("q").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_first() {
        let cache = ExtractionCache::new(Duration::from_secs(600), 2);
        cache.put("a".into(), outcome("filter")).await;
        cache.put("b".into(), outcome("filter")).await;
        cache.put("c".into(), outcome("filter")).await;

        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_claim_then_wait() {
        let map = InFlightMap::new();

        let Claim::Owner(slot) = map.try_claim("q").await else {
            panic!("first claim must own the slot");
        };
        let Claim::Waiter(rx) = map.try_claim("q").await else {
            panic!("second claim must wait");
        };

        slot.publish(outcome("gainers"));
        let shared = await_shared(rx).await.expect("owner published");
        assert_eq!(shared.intent, "gainers");

        map.release("q").await;
        assert!(matches!(map.try_claim("q").await, Claim::Owner(_)));
    }
}

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{Mutex, RwLock, oneshot},
    task::JoinHandle,
};

/// Lets a value veto its own storage (e.g. an empty world list, which is
/// more likely a transient failure than the truth).
pub trait Cacheable {
    fn worth_caching(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    computed_at: DateTime<Utc>,
}

/// Query results shared by every request until the next sweep.
///
/// There is no per-entry expiry; [`ResultCache::evict_all`] drops everything
/// at once. Concurrent misses on one key are coalesced: the first caller runs
/// the producer, the rest wait for it and read what it stored. A value whose
/// producer was still running when a sweep happened is returned but not kept.
#[derive(Debug)]
pub struct ResultCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    inflight: Mutex<HashMap<K, Arc<Mutex<()>>>>,
    /// Bumped by every sweep, under the `entries` write lock.
    generation: AtomicU64,
}

impl<K, V> Default for ResultCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone + Cacheable,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries.read().await.get(key).map(|e| e.value.clone())
    }

    pub async fn computed_at(&self, key: &K) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(key).map(|e| e.computed_at)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns the cached value for `key`, running `producer` on a miss.
    ///
    /// Errors are handed back untouched and never stored.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(v) = self.get(&key).await {
            tracing::trace!(?key, "cache hit");
            return Ok(v);
        }

        let guard = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(key.clone()).or_default().clone()
        };
        let _running = guard.lock().await;

        // Someone else may have filled it while we waited.
        if let Some(v) = self.get(&key).await {
            tracing::trace!(?key, "cache filled by concurrent producer");
            return Ok(v);
        }

        tracing::debug!(?key, "cache miss; computing");
        let started = self.generation.load(Ordering::Acquire);
        let value = producer().await?;
        if !value.worth_caching() {
            tracing::debug!(?key, "result not cached");
            return Ok(value);
        }

        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::Acquire) != started {
            tracing::debug!(?key, "sweep ran during compute; result not cached");
            return Ok(value);
        }
        entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                computed_at: Utc::now(),
            },
        );
        Ok(value)
    }

    /// Drops every entry regardless of age. Returns how many were removed.
    pub async fn evict_all(&self) -> usize {
        let removed = {
            let mut entries = self.entries.write().await;
            let n = entries.len();
            entries.clear();
            self.generation.fetch_add(1, Ordering::AcqRel);
            n
        };
        // Forget idle producer guards so the table doesn't grow with old keys.
        self.inflight
            .lock()
            .await
            .retain(|_, guard| Arc::strong_count(guard) > 1);
        removed
    }
}

/// Timer-driven blanket eviction, owned by whoever started it.
///
/// Dropping the handle without calling [`CacheSweeper::stop`] aborts the task.
#[derive(Debug)]
pub struct CacheSweeper {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Runs `sweep` every `interval` (first run one interval after start).
    /// `sweep` reports how many entries it dropped.
    pub fn spawn<F, Fut>(interval: Duration, sweep: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = usize> + Send + 'static,
    {
        let (tx, mut rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => {
                        let removed = sweep().await;
                        tracing::debug!(removed, "cache sweep");
                    }
                }
            }
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "cache sweeper started");
        Self {
            shutdown: Some(tx),
            task: Some(task),
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        tracing::info!("cache sweeper stopped");
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

//! In-memory caches with time-based expiry.
//!
//! A [`CacheRegistry`] hands out [`ExpiringCache`] instances and keeps a weak
//! reference to each of them so a single [`CacheSweeper`] thread can reclaim
//! expired entries across every cache in the process. Reads never depend on
//! the sweeper: an expired entry is invisible as soon as its TTL elapses.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{debug, trace};

trait Sweep: Send + Sync {
    fn sweep(&self, now: Instant) -> usize;
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

struct CacheStore<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> CacheStore<K, V> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) < self.ttl
    }
}

impl<K, V> Sweep for CacheStore<K, V>
where
    K: Send,
    V: Send,
{
    fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < self.ttl);
        before - entries.len()
    }
}

/// A TTL-bounded key/value store. Cloning is cheap and shares the entries.
pub struct ExpiringCache<K, V> {
    store: Arc<CacheStore<K, V>>,
}

impl<K, V> Clone for ExpiringCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn with_ttl(ttl: Duration) -> Self {
        Self {
            store: Arc::new(CacheStore {
                ttl,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.store.ttl
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    /// Insert only when no live entry exists for `key`. Returns whether the
    /// value was stored.
    pub fn put_if_absent(&self, key: K, value: V) -> bool {
        let now = Instant::now();
        let mut entries = self.store.lock();
        if entries
            .get(&key)
            .is_some_and(|entry| self.store.is_live(entry, now))
        {
            return false;
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
            },
        );
        true
    }

    /// Remove `key`, returning its value if it had not expired yet.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entry = self.store.lock().remove(key)?;
        self.store.is_live(&entry, now).then_some(entry.value)
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.store
            .lock()
            .values()
            .filter(|entry| self.store.is_live(entry, now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        self.store
            .lock()
            .iter()
            .filter(|(_, entry)| self.store.is_live(entry, now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        self.store
            .lock()
            .get(key)
            .filter(|entry| self.store.is_live(entry, now))
            .map(|entry| entry.value.clone())
    }

    fn put_at(&self, key: K, value: V, inserted_at: Instant) {
        self.store.lock().insert(key, Entry { value, inserted_at });
    }

    #[cfg(test)]
    fn stored_len(&self) -> usize {
        self.store.lock().len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub caches: usize,
    pub evicted: usize,
}

/// Produces caches that share one eviction family.
pub struct CacheRegistry {
    default_ttl: Duration,
    caches: Mutex<Vec<Weak<dyn Sweep>>>,
}

impl CacheRegistry {
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            caches: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn new_cache<K, V>(&self, ttl: Duration) -> ExpiringCache<K, V>
    where
        K: Eq + Hash + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        let cache = ExpiringCache::with_ttl(ttl);
        let weak: Weak<dyn Sweep> = Arc::downgrade(&cache.store) as Weak<dyn Sweep>;
        self.caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(weak);
        cache
    }

    pub fn new_default_cache<K, V>(&self) -> ExpiringCache<K, V>
    where
        K: Eq + Hash + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        self.new_cache(self.default_ttl)
    }

    /// Caches produced by this registry that are still referenced somewhere.
    #[must_use]
    pub fn live_caches(&self) -> usize {
        self.upgrade_live().len()
    }

    /// Physically remove expired entries from every live cache.
    pub fn sweep_all(&self) -> SweepReport {
        self.sweep_all_at(Instant::now())
    }

    fn sweep_all_at(&self, now: Instant) -> SweepReport {
        let caches = self.upgrade_live();
        let evicted = caches.iter().map(|cache| cache.sweep(now)).sum();
        SweepReport {
            caches: caches.len(),
            evicted,
        }
    }

    fn upgrade_live(&self) -> Vec<Arc<dyn Sweep>> {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        caches.retain(|weak| weak.strong_count() > 0);
        caches.iter().filter_map(Weak::upgrade).collect()
    }
}

/// Background loop sweeping every cache of one [`CacheRegistry`].
pub struct CacheSweeper {
    registry: Arc<CacheRegistry>,
    period: Duration,
}

impl CacheSweeper {
    #[must_use]
    pub fn new(registry: Arc<CacheRegistry>, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Spawn the sweeper thread. Taking `self` by value means a sweeper can
    /// only be started once.
    ///
    /// # Errors
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn start(self) -> std::io::Result<SweeperHandle> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        // The thread keeps its own sender so dropping the handle detaches the
        // loop instead of stopping it.
        let keepalive = stop_tx.clone();
        let Self { registry, period } = self;

        let join_handle = std::thread::Builder::new()
            .name("cache-sweeper".to_string())
            .spawn(move || {
                let _keepalive = keepalive;
                debug!("Cache sweeper started, period {}s", period.as_secs_f32());
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            let report = registry.sweep_all();
                            if report.evicted > 0 {
                                debug!(
                                    "Evicted {} expired entries from {} caches",
                                    report.evicted, report.caches
                                );
                            } else {
                                trace!("Cache sweep found nothing to evict");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Cache sweeper stopped");
            })?;

        Ok(SweeperHandle {
            stop_tx,
            join_handle: Some(join_handle),
        })
    }
}

pub struct SweeperHandle {
    stop_tx: Sender<()>,
    join_handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the loop and wait for the thread to exit.
    pub fn stop(mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_core::FieldKind;
use tokio::task::JoinHandle;

use crate::fingerprint::context_fingerprint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 1000,
            sweep_interval_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub field_kind: FieldKind,
    pub value: String,
    pub context: u64,
}

impl CacheKey {
    pub fn new(field_kind: FieldKind, value: &str, context: &[&str]) -> Self {
        Self {
            field_kind,
            value: value.to_string(),
            context: context_fingerprint(context),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    confidence: f32,
    computed_at: Instant,
    hit_count: AtomicU64,
}

impl CacheEntry {
    fn new(confidence: f32, computed_at: Instant) -> Self {
        Self {
            confidence,
            computed_at,
            hit_count: AtomicU64::new(0),
        }
    }

    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.computed_at) < ttl
    }

    fn hits(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// Entries still held but already past their TTL.
    pub expired_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired: usize,
    pub evicted: usize,
}

/// Memoization of confidence scores.
///
/// One `RwLock` guards the entry map: lookups and statistics snapshots share
/// the read side, inserts/evictions/clears take the write side. Hit counters
/// are atomics so a hit never needs the write lock.
///
/// Each field kind carries a generation that [`ConfidenceCache::invalidate`]
/// bumps under the write lock. A score computed before a bump is returned to
/// its caller but never stored.
pub struct ConfidenceCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    generations: [AtomicU64; FieldKind::ALL.len()],
    ttl: Duration,
    max_entries: usize,
    sweep_interval: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ConfidenceCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl ConfidenceCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generations: Default::default(),
            ttl: config.ttl(),
            max_entries: config.max_entries.max(1),
            sweep_interval: config.sweep_interval(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached confidence for the key, or runs `compute` and
    /// caches its result. An error from `compute` is returned as-is and
    /// nothing is stored.
    pub fn get_or_compute<F, E>(
        &self,
        field_kind: FieldKind,
        value: &str,
        context: &[&str],
        compute: F,
    ) -> Result<f32, E>
    where
        F: FnOnce() -> Result<f32, E>,
    {
        let key = CacheKey::new(field_kind, value, context);
        if let Some(confidence) = self.lookup(&key) {
            return Ok(confidence);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(field = %field_kind, value, "confidence cache miss");
        let generation = self.generation(field_kind);
        // Computed outside the lock; a concurrent miss on the same key may
        // compute too, and whichever inserts first is kept.
        let confidence = compute()?;
        Ok(self.insert(key, confidence, Instant::now(), generation).0)
    }

    pub fn get_or_insert_with<F>(&self, field_kind: FieldKind, value: &str, context: &[&str], compute: F) -> f32
    where
        F: FnOnce() -> f32,
    {
        match self.get_or_compute(field_kind, value, context, || Ok::<_, Infallible>(compute())) {
            Ok(confidence) => confidence,
            Err(never) => match never {},
        }
    }

    /// Preloads confidences for common values, skipping keys already fresh.
    /// Does not touch hit/miss statistics. Returns the number inserted.
    pub fn warm_up<F>(
        &self,
        common: &HashMap<FieldKind, Vec<String>>,
        context: &[&str],
        mut compute: F,
    ) -> usize
    where
        F: FnMut(FieldKind, &str) -> f32,
    {
        let mut inserted = 0;
        for (kind, values) in common {
            for value in values {
                let key = CacheKey::new(*kind, value, context);
                if self.is_fresh(&key) {
                    continue;
                }
                let generation = self.generation(*kind);
                let confidence = compute(*kind, value);
                if self.insert(key, confidence, Instant::now(), generation).1 {
                    inserted += 1;
                }
            }
        }
        inserted
    }

    /// Drops every entry for one field kind, including scores still being
    /// computed for it. Returns how many entries were removed.
    pub fn invalidate(&self, field_kind: FieldKind) -> usize {
        let mut entries = self.entries.write();
        self.generations[slot(field_kind)].fetch_add(1, Ordering::Release);
        let before = entries.len();
        entries.retain(|k, _| k.field_kind != field_kind);
        before - entries.len()
    }

    /// Drops everything and resets the hit/miss counters.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        for generation in &self.generations {
            generation.fetch_add(1, Ordering::Release);
        }
        entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Removes expired entries, then the least-hit entries while over capacity.
    pub fn cleanup(&self) -> CleanupReport {
        let mut entries = self.entries.write();
        self.cleanup_locked(&mut entries, None)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn statistics(&self) -> CacheStatistics {
        let entries = self.entries.read();
        let now = Instant::now();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatistics {
            size: entries.len(),
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            expired_count: entries.values().filter(|e| !e.is_fresh(now, self.ttl)).count(),
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<f32> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if !entry.is_fresh(Instant::now(), self.ttl) {
            return None;
        }
        entry.hit_count.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.confidence)
    }

    fn is_fresh(&self, key: &CacheKey) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|e| e.is_fresh(Instant::now(), self.ttl))
    }

    fn generation(&self, field_kind: FieldKind) -> u64 {
        self.generations[slot(field_kind)].load(Ordering::Acquire)
    }

    /// Stores `confidence` unless a fresh entry already exists (its value is
    /// returned instead) or the kind was invalidated since `generation`.
    /// The flag reports whether a new entry was stored.
    fn insert(&self, key: CacheKey, confidence: f32, computed_at: Instant, generation: u64) -> (f32, bool) {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&key) {
            if existing.is_fresh(Instant::now(), self.ttl) {
                return (existing.confidence, false);
            }
        }
        if self.generation(key.field_kind) != generation {
            tracing::debug!(field = %key.field_kind, value = %key.value, "discarding score computed before invalidation");
            return (confidence, false);
        }
        entries.insert(key.clone(), CacheEntry::new(confidence, computed_at));
        if entries.len() > self.max_entries {
            self.cleanup_locked(&mut entries, Some(&key));
        }
        (confidence, true)
    }

    /// `keep` shields a just-inserted key from least-hit eviction; it would
    /// otherwise always be the first victim once every resident entry has hits.
    fn cleanup_locked(&self, entries: &mut HashMap<CacheKey, CacheEntry>, keep: Option<&CacheKey>) -> CleanupReport {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh(now, self.ttl));
        let expired = before - entries.len();

        let mut evicted = 0;
        if entries.len() > self.max_entries {
            let surplus = entries.len() - self.max_entries;
            let mut by_hits: Vec<(u64, CacheKey)> = entries
                .iter()
                .filter(|(k, _)| Some(*k) != keep)
                .map(|(k, e)| (e.hits(), k.clone()))
                .collect();
            by_hits.sort_unstable_by_key(|(hits, _)| *hits);
            for (_, key) in by_hits.into_iter().take(surplus) {
                entries.remove(&key);
                evicted += 1;
            }
        }

        if expired + evicted > 0 {
            tracing::debug!(expired, evicted, size = entries.len(), "confidence cache cleanup");
        }
        CleanupReport { expired, evicted }
    }
}

fn slot(field_kind: FieldKind) -> usize {
    field_kind as usize
}

/// Runs [`ConfidenceCache::cleanup`] every sweep interval so expired entries
/// are dropped even when nothing is being inserted. The task holds only a
/// weak reference and ends once the cache is dropped.
pub fn spawn_sweeper(cache: &Arc<ConfidenceCache>) -> JoinHandle<()> {
    let weak = Arc::downgrade(cache);
    let period = cache.sweep_interval.max(Duration::from_millis(1));
    tracing::info!(interval_secs = period.as_secs(), "Starting confidence cache sweeper");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(cache) = weak.upgrade() else {
                break;
            };
            cache.cleanup();
        }
        tracing::debug!("Confidence cache sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn cache(ttl_secs: u64, max_entries: usize) -> ConfidenceCache {
        ConfidenceCache::new(&CacheConfig {
            ttl_secs,
            max_entries,
            sweep_interval_secs: 300,
        })
    }

    #[test]
    fn memoizes_identical_keys() {
        let c = cache(3600, 1000);
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            0.6
        };

        let first = c.get_or_insert_with(FieldKind::Category, "餐饮美食", &["expense"], compute);
        let second = c.get_or_insert_with(FieldKind::Category, "餐饮美食", &["expense"], compute);

        assert_eq!((first, second), (0.6, 0.6));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = c.statistics();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn context_partitions_keys() {
        let c = cache(3600, 1000);
        c.get_or_insert_with(FieldKind::Category, "其他", &["expense"], || 0.3);
        let v = c.get_or_insert_with(FieldKind::Category, "其他", &["income"], || 0.25);
        assert_eq!(v, 0.25);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn size_never_exceeds_max() {
        let c = cache(3600, 1000);
        for i in 0..1001 {
            c.get_or_insert_with(FieldKind::Description, &format!("d{i}"), &[], || 0.5);
        }
        assert!(c.statistics().size <= 1000);
    }

    #[test]
    fn eviction_prefers_least_hit_entries() {
        let c = cache(3600, 2);
        c.get_or_insert_with(FieldKind::Account, "支付宝", &[], || 0.6);
        c.get_or_insert_with(FieldKind::Account, "微信", &[], || 0.6);
        c.get_or_insert_with(FieldKind::Account, "支付宝", &[], || 0.6);

        c.get_or_insert_with(FieldKind::Account, "现金", &[], || 0.6);

        assert_eq!(c.len(), 2);
        assert!(c.is_fresh(&CacheKey::new(FieldKind::Account, "支付宝", &[])));
    }

    #[test]
    fn newcomer_survives_when_residents_all_have_hits() {
        let c = cache(3600, 2);
        for value in ["支付宝", "微信"] {
            c.get_or_insert_with(FieldKind::Account, value, &[], || 0.6);
            c.get_or_insert_with(FieldKind::Account, value, &[], || 0.6);
        }

        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            c.get_or_insert_with(FieldKind::Account, "现金", &[], || {
                calls.fetch_add(1, Ordering::SeqCst);
                0.6
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn invalidation_during_compute_discards_the_result() {
        let c = cache(3600, 1000);
        let v = c.get_or_insert_with(FieldKind::Category, "餐饮美食", &["expense"], || {
            // New feedback lands while this score is being computed.
            c.invalidate(FieldKind::Category);
            0.6
        });
        assert_eq!(v, 0.6);
        assert!(c.is_empty());

        let v = c.get_or_insert_with(FieldKind::Category, "餐饮美食", &["expense"], || 0.3);
        assert_eq!(v, 0.3);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn invalidation_of_other_kinds_does_not_discard() {
        let c = cache(3600, 1000);
        c.get_or_insert_with(FieldKind::Category, "餐饮美食", &[], || {
            c.invalidate(FieldKind::Account);
            0.6
        });
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn zero_ttl_always_recomputes() {
        let c = cache(0, 1000);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            c.get_or_insert_with(FieldKind::Amount, "100", &[], || {
                calls.fetch_add(1, Ordering::SeqCst);
                0.9
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(c.statistics().hits, 0);
    }

    #[test]
    fn backdated_entry_is_expired() {
        let c = cache(60, 1000);
        let key = CacheKey::new(FieldKind::Date, "2024-03-15", &[]);
        let stale = Instant::now()
            .checked_sub(Duration::from_secs(61))
            .expect("monotonic clock too young");
        c.insert(key, 0.9, stale, 0);

        assert_eq!(c.statistics().expired_count, 1);
        let v = c.get_or_insert_with(FieldKind::Date, "2024-03-15", &[], || 0.45);
        assert_eq!(v, 0.45);
        assert_eq!(c.statistics().misses, 1);
        assert_eq!(c.statistics().expired_count, 0);
    }

    #[test]
    fn cleanup_drops_expired_entries() {
        let c = cache(60, 1000);
        let stale = Instant::now().checked_sub(Duration::from_secs(120)).unwrap();
        c.insert(CacheKey::new(FieldKind::Notes, "a", &[]), 0.3, stale, 0);
        c.insert(CacheKey::new(FieldKind::Notes, "b", &[]), 0.3, Instant::now(), 0);
        assert_eq!(c.cleanup(), CleanupReport { expired: 1, evicted: 0 });
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn compute_errors_propagate_and_are_not_cached() {
        let c = cache(3600, 1000);
        let err: Result<f32, &str> = c.get_or_compute(FieldKind::Category, "x", &[], || Err("model bug"));
        assert_eq!(err, Err("model bug"));
        assert!(c.is_empty());

        let ok: Result<f32, &str> = c.get_or_compute(FieldKind::Category, "x", &[], || Ok(0.6));
        assert_eq!(ok, Ok(0.6));
    }

    #[test]
    fn invalidate_is_scoped_to_field_kind() {
        let c = cache(3600, 1000);
        c.get_or_insert_with(FieldKind::Category, "餐饮美食", &[], || 0.6);
        c.get_or_insert_with(FieldKind::Category, "交通出行", &[], || 0.6);
        c.get_or_insert_with(FieldKind::Account, "支付宝", &[], || 0.6);
        assert_eq!(c.invalidate(FieldKind::Category), 2);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn clear_resets_counters() {
        let c = cache(3600, 1000);
        c.get_or_insert_with(FieldKind::Amount, "1", &[], || 0.9);
        c.get_or_insert_with(FieldKind::Amount, "1", &[], || 0.9);
        c.clear();
        let stats = c.statistics();
        assert_eq!((stats.size, stats.hits, stats.misses), (0, 0, 0));
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn warm_up_skips_fresh_keys_and_leaves_stats_alone() {
        let c = cache(3600, 1000);
        c.get_or_insert_with(FieldKind::Category, "餐饮美食", &["expense"], || 0.6);

        let common: HashMap<_, _> = [
            (FieldKind::Category, vec!["餐饮美食".to_string(), "交通出行".to_string()]),
            (FieldKind::Account, vec!["支付宝".to_string()]),
        ]
        .into_iter()
        .collect();
        let inserted = c.warm_up(&common, &["expense"], |_, _| 0.6);

        assert_eq!(inserted, 2);
        assert_eq!(c.len(), 3);
        assert_eq!(c.statistics().misses, 1);
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let c = Arc::new(cache(3600, 64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let value = format!("v{}", (i * (t + 1)) % 100);
                        let got = c.get_or_insert_with(FieldKind::Notes, &value, &[], || 0.3);
                        assert_eq!(got, 0.3);
                        if i % 50 == 0 {
                            c.statistics();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = c.statistics();
        assert!(stats.size <= 64);
        assert_eq!(stats.hits + stats.misses, 8 * 500);
    }

    #[tokio::test]
    async fn sweeper_drops_expired_entries_and_stops_with_cache() {
        let c = Arc::new(ConfidenceCache::new(&CacheConfig {
            ttl_secs: 60,
            max_entries: 1000,
            sweep_interval_secs: 0,
        }));
        let stale = Instant::now().checked_sub(Duration::from_secs(120)).unwrap();
        c.insert(CacheKey::new(FieldKind::Notes, "old", &[]), 0.3, stale, 0);

        let handle = spawn_sweeper(&c);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(c.is_empty());

        drop(c);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}

//! Keyed cache of filtered views with single-owner rebuilds.
//!
//! Each (scope, filter) pair hashes to a [`CacheKey`]. Keys land in a fixed
//! array of buckets; each bucket is a mutex-guarded slot map plus a condvar
//! that rebuild commits signal. The protocol:
//!
//! - A lookup that finds a fresh entry returns it immediately.
//! - The first lookup to find a slot empty or stale claims the rebuild and
//!   gets a [`RebuildGuard`]; the caller builds the index and commits.
//! - Concurrent lookups for the same key wait on the condvar. A waiter that
//!   outlives the rebuild deadline is served the previous generation marked
//!   [`Freshness::PossiblyStale`] when one exists, and
//!   [`CacheError::RebuildTimeout`] when it does not.
//!
//! Bucket locks are held only for slot bookkeeping. Disk reads, index
//! builds, and persistence all happen outside them.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use graphmind_edge::{AttributedEdge, EnvSource, Filter};

use crate::bitmap::EdgeBitmap;
use crate::error::CacheError;
use crate::fsops::{FileOps, SystemFileOps};

/// Domain separator mixed into every cache key.
const KEY_DOMAIN: &[u8] = b"graphmind.cache.v1";

/// Environment variable overriding the bucket count.
pub const ENV_CACHE_BUCKETS: &str = "GRAPHMIND_CACHE_BUCKETS";
/// Environment variable overriding the staleness horizon.
pub const ENV_CACHE_MAX_AGE: &str = "GRAPHMIND_CACHE_MAX_AGE";
/// Environment variable pointing at the persistence directory.
pub const ENV_CACHE_DIR: &str = "GRAPHMIND_CACHE_DIR";

pub const DEFAULT_BUCKETS: usize = 1024;
pub const DEFAULT_MAX_AGE: u64 = 86_400;
pub const DEFAULT_REBUILD_DEADLINE: Duration = Duration::from_secs(5);

/// How often a running index build polls its cancel token.
const BUILD_CANCEL_STRIDE: usize = 1024;

// ============================================================================
// Cache keys
// ============================================================================

/// SHA-256 over the key domain, the scope, and the filter's key material.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive the key for one filtered view of one scope.
    pub fn from_query(scope: &str, filter: &Filter) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_DOMAIN);
        hasher.update((scope.len() as u32).to_le_bytes());
        hasher.update(scope.as_bytes());
        hasher.update(filter.key_material());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        CacheKey(out)
    }

    /// Stable bucket assignment for a given bucket count.
    pub fn bucket(&self, count: usize) -> usize {
        let word = u64::from_le_bytes([
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5], self.0[6], self.0[7],
        ]);
        (word % count.max(1) as u64) as usize
    }

    /// 64-character lowercase hex, used for artifact file names.
    pub fn to_hex(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in self.0 {
            // Writing to a String cannot fail.
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", &self.to_hex()[..12])
    }
}

// ============================================================================
// Configuration and staleness
// ============================================================================

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Number of independently locked buckets.
    pub buckets: usize,
    /// An entry whose journal tip is older than this (in the caller's time
    /// unit) is stale and rebuilt on lookup.
    pub max_age: u64,
    /// How long a waiter blocks on someone else's rebuild before being
    /// served the previous generation or timing out.
    pub rebuild_deadline: Duration,
    /// Persistence directory. `None` keeps the cache memory-only.
    pub cache_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            buckets: DEFAULT_BUCKETS,
            max_age: DEFAULT_MAX_AGE,
            rebuild_deadline: DEFAULT_REBUILD_DEADLINE,
            cache_dir: None,
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by environment variables. Values that fail to
    /// parse (or a zero bucket count) are ignored.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let mut config = CacheConfig::default();
        if let Some(buckets) = env.var(ENV_CACHE_BUCKETS).and_then(|v| v.parse().ok()) {
            if buckets > 0 {
                config.buckets = buckets;
            }
        }
        if let Some(max_age) = env.var(ENV_CACHE_MAX_AGE).and_then(|v| v.parse().ok()) {
            config.max_age = max_age;
        }
        if let Some(dir) = env.var(ENV_CACHE_DIR) {
            if !dir.is_empty() {
                config.cache_dir = Some(PathBuf::from(dir));
            }
        }
        config
    }
}

/// Staleness rule shared by lookup and warm start. A tip exactly `max_age`
/// old is still fresh; a clock that moved backwards never marks anything
/// stale.
pub fn is_stale(journal_tip_time: u64, now: u64, max_age: u64) -> bool {
    now > journal_tip_time && now - journal_tip_time > max_age
}

// ============================================================================
// Entries
// ============================================================================

/// Sidecar metadata persisted next to each bitmap artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Journal tip time the index was built against.
    pub journal_tip_time: u64,
    /// Wall time (unix millis) the build finished.
    pub built_at: u64,
    /// Member count of the bitmap, cross-checked on load.
    pub cardinality: u64,
}

/// One materialized filtered view, tagged with the key it answers.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub index: EdgeBitmap,
    pub meta: CacheMeta,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Served past the rebuild deadline or from a stale slot; usable, but
    /// the journal may have moved on.
    PossiblyStale,
}

/// A cache answer: a shared entry plus how much to trust it.
#[derive(Clone)]
pub struct CachedView {
    entry: Arc<CacheEntry>,
    freshness: Freshness,
}

impl CachedView {
    pub fn index(&self) -> &EdgeBitmap {
        &self.entry.index
    }

    pub fn meta(&self) -> &CacheMeta {
        &self.entry.meta
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn entry(&self) -> &Arc<CacheEntry> {
        &self.entry
    }
}

impl fmt::Debug for CachedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedView")
            .field("freshness", &self.freshness)
            .field("meta", &self.entry.meta)
            .finish()
    }
}

// ============================================================================
// Index building
// ============================================================================

/// Cooperative cancellation for index builds: an explicit flag, an optional
/// deadline, or both.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }
}

/// Run `filter` over a journal walk and collect matching sequence numbers.
/// The token is polled every [`BUILD_CANCEL_STRIDE`] edges, including before
/// the first.
pub fn build_index<'a, I>(
    edges: I,
    filter: &Filter,
    cancel: &CancelToken,
) -> Result<EdgeBitmap, CacheError>
where
    I: IntoIterator<Item = (u32, &'a AttributedEdge)>,
{
    let mut index = EdgeBitmap::new();
    for (seen, (seq, edge)) in edges.into_iter().enumerate() {
        if seen % BUILD_CANCEL_STRIDE == 0 && cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        if filter.matches(edge) {
            index.insert(seq);
        }
    }
    Ok(index)
}

// ============================================================================
// Lookup protocol
// ============================================================================

/// Outcome of [`EdgeCache::lookup`].
pub enum Lookup {
    /// A usable entry. Check [`CachedView::freshness`].
    Hit(CachedView),
    /// The caller owns the rebuild for this key until the guard commits or
    /// drops.
    Rebuild(RebuildGuard),
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Hit(view) => f.debug_tuple("Hit").field(view).finish(),
            Lookup::Rebuild(guard) => f.debug_tuple("Rebuild").field(guard).finish(),
        }
    }
}

/// Exclusive claim on one key's rebuild. Committing publishes the new entry
/// and wakes waiters; dropping without a commit restores the previous state
/// so waiters are not stranded.
pub struct RebuildGuard {
    cache: EdgeCache,
    key: CacheKey,
    prev: Option<Arc<CacheEntry>>,
    committed: bool,
}

impl RebuildGuard {
    fn new(cache: EdgeCache, key: CacheKey, prev: Option<Arc<CacheEntry>>) -> Self {
        RebuildGuard {
            cache,
            key,
            prev,
            committed: false,
        }
    }

    pub fn key(&self) -> CacheKey {
        self.key
    }

    /// The generation being replaced, if any. Usable as a degraded answer
    /// while the rebuild runs.
    pub fn previous(&self) -> Option<&Arc<CacheEntry>> {
        self.prev.as_ref()
    }

    /// Publish a rebuilt index. `journal_tip_time` is the tip the build saw;
    /// `built_at` is wall time in unix millis.
    pub fn commit(
        mut self,
        index: EdgeBitmap,
        journal_tip_time: u64,
        built_at: u64,
    ) -> Arc<CacheEntry> {
        self.committed = true;
        self.cache
            .commit_entry(self.key, index, journal_tip_time, built_at)
    }

    /// Give up the claim without publishing.
    pub fn abandon(self) {}
}

impl fmt::Debug for RebuildGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebuildGuard")
            .field("key", &self.key)
            .field("has_previous", &self.prev.is_some())
            .finish()
    }
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        if !self.committed {
            self.cache.release_abandoned(self.key, self.prev.take());
        }
    }
}

// ============================================================================
// Cache internals
// ============================================================================

enum Slot {
    /// A rebuild is in flight; `prev` is the generation it replaces.
    Building { prev: Option<Arc<CacheEntry>> },
    Ready(Arc<CacheEntry>),
}

#[derive(Default)]
struct Bucket {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    committed: Condvar,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    rebuilds: AtomicU64,
}

/// Point-in-time counter snapshot. Hits count lookups answered from memory
/// or disk, including degraded ones; misses count lookups that had to claim
/// a rebuild.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub rebuilds: u64,
}

struct CacheShared {
    config: CacheConfig,
    buckets: Box<[Bucket]>,
    files: Arc<dyn FileOps>,
    counters: Counters,
}

/// What a waiter does with the slot it observed.
enum Step {
    HitFresh(Arc<CacheEntry>),
    StartStale(Arc<CacheEntry>),
    Claim,
    Wait,
}

/// What a waiter does once the rebuild deadline has passed.
enum Late {
    Fresh(Arc<CacheEntry>),
    StaleReady(Arc<CacheEntry>),
    Fallback(Arc<CacheEntry>),
    NoFallback,
    Vanished,
}

// ============================================================================
// The cache
// ============================================================================

/// Shared, thread-safe cache of filtered views. Clones are handles to the
/// same cache.
#[derive(Clone)]
pub struct EdgeCache {
    inner: Arc<CacheShared>,
}

impl EdgeCache {
    /// Cache over the real filesystem.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_files(config, Arc::new(SystemFileOps))
    }

    /// Cache over explicit file operations (tests use [`MemFileOps`]).
    ///
    /// [`MemFileOps`]: crate::fsops::MemFileOps
    pub fn with_files(config: CacheConfig, files: Arc<dyn FileOps>) -> Self {
        let bucket_count = config.buckets.max(1);
        let buckets: Vec<Bucket> = (0..bucket_count).map(|_| Bucket::default()).collect();
        EdgeCache {
            inner: Arc::new(CacheShared {
                config,
                buckets: buckets.into_boxed_slice(),
                files,
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Look up the view for `key` as of journal time `now`.
    ///
    /// Returns [`Lookup::Hit`] when a fresh entry exists in memory or on
    /// disk, [`Lookup::Rebuild`] when this caller must rebuild, and
    /// [`CacheError::RebuildTimeout`] only when someone else's rebuild
    /// outlives the deadline with no previous generation to fall back to.
    pub fn lookup(&self, key: CacheKey, now: u64) -> Result<Lookup, CacheError> {
        let deadline = Instant::now() + self.inner.config.rebuild_deadline;
        let max_age = self.inner.config.max_age;
        let bucket = self.bucket_for(key);

        loop {
            let mut slots = bucket.slots.lock();
            let step = match slots.get(&key) {
                Some(Slot::Ready(entry)) => {
                    if is_stale(entry.meta.journal_tip_time, now, max_age) {
                        Step::StartStale(entry.clone())
                    } else {
                        Step::HitFresh(entry.clone())
                    }
                }
                Some(Slot::Building { .. }) => Step::Wait,
                None => Step::Claim,
            };

            match step {
                Step::HitFresh(entry) => {
                    drop(slots);
                    self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Lookup::Hit(CachedView {
                        entry,
                        freshness: Freshness::Fresh,
                    }));
                }
                Step::StartStale(prev) => {
                    slots.insert(
                        key,
                        Slot::Building {
                            prev: Some(prev.clone()),
                        },
                    );
                    drop(slots);
                    self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key.to_hex(), reason = "stale", "starting rebuild");
                    return Ok(Lookup::Rebuild(RebuildGuard::new(
                        self.clone(),
                        key,
                        Some(prev),
                    )));
                }
                Step::Claim => {
                    slots.insert(key, Slot::Building { prev: None });
                    drop(slots);
                    return Ok(self.resolve_miss(key, now));
                }
                Step::Wait => {
                    let timed_out = bucket
                        .committed
                        .wait_until(&mut slots, deadline)
                        .timed_out();
                    if !timed_out {
                        drop(slots);
                        continue;
                    }

                    let late = match slots.get(&key) {
                        Some(Slot::Ready(entry)) => {
                            if is_stale(entry.meta.journal_tip_time, now, max_age) {
                                Late::StaleReady(entry.clone())
                            } else {
                                Late::Fresh(entry.clone())
                            }
                        }
                        Some(Slot::Building { prev: Some(prev) }) => Late::Fallback(prev.clone()),
                        Some(Slot::Building { prev: None }) => Late::NoFallback,
                        None => Late::Vanished,
                    };
                    drop(slots);

                    match late {
                        Late::Fresh(entry) => {
                            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                            return Ok(Lookup::Hit(CachedView {
                                entry,
                                freshness: Freshness::Fresh,
                            }));
                        }
                        Late::StaleReady(entry) | Late::Fallback(entry) => {
                            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                key = %key.to_hex(),
                                waited = ?self.inner.config.rebuild_deadline,
                                "rebuild deadline passed, serving previous generation"
                            );
                            return Ok(Lookup::Hit(CachedView {
                                entry,
                                freshness: Freshness::PossiblyStale,
                            }));
                        }
                        Late::NoFallback => {
                            return Err(CacheError::RebuildTimeout {
                                waited: self.inner.config.rebuild_deadline,
                            });
                        }
                        Late::Vanished => continue,
                    }
                }
            }
        }
    }

    /// Drop one key from memory and disk. An in-flight rebuild for the key
    /// quietly loses its slot; its guard will not resurrect the entry.
    pub fn evict(&self, key: CacheKey) {
        let bucket = self.bucket_for(key);
        {
            let mut slots = bucket.slots.lock();
            slots.remove(&key);
            bucket.committed.notify_all();
        }
        if let Some(dir) = self.inner.config.cache_dir.as_deref() {
            let (index_path, meta_path) = artifact_paths(dir, key);
            let _ = self.inner.files.remove(&index_path);
            let _ = self.inner.files.remove(&meta_path);
        }
        tracing::debug!(key = %key.to_hex(), "evicted cache entry");
    }

    /// Drop everything, including persisted artifacts for the keys held in
    /// memory.
    pub fn clear(&self) {
        for bucket in self.inner.buckets.iter() {
            let keys: Vec<CacheKey> = {
                let mut slots = bucket.slots.lock();
                let keys = slots.keys().copied().collect();
                slots.clear();
                bucket.committed.notify_all();
                keys
            };
            if let Some(dir) = self.inner.config.cache_dir.as_deref() {
                for key in keys {
                    let (index_path, meta_path) = artifact_paths(dir, key);
                    let _ = self.inner.files.remove(&index_path);
                    let _ = self.inner.files.remove(&meta_path);
                }
            }
        }
    }

    /// Number of materialized entries (slots mid-rebuild not included).
    pub fn entry_count(&self) -> usize {
        self.inner
            .buckets
            .iter()
            .map(|bucket| {
                bucket
                    .slots
                    .lock()
                    .values()
                    .filter(|slot| matches!(slot, Slot::Ready(_)))
                    .count()
            })
            .sum()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entry_count(),
            hits: self.inner.counters.hits.load(Ordering::Relaxed),
            misses: self.inner.counters.misses.load(Ordering::Relaxed),
            rebuilds: self.inner.counters.rebuilds.load(Ordering::Relaxed),
        }
    }

    /// Where `key`'s artifacts live, when persistence is configured.
    pub fn artifact_paths(&self, key: CacheKey) -> Option<(PathBuf, PathBuf)> {
        self.inner
            .config
            .cache_dir
            .as_deref()
            .map(|dir| artifact_paths(dir, key))
    }

    // ========================================================================
    // Miss handling and publication
    // ========================================================================

    /// Called with the slot already claimed as `Building { prev: None }`.
    fn resolve_miss(&self, key: CacheKey, now: u64) -> Lookup {
        match self.load_entry(key) {
            Some(entry) if !is_stale(entry.meta.journal_tip_time, now, self.inner.config.max_age) => {
                self.publish_loaded(key, entry.clone());
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                Lookup::Hit(CachedView {
                    entry,
                    freshness: Freshness::Fresh,
                })
            }
            Some(entry) => {
                self.adopt_fallback(key, entry.clone());
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key.to_hex(), reason = "stale", "starting rebuild");
                Lookup::Rebuild(RebuildGuard::new(self.clone(), key, Some(entry)))
            }
            None => {
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key.to_hex(), reason = "absent", "starting rebuild");
                Lookup::Rebuild(RebuildGuard::new(self.clone(), key, None))
            }
        }
    }

    /// Best-effort warm start from disk. Unreadable artifacts are removed
    /// so the next miss goes straight to a rebuild.
    fn load_entry(&self, key: CacheKey) -> Option<Arc<CacheEntry>> {
        let dir = self.inner.config.cache_dir.as_deref()?;
        let (index_path, meta_path) = artifact_paths(dir, key);
        if !self.inner.files.exists(&index_path) {
            return None;
        }
        match self.read_entry(key, &index_path, &meta_path) {
            Ok(entry) => Some(Arc::new(entry)),
            Err(err) => {
                tracing::warn!(
                    key = %key.to_hex(),
                    error = %err,
                    "discarding unreadable cache artifact"
                );
                let _ = self.inner.files.remove(&index_path);
                let _ = self.inner.files.remove(&meta_path);
                None
            }
        }
    }

    fn read_entry(
        &self,
        key: CacheKey,
        index_path: &Path,
        meta_path: &Path,
    ) -> Result<CacheEntry, CacheError> {
        let index = EdgeBitmap::read_file(self.inner.files.as_ref(), index_path)?;
        let meta_bytes = self.inner.files.read(meta_path)?;
        let meta: CacheMeta = serde_json::from_slice(&meta_bytes)
            .map_err(|err| CacheError::MetaInvalid(err.to_string()))?;
        if meta.cardinality != index.len() {
            return Err(CacheError::MetaInvalid(format!(
                "cardinality {} does not match index ({} members)",
                meta.cardinality,
                index.len()
            )));
        }
        Ok(CacheEntry { key, index, meta })
    }

    /// Publish a disk-loaded entry into our claimed slot. If the claim was
    /// evicted meanwhile, the caller still gets the loaded data; the slot is
    /// left alone.
    fn publish_loaded(&self, key: CacheKey, entry: Arc<CacheEntry>) {
        let bucket = self.bucket_for(key);
        let mut slots = bucket.slots.lock();
        if matches!(slots.get(&key), Some(Slot::Building { prev: None })) {
            slots.insert(key, Slot::Ready(entry));
            bucket.committed.notify_all();
        }
    }

    /// Record a stale disk entry as the fallback generation for our claimed
    /// slot, so waiters that hit the deadline have something to take.
    fn adopt_fallback(&self, key: CacheKey, entry: Arc<CacheEntry>) {
        let bucket = self.bucket_for(key);
        let mut slots = bucket.slots.lock();
        if matches!(slots.get(&key), Some(Slot::Building { prev: None })) {
            slots.insert(key, Slot::Building { prev: Some(entry) });
        }
    }

    fn commit_entry(
        &self,
        key: CacheKey,
        index: EdgeBitmap,
        journal_tip_time: u64,
        built_at: u64,
    ) -> Arc<CacheEntry> {
        let meta = CacheMeta {
            journal_tip_time,
            built_at,
            cardinality: index.len(),
        };
        let entry = Arc::new(CacheEntry { key, index, meta });

        self.persist(key, &entry);

        let bucket = self.bucket_for(key);
        {
            let mut slots = bucket.slots.lock();
            // Do not resurrect a key that was evicted mid-rebuild.
            if matches!(slots.get(&key), Some(Slot::Building { .. })) {
                slots.insert(key, Slot::Ready(entry.clone()));
                bucket.committed.notify_all();
            }
        }
        self.inner.counters.rebuilds.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            key = %key.to_hex(),
            cardinality = entry.meta.cardinality,
            "committed rebuilt cache entry"
        );
        entry
    }

    fn persist(&self, key: CacheKey, entry: &CacheEntry) {
        let dir = match self.inner.config.cache_dir.as_deref() {
            Some(dir) => dir,
            None => return,
        };
        if let Err(err) = self.try_persist(dir, key, entry) {
            tracing::warn!(
                key = %key.to_hex(),
                error = %err,
                "failed to persist cache entry, keeping it in memory only"
            );
        }
    }

    fn try_persist(&self, dir: &Path, key: CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        self.inner.files.create_dir_all(dir)?;
        let (index_path, meta_path) = artifact_paths(dir, key);
        entry
            .index
            .write_file(self.inner.files.as_ref(), &index_path)?;
        let meta_bytes = serde_json::to_vec(&entry.meta)
            .map_err(|err| CacheError::MetaInvalid(err.to_string()))?;
        self.inner.files.write_atomic(&meta_path, &meta_bytes)?;
        Ok(())
    }

    /// Restore the slot after a guard was dropped without committing.
    fn release_abandoned(&self, key: CacheKey, prev: Option<Arc<CacheEntry>>) {
        let bucket = self.bucket_for(key);
        let mut slots = bucket.slots.lock();
        if matches!(slots.get(&key), Some(Slot::Building { .. })) {
            match prev {
                Some(entry) => {
                    slots.insert(key, Slot::Ready(entry));
                }
                None => {
                    slots.remove(&key);
                }
            }
            bucket.committed.notify_all();
            drop(slots);
            tracing::debug!(key = %key.to_hex(), "abandoned rebuild released its slot");
        }
    }

    fn bucket_for(&self, key: CacheKey) -> &Bucket {
        &self.inner.buckets[key.bucket(self.inner.buckets.len())]
    }
}

fn artifact_paths(dir: &Path, key: CacheKey) -> (PathBuf, PathBuf) {
    let hex = key.to_hex();
    (dir.join(format!("{hex}.gmc")), dir.join(format!("{hex}.json")))
}

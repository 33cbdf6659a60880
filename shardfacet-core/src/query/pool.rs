//! Recyclable bucket-map pool shared by concurrent shard scans.
//!
//! Collectors borrow their bucket map when a scan starts and the reduce step
//! hands emptied maps back once their entries were absorbed. Borrowing never
//! waits for a map to come back: an empty pool allocates a fresh one.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::api::types::PoolConfig;

/// Bucket key to entry map used by partial results.
pub type BucketMap<K, V> = HashMap<K, V>;

/// Counters for pool operations.
#[derive(Debug, Default)]
pub struct PoolStats {
  /// Borrows served by a recycled map.
  pub hits: AtomicU64,
  /// Borrows that had to allocate.
  pub misses: AtomicU64,
  /// Maps retained on release.
  pub returns: AtomicU64,
  /// Maps dropped on release (pool full or map too large).
  pub discards: AtomicU64,
}

impl PoolStats {
  fn record_hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  fn record_miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  fn record_return(&self) {
    self.returns.fetch_add(1, Ordering::Relaxed);
  }

  fn record_discard(&self) {
    self.discards.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> PoolStatsSnapshot {
    PoolStatsSnapshot {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      returns: self.returns.load(Ordering::Relaxed),
      discards: self.discards.load(Ordering::Relaxed),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatsSnapshot {
  pub hits: u64,
  pub misses: u64,
  pub returns: u64,
  pub discards: u64,
}

/// Bounded pool of reusable bucket maps.
///
/// Releasing a map that was already released, or touching a map after it
/// was released, is impossible through this API: both `borrow` and
/// `release` move the map.
#[derive(Debug)]
pub struct MapPool<K, V> {
  maps: Mutex<VecDeque<BucketMap<K, V>>>,
  config: PoolConfig,
  stats: PoolStats,
}

impl<K: Eq + Hash, V> MapPool<K, V> {
  pub fn new(config: PoolConfig) -> Self {
    Self {
      maps: Mutex::new(VecDeque::with_capacity(config.max_pooled_maps.min(64))),
      config,
      stats: PoolStats::default(),
    }
  }

  /// Takes an empty map from the pool, allocating one when none is retained.
  pub fn borrow(&self) -> BucketMap<K, V> {
    let recycled = self.maps.lock().pop_back();
    match recycled {
      Some(map) => {
        self.stats.record_hit();
        map
      }
      None => {
        self.stats.record_miss();
        BucketMap::new()
      }
    }
  }

  /// Clears `map` and retains it for reuse unless the pool is full or the
  /// map grew past the retained capacity bound.
  pub fn release(&self, mut map: BucketMap<K, V>) {
    if map.capacity() > self.config.max_map_capacity {
      tracing::trace!(capacity = map.capacity(), "discarding oversized bucket map");
      self.stats.record_discard();
      return;
    }
    map.clear();
    let mut maps = self.maps.lock();
    if maps.len() >= self.config.max_pooled_maps {
      drop(maps);
      self.stats.record_discard();
      return;
    }
    maps.push_back(map);
    drop(maps);
    self.stats.record_return();
  }

  /// Number of maps currently retained.
  pub fn len(&self) -> usize {
    self.maps.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn stats(&self) -> &PoolStats {
    &self.stats
  }
}

impl<K: Eq + Hash, V> Default for MapPool<K, V> {
  fn default() -> Self {
    Self::new(PoolConfig::default())
  }
}

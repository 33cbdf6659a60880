//! Distinct date histogram and latest-value facets.
//!
//! Each facet kind provides a per-document aggregator, a shard collector that
//! emits a [`PartialFacet`], and reduce/output hooks used by
//! [`reduce::reduce_facet`]. The merge and sort machinery is shared and
//! generic over [`FacetEntry`].

pub mod distinct;
pub mod latest;
pub mod order;
pub mod output;
pub mod plan;
pub mod reduce;

use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;

use crate::api::types::{FacetKind, FacetOrder, PoolConfig, Scalar};
use crate::query::pool::{BucketMap, MapPool};

pub use distinct::{DistinctAggregator, DistinctCollector, DistinctEntry, DistinctFields};
pub use latest::{LatestAggregator, LatestCollector, LatestEntry, LatestFields, LatestParams};
pub use plan::{FacetPlan, ShardFacetCollector};

/// One bucket of a partial or final facet result.
pub trait FacetEntry: Debug + Send + Sized {
  type Key: Debug + Clone + Eq + Hash + Ord + Send;
  /// Facet-level parameters carried by partial results.
  type Params: FacetParams;

  fn key(&self) -> Self::Key;

  /// Orders entries by bucket key; used to break ties left by a facet order.
  fn cmp_key(&self, other: &Self) -> Ordering;

  /// Folds `incoming`, an entry with the same key from another partial
  /// result, into `self`.
  fn merge(&mut self, incoming: Self);

  fn time(&self) -> i64;

  fn count(&self) -> u64;

  /// Value compared by a by-total order, if the entry kind has one.
  fn total(&self) -> Option<i64>;
}

pub trait FacetParams: Debug + Clone + Send {
  fn order(&self) -> FacetOrder;

  /// `(start, size)` window applied to the sorted entries, if any.
  fn window(&self) -> Option<(usize, usize)> {
    None
  }
}

impl FacetParams for FacetOrder {
  fn order(&self) -> FacetOrder {
    *self
  }
}

/// Per-shard facet state prior to the cross-shard reduce.
///
/// The bucket map is usually borrowed from a [`MapPool`]; `pooled` records
/// that so the reduce step knows to hand it back once its entries have been
/// absorbed.
#[derive(Debug)]
pub struct PartialFacet<E: FacetEntry> {
  name: String,
  params: E::Params,
  entries: BucketMap<E::Key, E>,
  pooled: bool,
}

impl<E: FacetEntry> PartialFacet<E> {
  /// An empty partial result backed by a freshly allocated map.
  pub fn new(name: impl Into<String>, params: E::Params) -> Self {
    Self {
      name: name.into(),
      params,
      entries: BucketMap::new(),
      pooled: false,
    }
  }

  /// A partial result over a map borrowed from a pool.
  pub fn pooled(name: impl Into<String>, params: E::Params, entries: BucketMap<E::Key, E>) -> Self {
    Self {
      name: name.into(),
      params,
      entries,
      pooled: true,
    }
  }

  /// Builds a partial result from entries, merging entries that share a key
  /// in iteration order.
  pub fn from_entries(
    name: impl Into<String>,
    params: E::Params,
    entries: impl IntoIterator<Item = E>,
  ) -> Self {
    let mut partial = Self::new(name, params);
    for entry in entries {
      absorb_entry(&mut partial.entries, entry.key(), entry);
    }
    partial
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn params(&self) -> &E::Params {
    &self.params
  }

  pub fn is_pooled(&self) -> bool {
    self.pooled
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, key: &E::Key) -> Option<&E> {
    self.entries.get(key)
  }

  pub fn entries(&self) -> impl Iterator<Item = &E> + '_ {
    self.entries.values()
  }

  pub(crate) fn into_parts(self) -> (String, E::Params, BucketMap<E::Key, E>, bool) {
    (self.name, self.params, self.entries, self.pooled)
  }
}

/// Adopts `entry` into `map`, or merges it into the entry already stored
/// under `key`.
pub(crate) fn absorb_entry<E: FacetEntry>(map: &mut BucketMap<E::Key, E>, key: E::Key, entry: E) {
  match map.entry(key) {
    hashbrown::hash_map::Entry::Occupied(mut existing) => existing.get_mut().merge(entry),
    hashbrown::hash_map::Entry::Vacant(slot) => {
      slot.insert(entry);
    }
  }
}

/// The merged, ordered result of one facet.
#[derive(Debug)]
pub struct FinalFacet<E: FacetEntry> {
  pub name: String,
  pub params: E::Params,
  pub entries: Vec<E>,
  /// Facet-level total, when the facet kind defines one.
  pub total: Option<u64>,
}

/// Partial result of any facet kind, as produced by one shard scan.
#[derive(Debug)]
pub enum ShardFacet {
  Distinct(PartialFacet<DistinctEntry>),
  Latest(PartialFacet<LatestEntry>),
}

impl ShardFacet {
  pub fn kind(&self) -> FacetKind {
    match self {
      ShardFacet::Distinct(_) => FacetKind::DistinctDateHistogram,
      ShardFacet::Latest(_) => FacetKind::Latest,
    }
  }

  pub fn name(&self) -> &str {
    match self {
      ShardFacet::Distinct(p) => p.name(),
      ShardFacet::Latest(p) => p.name(),
    }
  }

  pub fn len(&self) -> usize {
    match self {
      ShardFacet::Distinct(p) => p.len(),
      ShardFacet::Latest(p) => p.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Hands a pooled map back without reducing it.
  pub(crate) fn release(self, pools: &FacetPools) {
    match self {
      ShardFacet::Distinct(p) => release_partial(&pools.distinct, p),
      ShardFacet::Latest(p) => release_partial(&pools.latest, p),
    }
  }
}

fn release_partial<E: FacetEntry>(pool: &MapPool<E::Key, E>, partial: PartialFacet<E>) {
  let (_, _, entries, pooled) = partial.into_parts();
  if pooled {
    pool.release(entries);
  }
}

impl From<PartialFacet<DistinctEntry>> for ShardFacet {
  fn from(partial: PartialFacet<DistinctEntry>) -> Self {
    ShardFacet::Distinct(partial)
  }
}

impl From<PartialFacet<LatestEntry>> for ShardFacet {
  fn from(partial: PartialFacet<LatestEntry>) -> Self {
    ShardFacet::Latest(partial)
  }
}

/// The recyclable map pools shared by every shard scan and reduce, one per
/// entry type.
#[derive(Debug, Default)]
pub struct FacetPools {
  pub distinct: MapPool<i64, DistinctEntry>,
  pub latest: MapPool<Scalar, LatestEntry>,
}

impl FacetPools {
  pub fn new(config: PoolConfig) -> Self {
    Self {
      distinct: MapPool::new(config.clone()),
      latest: MapPool::new(config),
    }
  }
}

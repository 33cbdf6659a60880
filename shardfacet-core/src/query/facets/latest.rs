use std::cmp::Ordering;

use hashbrown::hash_map::Entry;

use crate::api::types::{FacetOrder, LatestField, Scalar};
use crate::host::{scan_kind_filter, DocumentSource, FieldHandle, ResolvedField};
use crate::query::bucketing::timestamp_millis;
use crate::query::collector::{DocCollector, ShardCollector};
use crate::query::facets::{FacetEntry, FacetParams, PartialFacet};
use crate::query::pool::{BucketMap, MapPool};
use crate::DocId;

/// Most recently timestamped value seen for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestEntry {
  pub key: Scalar,
  pub timestamp: i64,
  pub value: i64,
}

impl LatestEntry {
  pub fn new(key: Scalar, timestamp: i64, value: i64) -> Self {
    Self {
      key,
      timestamp,
      value,
    }
  }

  /// Takes over `timestamp` and `value` only when `timestamp` is strictly
  /// newer. On an exact tie the value observed first is kept.
  fn offer(&mut self, timestamp: i64, value: i64) {
    if timestamp > self.timestamp {
      self.timestamp = timestamp;
      self.value = value;
    }
  }
}

impl FacetEntry for LatestEntry {
  type Key = Scalar;
  type Params = LatestParams;

  fn key(&self) -> Scalar {
    self.key.clone()
  }

  fn cmp_key(&self, other: &Self) -> Ordering {
    self.key.cmp(&other.key)
  }

  fn merge(&mut self, incoming: Self) {
    self.offer(incoming.timestamp, incoming.value);
  }

  fn time(&self) -> i64 {
    self.timestamp
  }

  fn count(&self) -> u64 {
    1
  }

  fn total(&self) -> Option<i64> {
    Some(self.value)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestParams {
  pub order: FacetOrder,
  /// Maximum number of entries returned after `start`.
  pub size: usize,
  /// Number of sorted entries skipped.
  pub start: usize,
  pub fields: Option<Vec<LatestField>>,
}

impl LatestParams {
  pub fn new(order: FacetOrder, size: usize, start: usize) -> Self {
    Self {
      order,
      size,
      start,
      fields: None,
    }
  }

  pub fn emits(&self, field: LatestField) -> bool {
    self
      .fields
      .as_ref()
      .map_or(true, |fields| fields.contains(&field))
  }
}

impl Default for LatestParams {
  fn default() -> Self {
    Self::new(FacetOrder::newest_first(), 10, 0)
  }
}

impl FacetParams for LatestParams {
  fn order(&self) -> FacetOrder {
    self.order
  }

  fn window(&self) -> Option<(usize, usize)> {
    Some((self.start, self.size))
  }
}

/// Per-document update rule of the latest facet.
#[derive(Debug, Default)]
pub struct LatestAggregator {
  entries: BucketMap<Scalar, LatestEntry>,
}

impl LatestAggregator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Aggregates into `entries`, typically a map borrowed from a pool.
  pub fn with_map(entries: BucketMap<Scalar, LatestEntry>) -> Self {
    Self { entries }
  }

  pub fn observe(&mut self, key: Scalar, timestamp: i64, value: i64) {
    match self.entries.entry(key) {
      Entry::Occupied(mut existing) => existing.get_mut().offer(timestamp, value),
      Entry::Vacant(slot) => {
        let key = slot.key().clone();
        slot.insert(LatestEntry::new(key, timestamp, value));
      }
    }
  }

  pub fn get(&self, key: &Scalar) -> Option<&LatestEntry> {
    self.entries.get(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn into_map(self) -> BucketMap<Scalar, LatestEntry> {
    self.entries
  }
}

#[derive(Debug, Clone)]
pub struct LatestFields {
  pub key: ResolvedField,
  pub value: ResolvedField,
  pub timestamp: ResolvedField,
}

/// Shard collector for the latest facet.
pub struct LatestCollector<'a, S> {
  name: String,
  params: LatestParams,
  source: &'a S,
  key_field: FieldHandle,
  value_field: FieldHandle,
  ts_field: FieldHandle,
  kind_filter: Option<String>,
  aggregator: LatestAggregator,
}

impl<'a, S: DocumentSource> LatestCollector<'a, S> {
  /// Creates a collector whose entry map is borrowed from `pool` and handed
  /// over to the partial result on [`ShardCollector::finish`].
  pub fn new(
    name: impl Into<String>,
    params: LatestParams,
    source: &'a S,
    fields: LatestFields,
    pool: &MapPool<Scalar, LatestEntry>,
  ) -> Self {
    let kind_filter = scan_kind_filter([&fields.key, &fields.value, &fields.timestamp].into_iter());
    Self {
      name: name.into(),
      params,
      source,
      key_field: fields.key.handle,
      value_field: fields.value.handle,
      ts_field: fields.timestamp.handle,
      kind_filter,
      aggregator: LatestAggregator::with_map(pool.borrow()),
    }
  }
}

impl<S: DocumentSource> DocCollector for LatestCollector<'_, S> {
  fn collect(&mut self, doc_id: DocId) {
    let source = self.source;
    if let Some(kind) = self.kind_filter.as_deref() {
      if source.doc_kind(doc_id) != Some(kind) {
        return;
      }
    }
    let Some(timestamp) = source
      .values(&self.ts_field, doc_id)
      .next()
      .and_then(|v| timestamp_millis(&v))
    else {
      return;
    };
    let Some(value) = source
      .values(&self.value_field, doc_id)
      .next()
      .and_then(|v| v.as_i64())
    else {
      return;
    };
    for key in source.values(&self.key_field, doc_id) {
      self.aggregator.observe(key, timestamp, value);
    }
  }
}

impl<S: DocumentSource> ShardCollector for LatestCollector<'_, S> {
  type Output = PartialFacet<LatestEntry>;

  fn finish(self) -> Self::Output {
    PartialFacet::pooled(self.name, self.params, self.aggregator.into_map())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::host::{FieldResolver, IdentityResolver, MemoryDoc, MemoryShard};
  use crate::query::collector::drive;

  fn scan(shard: &MemoryShard) -> PartialFacet<LatestEntry> {
    let pool = MapPool::default();
    let fields = LatestFields {
      key: IdentityResolver.resolve("user"),
      value: IdentityResolver.resolve("score"),
      timestamp: IdentityResolver.resolve("ts"),
    };
    let collector = LatestCollector::new("scores", LatestParams::default(), shard, fields, &pool);
    drive(collector, shard.matching_docs())
  }

  fn doc(user: &str, ts: i64, score: i64) -> MemoryDoc {
    MemoryDoc::new()
      .with_field("user", [user])
      .with_field("ts", [ts])
      .with_field("score", [score])
  }

  #[test]
  fn strictly_newer_timestamp_overwrites() {
    let mut agg = LatestAggregator::new();
    let key = Scalar::from("k");
    agg.observe(key.clone(), 5, 1);
    agg.observe(key.clone(), 10, 2);
    agg.observe(key.clone(), 7, 3);
    assert_eq!(agg.get(&key), Some(&LatestEntry::new(key.clone(), 10, 2)));
  }

  #[test]
  fn first_value_wins_on_timestamp_tie() {
    let mut agg = LatestAggregator::new();
    let key = Scalar::Int(9);
    agg.observe(key.clone(), 7, 100);
    agg.observe(key.clone(), 7, 200);
    assert_eq!(agg.get(&key).map(|e| e.value), Some(100));
  }

  #[test]
  fn collector_keeps_latest_per_key_in_document_order() {
    let shard = MemoryShard::new(vec![
      doc("a", 5, 1),
      doc("b", 3, 10),
      doc("a", 9, 2),
      doc("a", 9, 3),
      doc("b", 1, 11),
    ]);
    let partial = scan(&shard);
    assert_eq!(partial.len(), 2);
    let a = partial.get(&Scalar::from("a")).unwrap();
    assert_eq!((a.timestamp, a.value), (9, 2));
    let b = partial.get(&Scalar::from("b")).unwrap();
    assert_eq!((b.timestamp, b.value), (3, 10));
  }

  #[test]
  fn documents_missing_timestamp_or_value_are_skipped() {
    let shard = MemoryShard::new(vec![
      MemoryDoc::new().with_field("user", ["a"]).with_field("score", [1]),
      MemoryDoc::new().with_field("user", ["b"]).with_field("ts", [1]),
      MemoryDoc::new().with_field("ts", [1]).with_field("score", [1]),
    ]);
    assert!(scan(&shard).is_empty());
  }

  #[test]
  fn multi_valued_keys_emit_one_entry_each() {
    let shard = MemoryShard::new(vec![MemoryDoc::new()
      .with_field("user", ["a", "b"])
      .with_field("ts", [4])
      .with_field("score", [8])]);
    let partial = scan(&shard);
    assert_eq!(partial.len(), 2);
    assert_eq!(partial.get(&Scalar::from("b")).map(|e| e.value), Some(8));
  }

  #[test]
  fn field_subset_controls_emission() {
    let mut params = LatestParams::default();
    assert!(params.emits(LatestField::Key));
    params.fields = Some(vec![LatestField::Value]);
    assert!(params.emits(LatestField::Value));
    assert!(!params.emits(LatestField::Timestamp));
  }
}

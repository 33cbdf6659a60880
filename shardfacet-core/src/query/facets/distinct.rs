use std::cmp::Ordering;

use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::api::types::{FacetOrder, Scalar};
use crate::host::{scan_kind_filter, DocumentSource, FieldHandle, ResolvedField, TimeBucketer};
use crate::query::bucketing::timestamp_millis;
use crate::query::collector::{DocCollector, ShardCollector};
use crate::query::facets::{FacetEntry, PartialFacet};
use crate::query::pool::{BucketMap, MapPool};
use crate::DocId;

/// Distinct values observed within one time bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinctEntry {
  pub time: i64,
  pub values: HashSet<Scalar>,
}

impl DistinctEntry {
  pub fn new(time: i64) -> Self {
    Self {
      time,
      values: HashSet::new(),
    }
  }

  /// Adds `value` to the bucket. Returns false if it was already present.
  pub fn insert(&mut self, value: Scalar) -> bool {
    self.values.insert(value)
  }

  pub fn count(&self) -> u64 {
    self.values.len() as u64
  }
}

impl FacetEntry for DistinctEntry {
  type Key = i64;
  type Params = FacetOrder;

  fn key(&self) -> i64 {
    self.time
  }

  fn cmp_key(&self, other: &Self) -> Ordering {
    self.time.cmp(&other.time)
  }

  fn merge(&mut self, mut incoming: Self) {
    if incoming.values.len() > self.values.len() {
      std::mem::swap(&mut self.values, &mut incoming.values);
    }
    self.values.extend(incoming.values);
  }

  fn time(&self) -> i64 {
    self.time
  }

  fn count(&self) -> u64 {
    DistinctEntry::count(self)
  }

  fn total(&self) -> Option<i64> {
    None
  }
}

/// Per-document update rule of the distinct histogram.
#[derive(Debug, Default)]
pub struct DistinctAggregator {
  buckets: BucketMap<i64, DistinctEntry>,
}

impl DistinctAggregator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Aggregates into `buckets`, typically a map borrowed from a pool.
  pub fn with_map(buckets: BucketMap<i64, DistinctEntry>) -> Self {
    Self { buckets }
  }

  pub fn observe(&mut self, time: i64, value: Scalar) {
    self
      .buckets
      .entry(time)
      .or_insert_with(|| DistinctEntry::new(time))
      .insert(value);
  }

  pub fn get(&self, time: i64) -> Option<&DistinctEntry> {
    self.buckets.get(&time)
  }

  pub fn len(&self) -> usize {
    self.buckets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buckets.is_empty()
  }

  pub fn into_map(self) -> BucketMap<i64, DistinctEntry> {
    self.buckets
  }
}

#[derive(Debug, Clone)]
pub struct DistinctFields {
  pub key: ResolvedField,
  pub value: ResolvedField,
}

/// Shard collector for the distinct date histogram.
pub struct DistinctCollector<'a, S> {
  name: String,
  order: FacetOrder,
  source: &'a S,
  key_field: FieldHandle,
  value_field: FieldHandle,
  kind_filter: Option<String>,
  bucketer: &'a dyn TimeBucketer,
  aggregator: DistinctAggregator,
}

impl<'a, S: DocumentSource> DistinctCollector<'a, S> {
  /// Creates a collector whose bucket map is borrowed from `pool` and handed
  /// over to the partial result on [`ShardCollector::finish`].
  pub fn new(
    name: impl Into<String>,
    order: FacetOrder,
    source: &'a S,
    fields: DistinctFields,
    bucketer: &'a dyn TimeBucketer,
    pool: &MapPool<i64, DistinctEntry>,
  ) -> Self {
    let kind_filter = scan_kind_filter([&fields.key, &fields.value].into_iter());
    Self {
      name: name.into(),
      order,
      source,
      key_field: fields.key.handle,
      value_field: fields.value.handle,
      kind_filter,
      bucketer,
      aggregator: DistinctAggregator::with_map(pool.borrow()),
    }
  }
}

impl<S: DocumentSource> DocCollector for DistinctCollector<'_, S> {
  fn collect(&mut self, doc_id: DocId) {
    let source = self.source;
    if let Some(kind) = self.kind_filter.as_deref() {
      if source.doc_kind(doc_id) != Some(kind) {
        return;
      }
    }
    let bucketer = self.bucketer;
    let times: SmallVec<[i64; 2]> = source
      .values(&self.key_field, doc_id)
      .filter_map(|v| timestamp_millis(&v))
      .filter_map(|ts| bucketer.bucket(ts))
      .collect();
    match times.as_slice() {
      [] => {}
      [time] => {
        for value in source.values(&self.value_field, doc_id) {
          self.aggregator.observe(*time, value);
        }
      }
      _ => {
        let values: SmallVec<[Scalar; 4]> = source.values(&self.value_field, doc_id).collect();
        for &time in times.iter() {
          for value in values.iter() {
            self.aggregator.observe(time, value.clone());
          }
        }
      }
    }
  }
}

impl<S: DocumentSource> ShardCollector for DistinctCollector<'_, S> {
  type Output = PartialFacet<DistinctEntry>;

  fn finish(self) -> Self::Output {
    PartialFacet::pooled(self.name, self.order, self.aggregator.into_map())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::host::{FieldMappings, FieldResolver, MemoryDoc, MemoryShard};
  use crate::query::bucketing::DateInterval;
  use crate::query::collector::drive;

  fn scan(shard: &MemoryShard, resolver: &impl FieldResolver) -> PartialFacet<DistinctEntry> {
    let pool = MapPool::default();
    let interval = DateInterval::Fixed(10);
    let fields = DistinctFields {
      key: resolver.resolve("ts"),
      value: resolver.resolve("user"),
    };
    let collector = DistinctCollector::new(
      "visitors",
      FacetOrder::default(),
      shard,
      fields,
      &interval,
      &pool,
    );
    drive(collector, shard.matching_docs())
  }

  #[test]
  fn aggregator_insertion_is_idempotent() {
    let mut agg = DistinctAggregator::new();
    agg.observe(0, Scalar::from("a"));
    agg.observe(0, Scalar::from("a"));
    agg.observe(0, Scalar::from("b"));
    agg.observe(10, Scalar::from("a"));
    assert_eq!(agg.len(), 2);
    assert_eq!(agg.get(0).map(|e| e.count()), Some(2));
    assert_eq!(agg.get(10).map(|e| e.count()), Some(1));
  }

  #[test]
  fn merge_is_set_union() {
    let mut left = DistinctEntry::new(5);
    left.insert(Scalar::from("a"));
    let mut right = DistinctEntry::new(5);
    right.insert(Scalar::from("a"));
    right.insert(Scalar::from("b"));
    right.insert(Scalar::Int(3));
    left.merge(right);
    assert_eq!(left.count(), 3);
    assert!(left.values.contains(&Scalar::Int(3)));
  }

  #[test]
  fn collector_buckets_documents_and_skips_missing_fields() {
    let shard = MemoryShard::new(vec![
      MemoryDoc::new().with_field("ts", [1]).with_field("user", ["a"]),
      MemoryDoc::new().with_field("ts", [4]).with_field("user", ["a", "b"]),
      MemoryDoc::new().with_field("ts", [12]).with_field("user", ["c"]),
      MemoryDoc::new().with_field("user", ["ghost"]),
      MemoryDoc::new().with_field("ts", [15]),
      MemoryDoc::new().with_field("ts", ["not a time"]).with_field("user", ["x"]),
    ]);
    let partial = scan(&shard, &FieldMappings::new());
    assert!(partial.is_pooled());
    assert_eq!(partial.len(), 2);
    assert_eq!(partial.get(&0).map(|e| e.count()), Some(2));
    assert_eq!(partial.get(&10).map(|e| e.count()), Some(1));
  }

  #[test]
  fn multi_valued_keys_feed_every_bucket() {
    let shard = MemoryShard::new(vec![MemoryDoc::new()
      .with_field("ts", [3, 27])
      .with_field("user", ["a", "b"])]);
    let partial = scan(&shard, &FieldMappings::new());
    assert_eq!(partial.len(), 2);
    assert_eq!(partial.get(&0).map(|e| e.count()), Some(2));
    assert_eq!(partial.get(&20).map(|e| e.count()), Some(2));
  }

  #[test]
  fn kind_filter_and_physical_names_come_from_resolution() {
    let shard = MemoryShard::new(vec![
      MemoryDoc::new()
        .with_kind("visit")
        .with_field("visit.at", [1])
        .with_field("visit.user", ["a"]),
      MemoryDoc::new()
        .with_kind("order")
        .with_field("visit.at", [1])
        .with_field("visit.user", ["b"]),
    ]);
    let mappings = FieldMappings::new()
      .map("ts", "visit.at", None)
      .map("user", "visit.user", Some("visit"));
    let partial = scan(&shard, &mappings);
    let bucket = partial.get(&0).unwrap();
    assert_eq!(bucket.count(), 1);
    assert!(bucket.values.contains(&Scalar::from("a")));
  }
}

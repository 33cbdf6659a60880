use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;
use shardfacet_core::api::types::PoolConfig;
use shardfacet_core::host::{IdentityResolver, MemoryDoc, MemoryShard};
use shardfacet_core::{FacetError, FacetPipeline, FacetPools, FacetRequests, FacetResponse};

fn requests() -> FacetRequests {
  serde_json::from_value(json!({
    "active_users": {"distinct_date_histogram": {
      "key_field": "ts", "value_field": "user", "interval": "1m", "order": "reverse_count"
    }},
    "last_score": {"latest": {
      "key_field": "user", "value_field": "score", "ts_field": "ts", "size": 25
    }}
  }))
  .unwrap()
}

fn random_docs(seed: u64, count: usize) -> Vec<MemoryDoc> {
  let mut rng = StdRng::seed_from_u64(seed);
  (0..count)
    .map(|_| {
      MemoryDoc::new()
        .with_field("ts", [rng.gen_range(0..600_000i64)])
        .with_field("user", [format!("user_{}", rng.gen_range(0..200))])
        .with_field("score", [rng.gen_range(-1_000..1_000i64)])
    })
    .collect()
}

fn split(docs: Vec<MemoryDoc>, shards: usize) -> Vec<MemoryShard> {
  let per_shard = docs.len().div_ceil(shards).max(1);
  docs
    .chunks(per_shard)
    .map(|chunk| MemoryShard::new(chunk.to_vec()))
    .collect()
}

#[test]
fn partitioning_does_not_change_results() {
  let docs = random_docs(7, 2_000);
  let pipeline = FacetPipeline::from_requests(&requests(), Arc::new(FacetPools::default())).unwrap();
  let single = pipeline.execute(&[MemoryShard::new(docs.clone())], &IdentityResolver);
  match &single["active_users"] {
    Ok(FacetResponse::DistinctDateHistogram { entries, .. }) => assert_eq!(entries.len(), 10),
    other => panic!("unexpected result {other:?}"),
  }
  for shards in [2, 5, 16] {
    let sharded = pipeline.execute(&split(docs.clone(), shards), &IdentityResolver);
    assert_eq!(single, sharded, "{shards} shards");
  }
}

#[test]
fn concurrent_queries_share_one_pool() {
  let pools = Arc::new(FacetPools::new(PoolConfig {
    max_pooled_maps: 8,
    max_map_capacity: 1 << 16,
  }));
  let shards = split(random_docs(11, 1_000), 4);
  let expected = FacetPipeline::from_requests(&requests(), Arc::default())
    .unwrap()
    .execute(&shards, &IdentityResolver);

  std::thread::scope(|scope| {
    for _ in 0..4 {
      let pools = pools.clone();
      let shards = &shards;
      let expected = &expected;
      scope.spawn(move || {
        let pipeline = FacetPipeline::from_requests(&requests(), pools).unwrap();
        for _ in 0..5 {
          assert_eq!(&pipeline.execute(shards, &IdentityResolver), expected);
        }
      });
    }
  });

  assert!(pools.distinct.len() <= 8);
  assert!(pools.latest.len() <= 8);
  let stats = pools.distinct.stats().snapshot();
  assert!(stats.hits > 0, "maps are recycled between queries: {stats:?}");
}

#[test]
fn independent_facets_survive_a_failing_one() {
  let pipeline = FacetPipeline::from_requests(&requests(), Arc::default()).unwrap();
  let shards = split(random_docs(3, 100), 2);
  let mut partials = pipeline.scan_shards(&shards, &IdentityResolver);
  let swapped = partials[0].remove("last_score").unwrap();
  partials[0].insert("active_users".to_string(), swapped);

  let results = pipeline.reduce(partials);
  assert_eq!(results.len(), 2);
  assert!(matches!(
    &results["active_users"],
    Err(FacetError::KindMismatch { facet, .. }) if facet == "active_users"
  ));
  match &results["last_score"] {
    Ok(FacetResponse::Latest { entries, .. }) => assert!(!entries.is_empty()),
    other => panic!("unexpected result {other:?}"),
  }
}

#[test]
fn no_matching_documents_yields_empty_responses() {
  let pipeline = FacetPipeline::from_requests(&requests(), Arc::default()).unwrap();
  let shard = MemoryShard::new(random_docs(5, 10)).with_matches(Vec::new());
  let results = pipeline.execute(&[shard], &IdentityResolver);
  assert_eq!(
    serde_json::to_value(
      results
        .iter()
        .map(|(name, result)| (name.clone(), result.clone().unwrap()))
        .collect::<std::collections::BTreeMap<_, _>>()
    )
    .unwrap(),
    json!({
      "active_users": {"_type": "distinct_date_histogram", "entries": [], "total_count": 0},
      "last_score": {"_type": "latest", "total": 0, "entries": []}
    })
  );
}

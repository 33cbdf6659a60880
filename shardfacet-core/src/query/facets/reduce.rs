//! Cross-shard reduce of partial facet results.

use crate::api::errors::FacetError;
use crate::api::types::{FacetKind, FacetResponse};
use crate::query::facets::output::{distinct_response, latest_response};
use crate::query::facets::{
  absorb_entry, FacetEntry, FacetParams, FacetPools, FinalFacet, PartialFacet, ShardFacet,
};
use crate::query::pool::{BucketMap, MapPool};

/// Merges every partial result of facet `name` into its final, sorted form.
///
/// Pooled maps of the partials, and the merge map itself, are handed back to
/// `pool` once their entries have been moved out.
pub fn reduce<E: FacetEntry>(
  name: &str,
  pool: &MapPool<E::Key, E>,
  partials: Vec<PartialFacet<E>>,
) -> Result<FinalFacet<E>, FacetError> {
  let mut partials = partials.into_iter();
  let Some(first) = partials.next() else {
    return Err(FacetError::MissingPartial {
      facet: name.to_string(),
    });
  };
  if partials.len() == 0 {
    let (_, params, map, pooled) = first.into_parts();
    let entries = drain_entries(map, pooled.then_some(pool));
    return Ok(finalize(name, params, entries));
  }

  let params = first.params().clone();
  let mut merged: BucketMap<E::Key, E> = pool.borrow();
  for partial in std::iter::once(first).chain(partials) {
    let (_, _, mut map, pooled) = partial.into_parts();
    for (key, entry) in map.drain() {
      absorb_entry(&mut merged, key, entry);
    }
    if pooled {
      pool.release(map);
    }
  }
  let entries = drain_entries(merged, Some(pool));
  Ok(finalize(name, params, entries))
}

fn drain_entries<E: FacetEntry>(
  mut map: BucketMap<E::Key, E>,
  pool: Option<&MapPool<E::Key, E>>,
) -> Vec<E> {
  let entries = map.drain().map(|(_, entry)| entry).collect();
  if let Some(pool) = pool {
    pool.release(map);
  }
  entries
}

fn finalize<E: FacetEntry>(name: &str, params: E::Params, mut entries: Vec<E>) -> FinalFacet<E> {
  params.order().sort(&mut entries);
  let total = params.window().map(|(start, size)| {
    let total = entries.len() as u64;
    entries.drain(..start.min(entries.len()));
    entries.truncate(size);
    total
  });
  FinalFacet {
    name: name.to_string(),
    params,
    entries,
    total,
  }
}

/// Reduces the partial results gathered for one facet name and shapes the
/// response. Partials of mixed kinds fail this facet only; their maps still
/// go back to the pools.
pub fn reduce_facet(
  name: &str,
  pools: &FacetPools,
  partials: Vec<ShardFacet>,
) -> Result<FacetResponse, FacetError> {
  let Some(expected) = partials.first().map(ShardFacet::kind) else {
    return Err(FacetError::MissingPartial {
      facet: name.to_string(),
    });
  };
  if let Some(found) = partials.iter().map(ShardFacet::kind).find(|k| *k != expected) {
    tracing::warn!(facet = name, %expected, %found, "partial results disagree on facet kind");
    for partial in partials {
      partial.release(pools);
    }
    return Err(FacetError::KindMismatch {
      facet: name.to_string(),
      expected,
      found,
    });
  }
  let shards = partials.len();
  let response = match expected {
    FacetKind::DistinctDateHistogram => {
      let typed = partials
        .into_iter()
        .filter_map(|p| match p {
          ShardFacet::Distinct(p) => Some(p),
          ShardFacet::Latest(_) => None,
        })
        .collect();
      distinct_response(&reduce(name, &pools.distinct, typed)?)
    }
    FacetKind::Latest => {
      let typed = partials
        .into_iter()
        .filter_map(|p| match p {
          ShardFacet::Latest(p) => Some(p),
          ShardFacet::Distinct(_) => None,
        })
        .collect();
      latest_response(&reduce(name, &pools.latest, typed)?)
    }
  };
  tracing::debug!(facet = name, kind = %expected, shards, "reduced facet");
  Ok(response)
}

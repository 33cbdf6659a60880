//! Scatter/gather execution: scan every shard concurrently, then reduce each
//! facet name independently.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::api::errors::FacetError;
use crate::api::types::{FacetRequests, FacetResponse};
use crate::host::{DocumentSource, FieldResolver};
use crate::query::collector::{DocCollector, ShardCollector};
use crate::query::facets::reduce::reduce_facet;
use crate::query::facets::{FacetPlan, FacetPools, ShardFacet};

/// Partial results of one shard, keyed by facet name.
pub type ShardPartials = BTreeMap<String, ShardFacet>;

/// Final responses keyed by facet name. A facet whose reduce failed carries
/// its error without affecting the others.
pub type FacetResults = BTreeMap<String, Result<FacetResponse, FacetError>>;

pub struct FacetPipeline {
  plan: FacetPlan,
  pools: Arc<FacetPools>,
}

impl FacetPipeline {
  pub fn new(plan: FacetPlan, pools: Arc<FacetPools>) -> Self {
    Self { plan, pools }
  }

  pub fn from_requests(requests: &FacetRequests, pools: Arc<FacetPools>) -> Result<Self> {
    let plan = FacetPlan::new(requests).context("planning facet requests")?;
    Ok(Self::new(plan, pools))
  }

  pub fn plan(&self) -> &FacetPlan {
    &self.plan
  }

  pub fn pools(&self) -> &Arc<FacetPools> {
    &self.pools
  }

  /// Runs every planned facet over the matching documents of one shard.
  pub fn scan_shard<S, R>(&self, source: &S, resolver: &R) -> ShardPartials
  where
    S: DocumentSource,
    R: FieldResolver + ?Sized,
  {
    let mut collector = self.plan.collector(source, resolver, &self.pools);
    for doc_id in source.matching_docs() {
      collector.collect(doc_id);
    }
    let docs_seen = collector.docs_seen();
    let partials = collector.finish();
    tracing::debug!(facets = partials.len(), docs_seen, "shard scan finished");
    partials
  }

  /// Scans all shards in parallel. Partials come back in shard order.
  pub fn scan_shards<S, R>(&self, shards: &[S], resolver: &R) -> Vec<ShardPartials>
  where
    S: DocumentSource + Sync,
    R: FieldResolver + Sync + ?Sized,
  {
    shards
      .par_iter()
      .map(|shard| self.scan_shard(shard, resolver))
      .collect()
  }

  /// Groups shard partials by facet name and reduces each name in parallel.
  ///
  /// Every planned facet gets an entry: one that no shard reported (for
  /// instance when there are no shards) yields an empty response of its kind.
  pub fn reduce(&self, shards: Vec<ShardPartials>) -> FacetResults {
    let mut grouped: BTreeMap<String, Vec<ShardFacet>> = BTreeMap::new();
    for partials in shards {
      for (name, partial) in partials {
        grouped.entry(name).or_default().push(partial);
      }
    }
    let pools = self.pools.as_ref();
    let mut results: FacetResults = grouped
      .into_par_iter()
      .map(|(name, partials)| {
        let result = reduce_facet(&name, pools, partials);
        if let Err(err) = &result {
          tracing::warn!(facet = %name, error = %err, "facet reduce failed");
        }
        (name, result)
      })
      .collect();
    for name in self.plan.names() {
      if !results.contains_key(name) {
        if let Some(kind) = self.plan.kind(name) {
          results.insert(name.to_string(), Ok(FacetResponse::empty(kind)));
        }
      }
    }
    results
  }

  pub fn execute<S, R>(&self, shards: &[S], resolver: &R) -> FacetResults
  where
    S: DocumentSource + Sync,
    R: FieldResolver + Sync + ?Sized,
  {
    let partials = self.scan_shards(shards, resolver);
    self.reduce(partials)
  }
}

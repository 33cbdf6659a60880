use std::collections::BTreeMap;

use crate::api::errors::FacetError;
use crate::api::types::{
  DistinctDateHistogramRequest, FacetKind, FacetOrder, FacetRequest, FacetRequests, LatestRequest,
  OrderBy,
};
use crate::host::{DocumentSource, FieldResolver};
use crate::query::bucketing::DateInterval;
use crate::query::collector::{DocCollector, ShardCollector};
use crate::query::facets::{
  DistinctCollector, DistinctFields, FacetPools, LatestCollector, LatestFields, LatestParams,
  ShardFacet,
};
use crate::DocId;

/// Validated facet requests, ready to build shard collectors from.
#[derive(Debug, Clone)]
pub struct FacetPlan {
  configs: BTreeMap<String, FacetConfig>,
}

#[derive(Debug, Clone)]
pub(crate) enum FacetConfig {
  DistinctDateHistogram {
    key_field: String,
    value_field: String,
    interval: DateInterval,
    order: FacetOrder,
  },
  Latest {
    key_field: String,
    value_field: String,
    ts_field: String,
    params: LatestParams,
  },
}

impl FacetConfig {
  fn kind(&self) -> FacetKind {
    match self {
      FacetConfig::DistinctDateHistogram { .. } => FacetKind::DistinctDateHistogram,
      FacetConfig::Latest { .. } => FacetKind::Latest,
    }
  }
}

impl FacetPlan {
  pub fn new(requests: &FacetRequests) -> Result<Self, FacetError> {
    let mut configs = BTreeMap::new();
    for (name, request) in requests {
      if name.trim().is_empty() {
        return Err(FacetError::invalid("facet name must not be empty"));
      }
      let config = match request {
        FacetRequest::DistinctDateHistogram(req) => plan_distinct(name, req)?,
        FacetRequest::Latest(req) => plan_latest(name, req)?,
      };
      configs.insert(name.clone(), config);
    }
    Ok(Self { configs })
  }

  pub fn len(&self) -> usize {
    self.configs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.configs.is_empty()
  }

  pub fn kind(&self, name: &str) -> Option<FacetKind> {
    self.configs.get(name).map(FacetConfig::kind)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
    self.configs.keys().map(String::as_str)
  }

  /// Builds the collectors for one shard scan. Fields are resolved once per
  /// shard and bucket maps are borrowed from `pools`.
  pub fn collector<'a, S, R>(
    &'a self,
    source: &'a S,
    resolver: &R,
    pools: &FacetPools,
  ) -> ShardFacetCollector<'a, S>
  where
    S: DocumentSource,
    R: FieldResolver + ?Sized,
  {
    let nodes = self
      .configs
      .iter()
      .map(|(name, config)| {
        let node = match config {
          FacetConfig::DistinctDateHistogram {
            key_field,
            value_field,
            interval,
            order,
          } => {
            let fields = DistinctFields {
              key: resolver.resolve(key_field),
              value: resolver.resolve(value_field),
            };
            FacetNode::Distinct(Box::new(DistinctCollector::new(
              name.clone(),
              *order,
              source,
              fields,
              interval,
              &pools.distinct,
            )))
          }
          FacetConfig::Latest {
            key_field,
            value_field,
            ts_field,
            params,
          } => {
            let fields = LatestFields {
              key: resolver.resolve(key_field),
              value: resolver.resolve(value_field),
              timestamp: resolver.resolve(ts_field),
            };
            FacetNode::Latest(Box::new(LatestCollector::new(
              name.clone(),
              params.clone(),
              source,
              fields,
              &pools.latest,
            )))
          }
        };
        (name.clone(), node)
      })
      .collect();
    ShardFacetCollector {
      nodes,
      docs_seen: 0,
    }
  }
}

fn require_field(facet: &str, role: &str, field: &str) -> Result<String, FacetError> {
  if field.trim().is_empty() {
    return Err(FacetError::invalid(format!(
      "facet `{facet}` requires a non-empty {role}"
    )));
  }
  Ok(field.to_string())
}

fn plan_distinct(name: &str, req: &DistinctDateHistogramRequest) -> Result<FacetConfig, FacetError> {
  if req.order.by == OrderBy::Total {
    return Err(FacetError::invalid(format!(
      "facet `{name}`: distinct_date_histogram entries cannot be ordered by total"
    )));
  }
  let interval = req.interval.parse::<DateInterval>().map_err(|err| match err {
    FacetError::InvalidConfig { reason } => FacetError::invalid(format!("facet `{name}`: {reason}")),
    other => other,
  })?;
  Ok(FacetConfig::DistinctDateHistogram {
    key_field: require_field(name, "key_field", &req.key_field)?,
    value_field: require_field(name, "value_field", &req.value_field)?,
    interval,
    order: req.order,
  })
}

fn plan_latest(name: &str, req: &LatestRequest) -> Result<FacetConfig, FacetError> {
  if matches!(&req.fields, Some(fields) if fields.is_empty()) {
    return Err(FacetError::invalid(format!(
      "facet `{name}`: `fields` must name at least one entry field"
    )));
  }
  let mut params = LatestParams::new(req.order, req.size, req.start);
  params.fields = req.fields.clone();
  Ok(FacetConfig::Latest {
    key_field: require_field(name, "key_field", &req.key_field)?,
    value_field: require_field(name, "value_field", &req.value_field)?,
    ts_field: require_field(name, "ts_field", &req.ts_field)?,
    params,
  })
}

enum FacetNode<'a, S> {
  Distinct(Box<DistinctCollector<'a, S>>),
  Latest(Box<LatestCollector<'a, S>>),
}

/// Every facet collector of one shard scan, fed the same document stream.
pub struct ShardFacetCollector<'a, S> {
  nodes: Vec<(String, FacetNode<'a, S>)>,
  docs_seen: u64,
}

impl<S> ShardFacetCollector<'_, S> {
  pub fn docs_seen(&self) -> u64 {
    self.docs_seen
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

impl<S: DocumentSource> DocCollector for ShardFacetCollector<'_, S> {
  fn collect(&mut self, doc_id: DocId) {
    self.docs_seen += 1;
    for (_, node) in self.nodes.iter_mut() {
      match node {
        FacetNode::Distinct(c) => c.collect(doc_id),
        FacetNode::Latest(c) => c.collect(doc_id),
      }
    }
  }
}

impl<S: DocumentSource> ShardCollector for ShardFacetCollector<'_, S> {
  type Output = BTreeMap<String, ShardFacet>;

  fn finish(self) -> Self::Output {
    self
      .nodes
      .into_iter()
      .map(|(name, node)| {
        let partial = match node {
          FacetNode::Distinct(c) => ShardFacet::from((*c).finish()),
          FacetNode::Latest(c) => ShardFacet::from((*c).finish()),
        };
        (name, partial)
      })
      .collect()
  }
}

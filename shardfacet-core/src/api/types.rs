use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::errors::FacetError;

/// Opaque scalar carried by document fields, latest-facet keys and distinct
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  Int(i64),
  Str(String),
}

impl Scalar {
  /// Integer view of the scalar. Strings holding a base-10 integer qualify.
  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Scalar::Int(v) => Some(*v),
      Scalar::Str(s) => s.trim().parse().ok(),
    }
  }
}

impl From<i64> for Scalar {
  fn from(value: i64) -> Self {
    Scalar::Int(value)
  }
}

impl From<i32> for Scalar {
  fn from(value: i32) -> Self {
    Scalar::Int(value.into())
  }
}

impl From<&str> for Scalar {
  fn from(value: &str) -> Self {
    Scalar::Str(value.to_string())
  }
}

impl From<String> for Scalar {
  fn from(value: String) -> Self {
    Scalar::Str(value)
  }
}

impl fmt::Display for Scalar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scalar::Int(v) => write!(f, "{v}"),
      Scalar::Str(s) => f.write_str(s),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetKind {
  DistinctDateHistogram,
  Latest,
}

impl FacetKind {
  pub fn type_name(&self) -> &'static str {
    match self {
      FacetKind::DistinctDateHistogram => "distinct_date_histogram",
      FacetKind::Latest => "latest",
    }
  }
}

impl fmt::Display for FacetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.type_name())
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  #[default]
  Asc,
  Desc,
}

/// Entry attribute a facet order compares on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
  /// Bucket time for the histogram, entry timestamp for the latest facet.
  #[default]
  Time,
  /// Distinct value count; always 1 for latest entries.
  Count,
  /// Latest-facet value. Undefined for the histogram.
  Total,
}

/// Total order applied to the final entry sequence of a facet.
///
/// Accepts either `{"by": "count", "order": "desc"}` or one of the shorthand
/// names `time`, `reverse_time`, `count`, `reverse_count`, `total`,
/// `reverse_total`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "OrderSpec")]
pub struct FacetOrder {
  pub by: OrderBy,
  pub order: SortOrder,
}

impl FacetOrder {
  pub const fn new(by: OrderBy, order: SortOrder) -> Self {
    Self { by, order }
  }

  pub const fn newest_first() -> Self {
    Self::new(OrderBy::Time, SortOrder::Desc)
  }
}

impl FromStr for FacetOrder {
  type Err = FacetError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (name, order) = match s.trim().strip_prefix("reverse_") {
      Some(rest) => (rest, SortOrder::Desc),
      None => (s.trim(), SortOrder::Asc),
    };
    let by = match name {
      "time" => OrderBy::Time,
      "count" => OrderBy::Count,
      "total" => OrderBy::Total,
      other => return Err(FacetError::invalid(format!("unknown facet order `{other}`"))),
    };
    Ok(Self { by, order })
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderSpec {
  Named(String),
  Explicit {
    #[serde(default)]
    by: OrderBy,
    #[serde(default)]
    order: SortOrder,
  },
}

impl TryFrom<OrderSpec> for FacetOrder {
  type Error = FacetError;

  fn try_from(spec: OrderSpec) -> Result<Self, Self::Error> {
    match spec {
      OrderSpec::Named(name) => name.parse(),
      OrderSpec::Explicit { by, order } => Ok(FacetOrder { by, order }),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetRequest {
  DistinctDateHistogram(DistinctDateHistogramRequest),
  Latest(LatestRequest),
}

/// Facet requests keyed by facet name.
pub type FacetRequests = BTreeMap<String, FacetRequest>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistinctDateHistogramRequest {
  /// Field holding the document timestamp (epoch millis or RFC 3339).
  pub key_field: String,
  /// Field whose distinct values are counted per bucket.
  pub value_field: String,
  /// Fixed (`"1h"`, `"90s"`) or calendar (`"month"`) bucket interval.
  pub interval: String,
  #[serde(default)]
  pub order: FacetOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestRequest {
  pub key_field: String,
  pub value_field: String,
  pub ts_field: String,
  #[serde(default = "default_latest_size")]
  pub size: usize,
  #[serde(default)]
  pub start: usize,
  #[serde(default = "FacetOrder::newest_first")]
  pub order: FacetOrder,
  /// Entry fields to emit; all of them when absent.
  #[serde(default)]
  pub fields: Option<Vec<LatestField>>,
}

fn default_latest_size() -> usize {
  10
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LatestField {
  Key,
  Value,
  Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
  /// Upper bound on maps retained for reuse.
  #[serde(default = "default_max_pooled_maps")]
  pub max_pooled_maps: usize,
  /// Maps whose capacity grew beyond this are dropped instead of retained.
  #[serde(default = "default_max_map_capacity")]
  pub max_map_capacity: usize,
}

fn default_max_pooled_maps() -> usize {
  64
}

fn default_max_map_capacity() -> usize {
  65_536
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      max_pooled_maps: default_max_pooled_maps(),
      max_map_capacity: default_max_map_capacity(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "snake_case")]
pub enum FacetResponse {
  DistinctDateHistogram {
    entries: Vec<DistinctBucketResponse>,
    /// Cardinality of the union of every bucket's values.
    total_count: u64,
  },
  Latest {
    /// Number of distinct keys before pagination.
    total: u64,
    entries: Vec<LatestEntryResponse>,
  },
}

impl FacetResponse {
  pub(crate) fn empty(kind: FacetKind) -> Self {
    match kind {
      FacetKind::DistinctDateHistogram => FacetResponse::DistinctDateHistogram {
        entries: Vec::new(),
        total_count: 0,
      },
      FacetKind::Latest => FacetResponse::Latest {
        total: 0,
        entries: Vec::new(),
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctBucketResponse {
  pub time: i64,
  pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LatestEntryResponse {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub key: Option<Scalar>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<i64>,
}

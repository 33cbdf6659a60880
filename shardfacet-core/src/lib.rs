//! shardfacet-core: shard-local facet collection and cross-shard reduce.
//!
//! Two facet kinds are supported: a distinct-value date histogram and a
//! latest-value-per-key facet. Every shard scan produces a partial result in
//! a map borrowed from a shared pool; the reduce step merges the partials of
//! one facet name into a single ordered response.

pub mod api;
pub mod host;
pub mod query;

/// Document identifier within a shard.
pub type DocId = u32;

pub use api::{FacetError, FacetRequest, FacetRequests, FacetResponse, Scalar};
pub use query::facets::{FacetPlan, FacetPools};
pub use query::pipeline::{FacetPipeline, FacetResults, ShardPartials};

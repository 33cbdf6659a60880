pub mod errors;
pub mod types;

pub use errors::FacetError;
pub use types::{
  DistinctBucketResponse, DistinctDateHistogramRequest, FacetKind, FacetOrder, FacetRequest,
  FacetRequests, FacetResponse, LatestEntryResponse, LatestField, LatestRequest, OrderBy,
  PoolConfig, Scalar, SortOrder,
};

pub mod bucketing;
pub mod collector;
pub mod facets;
pub mod pipeline;
pub mod pool;

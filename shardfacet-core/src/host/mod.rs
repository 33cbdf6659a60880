//! Boundary to the host search engine.
//!
//! Facet collectors never touch storage directly: they resolve logical field
//! names once through a [`FieldResolver`] and then pull per-document values
//! from a [`DocumentSource`]. Bucketing of timestamps is delegated to a
//! [`TimeBucketer`].

pub mod memory;

use std::fmt;

use crate::api::types::Scalar;
use crate::DocId;

pub use memory::{FieldMapping, FieldMappings, MemoryDoc, MemoryShard};

/// Physical storage handle of a resolved field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldHandle(String);

impl FieldHandle {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for FieldHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
  pub handle: FieldHandle,
  /// Document kind the scan must be restricted to, if the field is owned by
  /// a specific kind.
  pub kind_filter: Option<String>,
}

impl ResolvedField {
  /// A field stored under its logical name with no kind restriction.
  pub fn unmapped(logical: &str) -> Self {
    Self {
      handle: FieldHandle::new(logical),
      kind_filter: None,
    }
  }
}

pub trait FieldResolver {
  fn resolve(&self, logical: &str) -> ResolvedField;
}

/// Resolves every field to its logical name.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl FieldResolver for IdentityResolver {
  fn resolve(&self, logical: &str) -> ResolvedField {
    ResolvedField::unmapped(logical)
  }
}

/// One shard as seen by a facet scan.
pub trait DocumentSource {
  /// Documents of this shard that match the query.
  fn matching_docs(&self) -> impl Iterator<Item = DocId> + '_;

  /// Values of `field` for `doc_id`, in storage order. Empty when the
  /// document has no value for the field.
  fn values(&self, field: &FieldHandle, doc_id: DocId) -> impl Iterator<Item = Scalar> + '_;

  /// Kind of the document, checked against resolved kind filters.
  fn doc_kind(&self, doc_id: DocId) -> Option<&str>;
}

/// Maps an epoch-millisecond timestamp to the id of its histogram bucket.
pub trait TimeBucketer {
  fn bucket(&self, timestamp_millis: i64) -> Option<i64>;
}

/// Kind filter for a scan over several resolved fields: the last field that
/// carries a filter decides.
pub(crate) fn scan_kind_filter<'a>(
  fields: impl DoubleEndedIterator<Item = &'a ResolvedField>,
) -> Option<String> {
  fields.rev().find_map(|f| f.kind_filter.clone())
}

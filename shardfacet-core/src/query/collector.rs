use crate::DocId;

/// A callback-style collector for matched documents.
///
/// Facet scans stream every matching document of a shard through this trait
/// so collectors can update their state without materializing the match set.
pub trait DocCollector {
  fn collect(&mut self, doc_id: DocId);
}

/// A shard-scoped collector that is finalized once every matching document
/// has been streamed.
pub trait ShardCollector: DocCollector {
  type Output;

  /// Finalizes the collector for a shard and returns its partial output.
  fn finish(self) -> Self::Output;
}

/// Drives `collector` over `docs` and finalizes it.
pub fn drive<C, I>(mut collector: C, docs: I) -> C::Output
where
  C: ShardCollector,
  I: IntoIterator<Item = DocId>,
{
  for doc_id in docs {
    collector.collect(doc_id);
  }
  collector.finish()
}

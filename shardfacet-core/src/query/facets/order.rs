use std::cmp::Ordering;

use crate::api::types::{FacetOrder, OrderBy, SortOrder};
use crate::query::facets::FacetEntry;

impl FacetOrder {
  /// Compares two entries under this order. Entries without a total sort
  /// after entries with one, whatever the direction.
  pub fn compare<E: FacetEntry>(&self, a: &E, b: &E) -> Ordering {
    match self.by {
      OrderBy::Time => directed(a.time().cmp(&b.time()), self.order),
      OrderBy::Count => directed(a.count().cmp(&b.count()), self.order),
      OrderBy::Total => match (a.total(), b.total()) {
        (Some(x), Some(y)) => directed(x.cmp(&y), self.order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
      },
    }
  }

  /// Sorts under this order, falling back to key order on ties. Keys are
  /// unique within a facet, so the result does not depend on input order.
  pub fn sort<E: FacetEntry>(&self, entries: &mut [E]) {
    entries.sort_unstable_by(|a, b| self.compare(a, b).then_with(|| a.cmp_key(b)));
  }
}

fn directed(ord: Ordering, order: SortOrder) -> Ordering {
  match order {
    SortOrder::Asc => ord,
    SortOrder::Desc => ord.reverse(),
  }
}

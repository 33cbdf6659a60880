use hashbrown::HashSet;

use crate::api::types::{
  DistinctBucketResponse, FacetResponse, LatestEntryResponse, LatestField, Scalar,
};
use crate::query::facets::{DistinctEntry, FinalFacet, LatestEntry};

pub fn distinct_response(facet: &FinalFacet<DistinctEntry>) -> FacetResponse {
  let entries = facet
    .entries
    .iter()
    .map(|e| DistinctBucketResponse {
      time: e.time,
      count: e.count(),
    })
    .collect();
  FacetResponse::DistinctDateHistogram {
    entries,
    total_count: distinct_total_count(&facet.entries),
  }
}

/// Number of distinct values across all buckets. A value seen in several
/// buckets counts once.
pub fn distinct_total_count(entries: &[DistinctEntry]) -> u64 {
  match entries {
    [] => 0,
    [only] => only.count(),
    _ => {
      let widest = entries.iter().map(|e| e.values.len()).max().unwrap_or(0);
      let mut union: HashSet<&Scalar> = HashSet::with_capacity(widest);
      for entry in entries {
        union.extend(entry.values.iter());
      }
      union.len() as u64
    }
  }
}

pub fn latest_response(facet: &FinalFacet<LatestEntry>) -> FacetResponse {
  let params = &facet.params;
  let (key, value, timestamp) = (
    params.emits(LatestField::Key),
    params.emits(LatestField::Value),
    params.emits(LatestField::Timestamp),
  );
  let entries = facet
    .entries
    .iter()
    .map(|e| LatestEntryResponse {
      key: key.then(|| e.key.clone()),
      value: value.then_some(e.value),
      timestamp: timestamp.then_some(e.timestamp),
    })
    .collect();
  FacetResponse::Latest {
    total: facet.total.unwrap_or(facet.entries.len() as u64),
    entries,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::FacetOrder;
  use crate::query::facets::LatestParams;

  fn bucket(time: i64, values: &[&str]) -> DistinctEntry {
    let mut entry = DistinctEntry::new(time);
    for v in values {
      entry.insert(Scalar::from(*v));
    }
    entry
  }

  #[test]
  fn total_count_is_union_not_sum() {
    let facet = FinalFacet {
      name: "h".to_string(),
      params: FacetOrder::default(),
      entries: vec![bucket(0, &["a", "b"]), bucket(10, &["b", "c"])],
      total: None,
    };
    let response = distinct_response(&facet);
    assert_eq!(
      serde_json::to_value(&response).unwrap(),
      serde_json::json!({
        "_type": "distinct_date_histogram",
        "entries": [{"time": 0, "count": 2}, {"time": 10, "count": 2}],
        "total_count": 3
      })
    );
  }

  #[test]
  fn total_count_edge_cases() {
    assert_eq!(distinct_total_count(&[]), 0);
    assert_eq!(distinct_total_count(&[bucket(0, &["a", "b"])]), 2);
    assert_eq!(distinct_total_count(&[bucket(0, &["a"]), bucket(5, &["a"])]), 1);
  }

  #[test]
  fn latest_emits_only_requested_fields() {
    let mut params = LatestParams::default();
    params.fields = Some(vec![LatestField::Key, LatestField::Value]);
    let facet = FinalFacet {
      name: "l".to_string(),
      params,
      entries: vec![LatestEntry::new(Scalar::from("u1"), 50, 7)],
      total: Some(4),
    };
    assert_eq!(
      serde_json::to_value(latest_response(&facet)).unwrap(),
      serde_json::json!({
        "_type": "latest",
        "total": 4,
        "entries": [{"key": "u1", "value": 7}]
      })
    );
  }
}

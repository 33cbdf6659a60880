use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::types::Scalar;
use crate::host::{DocumentSource, FieldHandle, FieldResolver, ResolvedField};
use crate::DocId;

/// A document held in memory. Field values may be given as a single scalar
/// or as an array in JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MemoryDoc {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  #[serde(default)]
  pub fields: BTreeMap<String, FieldValues>,
}

impl MemoryDoc {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
    self.kind = Some(kind.into());
    self
  }

  pub fn with_field<I, V>(mut self, name: impl Into<String>, values: I) -> Self
  where
    I: IntoIterator<Item = V>,
    V: Into<Scalar>,
  {
    self.fields.insert(
      name.into(),
      FieldValues(values.into_iter().map(Into::into).collect()),
    );
    self
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "OneOrMany")]
pub struct FieldValues(pub Vec<Scalar>);

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
  One(Scalar),
  Many(Vec<Scalar>),
}

impl From<OneOrMany> for FieldValues {
  fn from(value: OneOrMany) -> Self {
    match value {
      OneOrMany::One(v) => FieldValues(vec![v]),
      OneOrMany::Many(vs) => FieldValues(vs),
    }
  }
}

impl From<FieldValues> for OneOrMany {
  fn from(value: FieldValues) -> Self {
    OneOrMany::Many(value.0)
  }
}

/// In-memory shard. Every document matches unless `matches` lists the
/// matching ids explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryShard {
  #[serde(default)]
  pub docs: Vec<MemoryDoc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub matches: Option<Vec<DocId>>,
}

impl MemoryShard {
  pub fn new(docs: Vec<MemoryDoc>) -> Self {
    Self {
      docs,
      matches: None,
    }
  }

  pub fn with_matches(mut self, matches: Vec<DocId>) -> Self {
    self.matches = Some(matches);
    self
  }

  pub fn len(&self) -> usize {
    self.docs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.docs.is_empty()
  }

  fn doc(&self, doc_id: DocId) -> Option<&MemoryDoc> {
    self.docs.get(doc_id as usize)
  }
}

impl DocumentSource for MemoryShard {
  fn matching_docs(&self) -> impl Iterator<Item = DocId> + '_ {
    let all = match self.matches {
      Some(_) => 0..0,
      None => 0..self.docs.len() as DocId,
    };
    let listed = self
      .matches
      .iter()
      .flatten()
      .copied()
      .filter(|doc_id| (*doc_id as usize) < self.docs.len());
    all.chain(listed)
  }

  fn values(&self, field: &FieldHandle, doc_id: DocId) -> impl Iterator<Item = Scalar> + '_ {
    self
      .doc(doc_id)
      .and_then(|doc| doc.fields.get(field.as_str()))
      .into_iter()
      .flat_map(|values| values.0.iter().cloned())
  }

  fn doc_kind(&self, doc_id: DocId) -> Option<&str> {
    self.doc(doc_id).and_then(|doc| doc.kind.as_deref())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
  /// Physical name the values are stored under.
  pub path: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
}

/// Logical-to-physical field mappings. Unmapped names resolve to themselves.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FieldMappings {
  fields: BTreeMap<String, FieldMapping>,
}

impl FieldMappings {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn map(
    mut self,
    logical: impl Into<String>,
    path: impl Into<String>,
    kind: Option<&str>,
  ) -> Self {
    self.fields.insert(
      logical.into(),
      FieldMapping {
        path: path.into(),
        kind: kind.map(str::to_string),
      },
    );
    self
  }
}

impl FieldResolver for FieldMappings {
  fn resolve(&self, logical: &str) -> ResolvedField {
    match self.fields.get(logical) {
      Some(mapping) => ResolvedField {
        handle: FieldHandle::new(mapping.path.clone()),
        kind_filter: mapping.kind.clone(),
      },
      None => ResolvedField::unmapped(logical),
    }
  }
}

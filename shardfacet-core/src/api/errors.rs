use thiserror::Error;

use crate::api::types::FacetKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacetError {
  #[error("facet `{facet}` received partial results of kind `{found}` while reducing `{expected}`")]
  KindMismatch {
    facet: String,
    expected: FacetKind,
    found: FacetKind,
  },

  #[error("invalid facet configuration: {reason}")]
  InvalidConfig { reason: String },

  #[error("facet `{facet}` has no partial results to reduce")]
  MissingPartial { facet: String },
}

impl FacetError {
  pub(crate) fn invalid(reason: impl Into<String>) -> Self {
    FacetError::InvalidConfig {
      reason: reason.into(),
    }
  }
}

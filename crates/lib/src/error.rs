//! Error type shared by every rendering stage.
//!
//! Each stage reports through [`RenderError`]; collaborators (template
//! rendering, source acquisition, dependency finalization, file hashing)
//! keep their own small error types that are wrapped here.

use thiserror::Error;

use crate::finalize::FinalizeError;
use crate::source::SourceError;
use crate::template::TemplateError;
use crate::util::hash::HashError;

#[derive(Debug, Error)]
pub enum RenderError {
  #[error("invalid selector in {path} line {line_no}:\noffending line:\n{line}\n{message}")]
  SelectorSyntax {
    path: String,
    line_no: usize,
    line: String,
    message: String,
  },

  #[error("schema error in {path}: {message}")]
  Schema { path: String, message: String },

  #[error("invalid value for {field}: {message}")]
  FieldValue { field: String, message: String },

  #[error(
    "undefined template variables in {path}: {}; enable source acquisition or define them in the variant",
    .names.join(", ")
  )]
  UnresolvedTemplate { path: String, names: Vec<String> },

  #[error(
    "template variables in {path} did not settle after {iterations} rounds (still undefined: {})",
    .names.join(", ")
  )]
  ResolutionDiverged {
    path: String,
    iterations: usize,
    names: Vec<String>,
  },

  #[error("template rendering failed for {path}: {source}")]
  Template {
    path: String,
    #[source]
    source: TemplateError,
  },

  #[error("circular dependencies in recipe:\n{}", format_pairs(.pairs))]
  CircularDependency { pairs: Vec<(String, String)> },

  #[error("{package} has dependencies that need building: {}", .unsatisfied.join(", "))]
  DependencyNeedsBuilding { package: String, unsatisfied: Vec<String> },

  #[error(
    "mismatching hashes in recipe; exact pins must match the build id of the pinned output:\n{}",
    format_mismatches(.pairs)
  )]
  HashMismatch { pairs: Vec<(String, String)> },

  #[error("{package} cannot depend on itself")]
  SelfDependency { package: String },

  #[error("source acquisition failed for {package}: {source}")]
  Source {
    package: String,
    #[source]
    source: SourceError,
  },

  #[error("finalization failed for {package}: {source}")]
  Finalize {
    package: String,
    #[source]
    source: FinalizeError,
  },

  #[error("failed to read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("metadata for {0} is final and cannot be re-rendered")]
  Finalized(String),

  #[error("invalid variant configuration {path}: {message}")]
  VariantConfig { path: String, message: String },

  #[error(transparent)]
  Hash(#[from] HashError),
}

pub type Result<T> = std::result::Result<T, RenderError>;

impl RenderError {
  pub(crate) fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self::FieldValue {
      field: field.into(),
      message: message.into(),
    }
  }

  pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.as_ref().display().to_string(),
      source,
    }
  }
}

fn format_pairs(pairs: &[(String, String)]) -> String {
  pairs
    .iter()
    .map(|(a, b)| format!("    {} <-> {}\n", a, b))
    .collect()
}

fn format_mismatches(pairs: &[(String, String)]) -> String {
  pairs
    .iter()
    .map(|(producer, consumer)| format!("  Mismatching package: {}; consumer package: {}\n", producer, consumer))
    .collect()
}

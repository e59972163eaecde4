//! Merging extra sections into a rendered document.
//!
//! *Append* extends lists and merges mappings key by key; *clobber*
//! replaces whatever it names.

use serde_yaml::{Mapping, Value};

use super::types::RecipeDocument;
use crate::error::{RenderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
  Append,
  Clobber,
}

fn to_value(doc: &RecipeDocument, origin: &str) -> Result<Value> {
  serde_yaml::to_value(doc).map_err(|e| RenderError::Schema {
    path: origin.to_string(),
    message: e.to_string(),
  })
}

fn merge_key(target: &mut Mapping, key: Value, value: Value, mode: MergeMode) {
  match (mode, target.get_mut(&key), value) {
    (MergeMode::Append, Some(Value::Sequence(existing)), Value::Sequence(more)) => existing.extend(more),
    (MergeMode::Append, Some(Value::Mapping(existing)), Value::Mapping(more)) => {
      for (k, v) in more {
        existing.insert(k, v);
      }
    }
    (_, _, value) => {
      target.insert(key, value);
    }
  }
}

/// Merge `sections` into `base` and return the combined document.
pub fn merge_sections(
  base: &RecipeDocument,
  sections: &RecipeDocument,
  mode: MergeMode,
  origin: &str,
) -> Result<RecipeDocument> {
  let mut merged = match to_value(base, origin)? {
    Value::Mapping(map) => map,
    _ => Mapping::new(),
  };
  let incoming = match to_value(sections, origin)? {
    Value::Mapping(map) => map,
    _ => Mapping::new(),
  };

  for (section, body) in incoming {
    match (merged.get_mut(&section), body) {
      (Some(Value::Mapping(existing)), Value::Mapping(subsections)) => {
        for (key, value) in subsections {
          merge_key(existing, key, value, mode);
        }
      }
      (_, body) => merge_key(&mut merged, section, body, mode),
    }
  }

  serde_yaml::from_value(Value::Mapping(merged)).map_err(|e| RenderError::Schema {
    path: origin.to_string(),
    message: format!("merged sections do not form a valid recipe: {}", e),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn doc(yaml: &str) -> RecipeDocument {
    serde_yaml::from_str(yaml).unwrap()
  }

  #[test]
  fn append_extends_lists_and_adds_keys() {
    let base = doc("package:\n  name: foo\nrequirements:\n  run:\n    - a\n");
    let extra = doc("requirements:\n  run:\n    - b\n  host:\n    - c\nabout:\n  license: MIT\n");
    let merged = merge_sections(&base, &extra, MergeMode::Append, "recipe_append.yaml").unwrap();
    assert_eq!(merged.requirements.run, vec!["a", "b"]);
    assert_eq!(merged.requirements.host, vec!["c"]);
    assert_eq!(merged.about.license.as_deref(), Some("MIT"));
    assert_eq!(merged.package.name.as_deref(), Some("foo"));
  }

  #[test]
  fn clobber_replaces_named_keys_only() {
    let base = doc("package:\n  name: foo\n  version: '1.0'\nrequirements:\n  run:\n    - a\n");
    let clobber = doc("package:\n  version: '2.0'\nrequirements:\n  run:\n    - z\n");
    let merged = merge_sections(&base, &clobber, MergeMode::Clobber, "recipe_clobber.yaml").unwrap();
    assert_eq!(merged.package.name.as_deref(), Some("foo"));
    assert_eq!(merged.package.version.as_deref(), Some("2.0"));
    assert_eq!(merged.requirements.run, vec!["z"]);
  }
}

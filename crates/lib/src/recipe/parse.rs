//! Turning selected recipe text into a [`RecipeDocument`].

use serde_yaml::Value;
use tracing::trace;

use super::normalize::sanitize;
use super::types::{RecipeDocument, SECTIONS};
use super::validate::check_document;
use crate::error::{RenderError, Result};
use crate::selector::{Namespace, select_lines};

fn describe(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Sequence(_) => "a list",
    Value::Mapping(_) => "a mapping",
    Value::Tagged(_) => "a tagged value",
  }
}

/// Check section shapes before any typed parsing so that errors name the
/// offending section.
fn check_shape(value: &Value, origin: &str) -> Result<()> {
  let schema = |message: String| RenderError::Schema {
    path: origin.to_string(),
    message,
  };

  let map = match value {
    Value::Null => return Ok(()),
    Value::Mapping(map) => map,
    other => return Err(schema(format!("recipe must be a mapping, found {}", describe(other)))),
  };

  for (key, section) in map {
    let name = key
      .as_str()
      .ok_or_else(|| schema(format!("section names must be strings, found {}", describe(key))))?;
    if !SECTIONS.contains(&name) {
      return Err(schema(format!("unknown section '{}'", name)));
    }
    let ok = match (name, section) {
      (_, Value::Null) => true,
      ("source", Value::Sequence(items)) => items.iter().all(|i| matches!(i, Value::Mapping(_))),
      ("outputs", Value::Sequence(items)) => items.iter().all(|i| matches!(i, Value::Mapping(_))),
      ("outputs", _) => false,
      (_, Value::Mapping(_)) => true,
      _ => false,
    };
    if !ok {
      let expected = match name {
        "source" => "a mapping or a list of mappings",
        "outputs" => "a list of mappings",
        _ => "a mapping",
      };
      return Err(schema(format!(
        "section '{}' must be {}, found {}",
        name,
        expected,
        describe(section)
      )));
    }
  }
  Ok(())
}

/// Parse YAML text that has already been through selectors.
pub fn parse_document(text: &str, origin: &str) -> Result<RecipeDocument> {
  let schema = |e: serde_yaml::Error| RenderError::Schema {
    path: origin.to_string(),
    message: e.to_string(),
  };

  let value: Value = serde_yaml::from_str(text).map_err(schema)?;
  check_shape(&value, origin)?;
  if value.is_null() {
    trace!(origin, "empty recipe document");
    return Ok(RecipeDocument::default());
  }

  let mut doc: RecipeDocument = serde_yaml::from_str(text).map_err(schema)?;
  sanitize(&mut doc)?;
  check_document(&doc)?;
  Ok(doc)
}

/// Apply selectors, then parse.
pub fn parse_recipe_text(text: &str, ns: &Namespace, variants_active: bool, origin: &str) -> Result<RecipeDocument> {
  let selected = select_lines(text, ns, variants_active, origin)?;
  parse_document(&selected, origin)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::selector::Value as NsValue;

  fn ns() -> Namespace {
    let mut ns = Namespace::new();
    ns.insert("linux", NsValue::Bool(true));
    ns.insert("win", NsValue::Bool(false));
    ns
  }

  #[test]
  fn requirements_as_string_is_a_schema_error() {
    let err = parse_document("package:\n  name: foo\nrequirements: python\n", "meta.yaml").unwrap_err();
    match err {
      RenderError::Schema { path, message } => {
        assert_eq!(path, "meta.yaml");
        assert!(message.contains("'requirements'"), "{}", message);
      }
      other => panic!("unexpected error {:?}", other),
    }
  }

  #[test]
  fn source_may_be_a_list() {
    let doc = parse_document("source:\n  - path: a\n  - path: b\n", "meta.yaml").unwrap();
    assert_eq!(doc.source.unwrap().specs().len(), 2);
  }

  #[test]
  fn unknown_section_is_rejected() {
    let err = parse_document("packages:\n  name: foo\n", "meta.yaml").unwrap_err();
    assert!(err.to_string().contains("unknown section 'packages'"));
  }

  #[test]
  fn unknown_key_inside_section_is_rejected() {
    let err = parse_document("package:\n  nmae: foo\n", "meta.yaml").unwrap_err();
    assert!(matches!(err, RenderError::Schema { .. }));
  }

  #[test]
  fn sections_emptied_by_selectors_default() {
    let text = "package:\n  name: foo\nbuild:\n  number: 1  # [win]\nrequirements:\n  run:\n    - bar  # [win]\n";
    let doc = parse_recipe_text(text, &ns(), false, "meta.yaml").unwrap();
    assert_eq!(doc.package.name.as_deref(), Some("foo"));
    assert!(doc.build.number.is_none());
    assert!(doc.requirements.run.is_empty());
  }

  #[test]
  fn empty_text_is_an_empty_document() {
    assert_eq!(parse_document("\n", "meta.yaml").unwrap(), RecipeDocument::default());
  }

  #[test]
  fn extra_accepts_free_form_values() {
    let doc = parse_document("extra:\n  recipe-maintainers:\n    - someone\n", "meta.yaml").unwrap();
    assert!(doc.extra.contains_key("recipe-maintainers"));
  }
}

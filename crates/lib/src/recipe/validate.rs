//! Field-level validation.

use std::fmt;

use serde::Serialize;

use super::types::RecipeDocument;
use crate::consts::{BAD_CHARS, BAD_DEP_CHARS, VERSION_OPERATORS};
use crate::error::{RenderError, Result};

const PIN_DEPENDS_VALUES: &[&str] = &["", "record", "strict"];

/// Reject characters that cannot appear in `field`.
///
/// Versions may carry an epoch `!` but never `-`; build strings reject
/// both.
pub fn check_bad_chars(value: &str, field: &str) -> Result<()> {
  let mut bad = BAD_CHARS.to_string();
  if field == "package/version" || field == "build/string" {
    bad.push('-');
  }
  if field != "package/version" {
    bad.push('!');
  }
  if let Some(c) = bad.chars().find(|c| value.contains(*c)) {
    return Err(RenderError::field(field, format!("bad character '{}' in {}", c, value)));
  }
  Ok(())
}

/// Document-wide value checks that do not depend on the variant.
pub fn check_document(doc: &RecipeDocument) -> Result<()> {
  if let Some(noarch) = doc.build.noarch.as_deref()
    && noarch.eq_ignore_ascii_case("none")
  {
    return Err(RenderError::field(
      "build/noarch",
      "'none' is not a valid noarch value; remove the key or use 'generic' or 'python'",
    ));
  }

  if let Some(pin) = doc.build.pin_depends.as_deref()
    && !PIN_DEPENDS_VALUES.contains(&pin)
  {
    return Err(RenderError::field(
      "build/pin_depends",
      format!("'{}' is not one of '', 'record', 'strict'", pin),
    ));
  }

  check_features(&doc.build.features)
}

/// Feature names may not contain dashes.
pub fn check_features(features: &[String]) -> Result<()> {
  if let Some(feature) = features.iter().find(|f| f.contains('-')) {
    return Err(RenderError::field(
      "build/features",
      format!("dashes are not allowed in feature names (found '{}')", feature),
    ));
  }
  Ok(())
}

/// A dependency spec split into `name [version [build]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSpec {
  pub name: String,
  pub version: Option<String>,
  pub build: Option<String>,
}

impl MatchSpec {
  /// Parse a spec. `numpy>=1.11` and `numpy >=1.11` both name `numpy`.
  pub fn parse(spec: &str) -> Result<Self> {
    let mut parts = spec.split_whitespace();
    let first = parts
      .next()
      .ok_or_else(|| RenderError::field("requirements", "empty package specification"))?;
    let split_at = first.find(['<', '>', '=', '!', '~']).unwrap_or(first.len());
    let (name, attached) = first.split_at(split_at);
    if name.is_empty() {
      return Err(RenderError::field(
        "requirements",
        format!("invalid package specification: '{}'", spec),
      ));
    }
    let version = if attached.is_empty() {
      parts.next().map(str::to_string)
    } else {
      Some(attached.to_string())
    };
    let build = parts.next().map(str::to_string);
    Ok(Self {
      name: name.to_string(),
      version,
      build,
    })
  }

  /// Whether the spec pins an exact `name version build`.
  pub fn is_exact(&self) -> bool {
    self.version.is_some() && self.build.is_some()
  }
}

impl fmt::Display for MatchSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)?;
    if let Some(v) = &self.version {
      write!(f, " {}", v)?;
    }
    if let Some(b) = &self.build {
      write!(f, " {}", b)?;
    }
    Ok(())
  }
}

/// Validate one dependency of `package` and parse it.
pub fn check_dependency(spec: &str, package: &str) -> Result<MatchSpec> {
  let parsed = MatchSpec::parse(spec)?;
  if parsed.name == package {
    return Err(RenderError::SelfDependency {
      package: package.to_string(),
    });
  }
  if let Some(c) = BAD_DEP_CHARS.chars().find(|c| parsed.name.contains(*c)) {
    return Err(RenderError::field(
      "requirements",
      format!("bad character '{}' in package name dependency '{}'", c, parsed.name),
    ));
  }
  let parts: Vec<&str> = spec.split_whitespace().collect();
  if parts.len() >= 2 && VERSION_OPERATORS.contains(&parts[1]) {
    let mut message = format!(
      "bad character '{}' in package version dependency '{}'",
      parts[1], parsed.name
    );
    if parts.len() >= 3 {
      message.push_str(&format!("\nPerhaps you meant '{} {}{}'", parsed.name, parts[1], parts[2]));
    }
    return Err(RenderError::field("requirements", message));
  }
  Ok(parsed)
}

#[cfg(test)]
mod tests {
  use super::*;

  mod bad_chars {
    use super::*;

    #[test]
    fn names_reject_bang_and_space() {
      assert!(check_bad_chars("foo!", "package/name").is_err());
      assert!(check_bad_chars("foo bar", "package/name").is_err());
      assert!(check_bad_chars("foo-bar", "package/name").is_ok());
    }

    #[test]
    fn versions_allow_epoch_but_not_dash() {
      assert!(check_bad_chars("1!2.0", "package/version").is_ok());
      assert!(check_bad_chars("1.0-1", "package/version").is_err());
    }

    #[test]
    fn build_strings_reject_dash() {
      let err = check_bad_chars("py36-0", "build/string").unwrap_err();
      assert!(err.to_string().contains("'-'"));
    }
  }

  mod document {
    use super::*;

    fn doc(yaml: &str) -> RecipeDocument {
      serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn noarch_none_is_rejected() {
      assert!(check_document(&doc("build:\n  noarch: None\n")).is_err());
      assert!(check_document(&doc("build:\n  noarch: NONE\n")).is_err());
      assert!(check_document(&doc("build:\n  noarch: python\n")).is_ok());
    }

    #[test]
    fn pin_depends_values() {
      assert!(check_document(&doc("build:\n  pin_depends: record\n")).is_ok());
      assert!(check_document(&doc("build:\n  pin_depends: loose\n")).is_err());
    }

    #[test]
    fn dashed_features_are_rejected() {
      assert!(check_document(&doc("build:\n  features:\n    - vc-9\n")).is_err());
      assert!(check_document(&doc("build:\n  features:\n    - vc9\n")).is_ok());
    }
  }

  mod deps {
    use super::*;

    #[test]
    fn parses_name_version_build() {
      let spec = MatchSpec::parse("liba 1.0 h0123456_0").unwrap();
      assert_eq!(spec.name, "liba");
      assert_eq!(spec.version.as_deref(), Some("1.0"));
      assert_eq!(spec.build.as_deref(), Some("h0123456_0"));
      assert!(spec.is_exact());
      assert_eq!(spec.to_string(), "liba 1.0 h0123456_0");
    }

    #[test]
    fn attached_operator_splits_name() {
      let spec = MatchSpec::parse("numpy>=1.11").unwrap();
      assert_eq!(spec.name, "numpy");
      assert_eq!(spec.version.as_deref(), Some(">=1.11"));
    }

    #[test]
    fn self_dependency_is_an_error() {
      let err = check_dependency("foo >=1", "foo").unwrap_err();
      assert_eq!(err.to_string(), "foo cannot depend on itself");
    }

    #[test]
    fn detached_operator_suggests_fix() {
      let err = check_dependency("bar >= 1.0", "foo").unwrap_err();
      assert!(err.to_string().contains("Perhaps you meant 'bar >=1.0'"));
    }

    #[test]
    fn bad_name_characters() {
      assert!(check_dependency("b@r", "foo").is_err());
      assert!(check_dependency("bar", "foo").is_ok());
    }
  }
}

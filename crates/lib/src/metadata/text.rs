//! Questions answered from the raw recipe text rather than the parsed
//! document: which sections reference what, before rendering has settled.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::Metadata;
use crate::error::{RenderError, Result};
use crate::selector::select_lines;
use crate::template::{TemplateRenderer, UndefinedPolicy};
use crate::variant::VariantAssignment;

static REQUIREMENTS_SECTION: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?ms)(^requirements:.*?)(^test:|^extra:|^about:|^outputs:|\z)").unwrap());

static SOURCE_SECTION: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?ms)(\s*source:.*?)(^build:|^requirements:|^test:|^extra:|^about:|^outputs:|\z)").unwrap()
});

static PACKAGE_SECTION: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?ms)(^package:.*?)(^source:|^build:|^requirements:|^test:|^extra:|^about:|^outputs:|\z)").unwrap());

static BUILD_SECTION: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?ms)(^build:.*?)(^requirements:|^test:|^extra:|^about:|^outputs:|\z)").unwrap());

static VCS_VARIABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(GIT|SVN|HG)_[^.\s'"]+"#).unwrap());

static SETUP_PY_LOADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"load_setup_py_data|load_setuptools").unwrap());

static FILE_REGEX_LOADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"load_file_regex").unwrap());

/// First identifier of every `{{ ... }}` expression.
static JINJA_REFERENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Package name of a `- name ...` list item.
static REQUIREMENT_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*-\s+([^\s#\[\]{}'\x22]+)").unwrap());

static COMPILER_CALL: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"compiler\(\s*['"]([^'"]+)['"]\s*(?:,[^)]*)?\)"#).unwrap());

static HASH_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"h\{\{\s*PKG_HASH\s*\}\}").unwrap());

static SUBPACKAGE_PIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"pin_subpackage\(").unwrap());

static NUMPY_XX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"numpy\s*x\.x").unwrap());

fn section<'t>(re: &Regex, text: &'t str) -> &'t str {
  re.captures(text)
    .and_then(|c| c.get(1))
    .map(|m| m.as_str())
    .unwrap_or_default()
}

fn jinja_references(text: &str) -> BTreeSet<String> {
  JINJA_REFERENCE
    .captures_iter(text)
    .filter_map(|c| c.get(1))
    .map(|m| m.as_str().to_string())
    .collect()
}

impl Metadata {
  fn raw_text(&self) -> &str {
    self.recipe().map(|r| r.text()).unwrap_or_default()
  }

  /// Selected text of one raw section, empty without a recipe file.
  fn selected_section(&self, re: Option<&Regex>) -> Result<String> {
    let Some(recipe) = self.recipe() else {
      return Ok(String::new());
    };
    let text = match re {
      Some(re) => section(re, recipe.text()),
      None => recipe.text(),
    };
    select_lines(text, &self.namespace(), !self.variant().is_empty(), &recipe.origin())
  }

  /// Raw `requirements` section after selectors.
  pub fn requirements_text(&self) -> Result<String> {
    self.selected_section(Some(&REQUIREMENTS_SECTION))
  }

  /// Raw `source` section after selectors.
  pub fn source_text(&self) -> Result<String> {
    self.selected_section(Some(&SOURCE_SECTION))
  }

  /// Raw `package` and `build` sections after selectors.
  pub fn package_and_build_text(&self) -> Result<String> {
    let package = self.selected_section(Some(&PACKAGE_SECTION))?;
    let build = self.selected_section(Some(&BUILD_SECTION))?;
    Ok(format!("{}{}", package, build))
  }

  /// Version-control system whose variables the recipe reads, if any.
  pub fn uses_vcs_in_meta(&self) -> Option<&'static str> {
    let name = self.raw_name().to_lowercase();
    VCS_VARIABLE
      .captures_iter(self.raw_text())
      .filter_map(|c| c.get(1))
      .map(|m| match m.as_str() {
        "GIT" => "git",
        "SVN" => "svn",
        _ => "mercurial",
      })
      .find(|vcs| *vcs != name && !(*vcs == "mercurial" && name == "hg"))
  }

  pub fn uses_setup_py_in_meta(&self) -> bool {
    SETUP_PY_LOADER.is_match(self.raw_text())
  }

  pub fn uses_regex_in_meta(&self) -> bool {
    FILE_REGEX_LOADER.is_match(self.raw_text())
  }

  /// Whether the recipe can only be rendered with its source unpacked.
  pub fn needs_source_for_render(&self) -> bool {
    self.uses_vcs_in_meta().is_some() || self.uses_setup_py_in_meta() || self.uses_regex_in_meta()
  }

  /// Whether the `package` or `build` section writes `h{{ PKG_HASH }}`
  /// itself. Mentions elsewhere in the recipe do not count.
  pub fn uses_hash_placeholder(&self) -> Result<bool> {
    Ok(HASH_PLACEHOLDER.is_match(&self.package_and_build_text()?))
  }

  /// Legacy `numpy x.x` pinning in the requirements section.
  pub fn uses_numpy_xx(&self) -> Result<bool> {
    let uses = NUMPY_XX.is_match(&self.requirements_text()?);
    if uses {
      warn!(recipe = %self.origin(), "numpy x.x is deprecated; pin numpy through the variant instead");
    }
    Ok(uses)
  }

  /// Whether run requirements name one of the recipe's own outputs.
  pub fn uses_subpackage(&self) -> Result<bool> {
    let names: Vec<&str> = self
      .document()
      .outputs
      .iter()
      .map(|o| o.name())
      .filter(|n| !n.is_empty())
      .collect();
    let in_run = self.document().requirements.run.iter().any(|spec| {
      names
        .iter()
        .any(|name| spec.as_str() == *name || spec.starts_with(&format!("{} ", name)))
    });
    Ok(in_run || SUBPACKAGE_PIN.is_match(&self.requirements_text()?))
  }

  /// Whether an unresolved name in the variant-free render is a variant
  /// axis that the source section references.
  pub fn variant_in_source(&self, renderer: &dyn TemplateRenderer) -> Result<bool> {
    let Some(recipe) = self.recipe() else {
      return Ok(false);
    };
    let bare = self.with_variant(&VariantAssignment::new());
    let rendered = renderer
      .render(recipe.text(), &bare.render_context(), UndefinedPolicy::Lenient)
      .map_err(|source| RenderError::Template {
        path: recipe.origin(),
        source,
      })?;
    let referenced = jinja_references(&self.source_text()?);
    Ok(
      rendered
        .unresolved
        .iter()
        .any(|name| self.variant().contains(name) && referenced.contains(name)),
    )
  }

  /// The subset of `loop_vars` the recipe actually refers to: as a
  /// template variable, as a requirement name, or as `{lang}_compiler`
  /// through `compiler('lang')`.
  pub fn used_loop_vars(&self, loop_vars: &[String]) -> Result<BTreeSet<String>> {
    let mut text = self.selected_section(None)?;
    if text.trim().is_empty() {
      let reqs = &self.document().requirements;
      let specs: Vec<&str> = reqs
        .build
        .iter()
        .chain(&reqs.host)
        .chain(&reqs.run)
        .map(String::as_str)
        .collect();
      text = specs.iter().map(|s| format!("- {}\n", s)).collect();
    }

    let referenced = jinja_references(&text);
    let requirements: BTreeSet<&str> = REQUIREMENT_ITEM
      .captures_iter(&text)
      .filter_map(|c| c.get(1))
      .map(|m| m.as_str())
      .collect();
    let compilers: BTreeSet<&str> = COMPILER_CALL
      .captures_iter(&text)
      .filter_map(|c| c.get(1))
      .map(|m| m.as_str())
      .collect();

    Ok(
      loop_vars
        .iter()
        .filter(|var| {
          referenced.contains(var.as_str())
            || requirements.contains(var.as_str())
            || var
              .strip_suffix("_compiler")
              .is_some_and(|lang| compilers.contains(lang))
        })
        .cloned()
        .collect(),
    )
  }
}

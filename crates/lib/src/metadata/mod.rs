//! Recipe metadata: one rendered document bound to one variant.
//!
//! [`Metadata`] values are never mutated once built. Re-rendering, scoping
//! to another variant, deriving an output or marking final all return a new
//! value, so metadata handed to one output never observes changes made for
//! another.

pub mod index;
pub mod output;
pub mod text;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::RenderConfig;
use crate::consts::{
  ALT_RECIPE_FILENAME, RECIPE_APPEND_FILENAME, RECIPE_CLOBBER_FILENAME, RECIPE_FILENAME, REQUIREMENTS_TXT,
};
use crate::error::{RenderError, Result};
use crate::platform::os::Os;
use crate::recipe::validate::check_features;
use crate::recipe::{
  DepEnv, MatchSpec, MergeMode, RecipeDocument, check_bad_chars, check_dependency, is_true, merge_sections,
  parse_bool, parse_recipe_text,
};
use crate::selector::Namespace;
use crate::template::{
  RenderContext, ResolveOptions, SubpackagePin, TemplateRenderer, UndefinedPolicy, resolve_until_fixpoint,
};
use crate::variant::VariantAssignment;

/// Locate the recipe file for `path`: the file itself, or `meta.yaml` /
/// `conda.yaml` inside a directory.
pub fn find_recipe(path: &Path) -> Result<PathBuf> {
  if path.is_file() {
    return Ok(path.to_path_buf());
  }
  [RECIPE_FILENAME, ALT_RECIPE_FILENAME]
    .iter()
    .map(|name| path.join(name))
    .find(|candidate| candidate.is_file())
    .ok_or_else(|| {
      RenderError::io(
        path,
        std::io::Error::new(
          std::io::ErrorKind::NotFound,
          format!("no {} or {} found", RECIPE_FILENAME, ALT_RECIPE_FILENAME),
        ),
      )
    })
}

/// Raw text of a recipe file and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFile {
  path: PathBuf,
  text: String,
}

impl RecipeFile {
  pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      text: text.into(),
    }
  }

  pub fn read(path: &Path) -> Result<Self> {
    let path = find_recipe(path)?;
    let text = fs::read_to_string(&path).map_err(|e| RenderError::io(&path, e))?;
    Ok(Self { path, text })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Directory holding the recipe and its auxiliary files.
  pub fn dir(&self) -> &Path {
    self.path.parent().unwrap_or(Path::new("."))
  }

  pub fn file_name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| RECIPE_FILENAME.to_string())
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn origin(&self) -> String {
    self.path.display().to_string()
  }
}

/// The recipe a derived output came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentRecipe {
  pub path: PathBuf,
  pub name: String,
  pub version: String,
}

#[derive(Debug, Clone)]
pub struct Metadata {
  doc: RecipeDocument,
  config: Arc<RenderConfig>,
  variant: VariantAssignment,
  recipe: Option<Arc<RecipeFile>>,
  parent: Option<ParentRecipe>,
  target_subdir: Option<String>,
  is_final: bool,
  unresolved: BTreeSet<String>,
  other_outputs: Arc<Vec<SubpackagePin>>,
}

impl Metadata {
  /// Read the recipe at `path` and render it once, leniently, without a
  /// variant.
  pub fn load(path: &Path, config: Arc<RenderConfig>, renderer: &dyn TemplateRenderer) -> Result<Self> {
    let recipe = RecipeFile::read(path)?;
    debug!(recipe = %recipe.origin(), "loading recipe");
    Self::from_recipe(recipe, config, VariantAssignment::new(), renderer)
  }

  /// Render `recipe` once, leniently, for `variant`.
  pub fn from_recipe(
    recipe: RecipeFile,
    config: Arc<RenderConfig>,
    variant: VariantAssignment,
    renderer: &dyn TemplateRenderer,
  ) -> Result<Self> {
    let unparsed = Self {
      recipe: Some(Arc::new(recipe)),
      ..Self::from_document(RecipeDocument::default(), config, variant)
    };
    unparsed.reparse(renderer, UndefinedPolicy::Lenient)
  }

  /// Wrap an already-parsed document. Nothing is rendered.
  pub fn from_document(doc: RecipeDocument, config: Arc<RenderConfig>, variant: VariantAssignment) -> Self {
    Self {
      doc,
      config,
      variant,
      recipe: None,
      parent: None,
      target_subdir: None,
      is_final: false,
      unresolved: BTreeSet::new(),
      other_outputs: Arc::new(Vec::new()),
    }
  }

  pub fn document(&self) -> &RecipeDocument {
    &self.doc
  }

  pub fn config(&self) -> &RenderConfig {
    &self.config
  }

  pub fn variant(&self) -> &VariantAssignment {
    &self.variant
  }

  pub fn recipe(&self) -> Option<&RecipeFile> {
    self.recipe.as_deref()
  }

  pub fn parent(&self) -> Option<&ParentRecipe> {
    self.parent.as_ref()
  }

  pub fn is_final(&self) -> bool {
    self.is_final
  }

  /// Names the last render could not resolve.
  pub fn unresolved(&self) -> &BTreeSet<String> {
    &self.unresolved
  }

  pub fn other_outputs(&self) -> &[SubpackagePin] {
    &self.other_outputs
  }

  /// Directory whose files belong to this recipe: the recipe's own
  /// directory, or the parent recipe's for derived outputs.
  pub fn recipe_dir(&self) -> Option<&Path> {
    match (&self.parent, &self.recipe) {
      (Some(parent), _) => Some(parent.path.as_path()),
      (None, Some(recipe)) => Some(recipe.dir()),
      (None, None) => None,
    }
  }

  /// Label used in diagnostics.
  pub fn origin(&self) -> String {
    match (&self.recipe, &self.parent) {
      (Some(recipe), _) => recipe.origin(),
      (None, Some(parent)) => parent.path.display().to_string(),
      (None, None) => self.raw_name().to_string(),
    }
  }

  /// Whether re-rendering starts from the recipe text. Derived outputs only
  /// re-apply document post-processing.
  fn renders_from_file(&self) -> bool {
    self.recipe.is_some() && self.parent.is_none()
  }

  pub fn namespace(&self) -> Namespace {
    Namespace::for_render(&self.config, &self.variant)
  }

  pub fn render_context(&self) -> RenderContext {
    RenderContext::new(&self.namespace(), &self.variant, &self.config).with_pins(self.other_outputs.to_vec())
  }

  /// The same recipe scoped to `variant`; not final, nothing re-rendered.
  pub fn with_variant(&self, variant: &VariantAssignment) -> Self {
    Self {
      variant: variant.clone(),
      is_final: false,
      unresolved: BTreeSet::new(),
      ..self.clone()
    }
  }

  /// Pins of sibling outputs available to `pin_subpackage`.
  pub fn with_other_outputs(&self, pins: Vec<SubpackagePin>) -> Self {
    Self {
      other_outputs: Arc::new(pins),
      ..self.clone()
    }
  }

  pub fn with_final(&self, is_final: bool) -> Self {
    Self {
      is_final,
      ..self.clone()
    }
  }

  pub fn with_document(&self, doc: RecipeDocument) -> Self {
    Self { doc, ..self.clone() }
  }

  /// Render, select and parse once more.
  pub fn reparse(&self, renderer: &dyn TemplateRenderer, policy: UndefinedPolicy) -> Result<Self> {
    if self.is_final {
      return Err(RenderError::Finalized(self.origin()));
    }

    let (doc, unresolved) = match self.recipe.as_deref() {
      Some(recipe) if self.renders_from_file() => {
        let ctx = self.render_context();
        let rendered = renderer
          .render(recipe.text(), &ctx, policy)
          .map_err(|source| RenderError::Template {
            path: recipe.origin(),
            source,
          })?;
        let doc = parse_recipe_text(
          &rendered.text,
          &self.namespace(),
          !self.variant.is_empty(),
          &recipe.origin(),
        )?;
        (doc, rendered.unresolved)
      }
      _ => (self.doc.clone(), BTreeSet::new()),
    };

    let doc = self.finish_document(doc)?;
    trace!(
      origin = %self.origin(),
      variant = %self.variant,
      ?policy,
      unresolved = unresolved.len(),
      "parsed recipe"
    );
    Ok(Self {
      doc,
      unresolved,
      ..self.clone()
    })
  }

  /// Re-render until the unresolved names settle, then render strictly.
  pub fn parse_until_resolved(&self, renderer: &dyn TemplateRenderer) -> Result<Self> {
    let options = ResolveOptions {
      max_iterations: self.config.max_resolve_iterations,
      origin: self.origin(),
    };
    resolve_until_fixpoint(
      |policy| {
        let parsed = self.reparse(renderer, policy)?;
        let unresolved = parsed.unresolved.clone();
        Ok((parsed, unresolved))
      },
      &options,
    )
  }

  /// Post-processing applied after every parse.
  fn finish_document(&self, mut doc: RecipeDocument) -> Result<RecipeDocument> {
    if self.renders_from_file()
      && doc.requirements.run.is_empty()
      && let Some(dir) = self.recipe_dir()
    {
      let path = dir.join(REQUIREMENTS_TXT);
      if path.is_file() {
        doc.requirements.run = read_requirements_txt(&path)?;
        debug!(path = %path.display(), count = doc.requirements.run.len(), "run requirements from requirements.txt");
      }
    }

    let dir = if self.renders_from_file() { self.recipe_dir() } else { None };
    let append = self
      .config
      .append_sections_file
      .clone()
      .or_else(|| dir.map(|d| d.join(RECIPE_APPEND_FILENAME)));
    let clobber = self
      .config
      .clobber_sections_file
      .clone()
      .or_else(|| dir.map(|d| d.join(RECIPE_CLOBBER_FILENAME)));
    for (file, mode) in [(append, MergeMode::Append), (clobber, MergeMode::Clobber)] {
      let Some(file) = file else { continue };
      if !file.is_file() {
        trace!(path = %file.display(), "sections file not present");
        continue;
      }
      let text = fs::read_to_string(&file).map_err(|e| RenderError::io(&file, e))?;
      let origin = file.display().to_string();
      let sections = parse_recipe_text(&text, &self.namespace(), !self.variant.is_empty(), &origin)?;
      doc = merge_sections(&doc, &sections, mode, &origin)?;
      debug!(path = %origin, ?mode, "merged recipe sections");
    }

    check_features(&doc.build.features)?;

    if is_true(&doc.build.osx_is_app)
      && self.config.platform().os == Os::Osx
      && !doc.requirements.run.iter().any(|r| r == "python.app")
    {
      doc.requirements.run.push("python.app".to_string());
    }

    Ok(doc)
  }

  /// `package/name` as written, possibly empty.
  pub fn raw_name(&self) -> &str {
    self.doc.package.name.as_deref().unwrap_or_default()
  }

  /// Validated package name.
  pub fn name(&self) -> Result<String> {
    let name = self.raw_name();
    if name.is_empty() {
      return Err(RenderError::field(
        "package/name",
        format!("package/name missing in {}", self.origin()),
      ));
    }
    if name != name.to_lowercase() {
      return Err(RenderError::field(
        "package/name",
        format!("package/name must be lowercase, got '{}'", name),
      ));
    }
    check_bad_chars(name, "package/name")?;
    Ok(name.to_string())
  }

  /// Validated package version.
  pub fn version(&self) -> Result<String> {
    let version = self.doc.package.version.as_deref().ok_or_else(|| {
      RenderError::field("package/version", format!("package/version missing in {}", self.origin()))
    })?;
    check_bad_chars(version, "package/version")?;
    if self.is_final && version.starts_with('.') {
      return Err(RenderError::field(
        "package/version",
        format!("fully rendered version can't start with a period, got '{}'", version),
      ));
    }
    Ok(version.to_string())
  }

  /// `build/number` when it is an integer.
  pub fn build_number(&self) -> Option<u64> {
    self.doc.build.number.as_deref().and_then(|n| n.trim().parse().ok())
  }

  /// `build/noarch` unless it spells false.
  pub fn noarch(&self) -> Option<&str> {
    self
      .doc
      .build
      .noarch
      .as_deref()
      .filter(|value| parse_bool(Some(*value), true))
  }

  pub fn noarch_python(&self) -> bool {
    is_true(&self.doc.build.noarch_python)
  }

  pub fn is_noarch(&self) -> bool {
    self.noarch().is_some() || self.noarch_python()
  }

  /// Whether the recipe separates host from build requirements.
  pub fn is_cross(&self) -> bool {
    !self.doc.requirements.host.is_empty()
  }

  pub fn skip(&self) -> bool {
    self.doc.build.skip()
  }

  /// Subdir the package is produced for.
  pub fn target_subdir(&self) -> String {
    if self.is_noarch() {
      return "noarch".to_string();
    }
    self
      .target_subdir
      .clone()
      .unwrap_or_else(|| self.config.host_subdir.clone())
  }

  /// Parsed and validated requirements of `env`.
  pub fn ms_depends(&self, env: DepEnv) -> Result<Vec<MatchSpec>> {
    let name = self.name()?;
    self
      .doc
      .requirements
      .get(env)
      .iter()
      .map(|spec| check_dependency(spec, &name))
      .collect()
  }

  /// `name-version-build_id`.
  pub fn dist(&self) -> Result<String> {
    Ok(format!("{}-{}-{}", self.name()?, self.version()?, self.build_id()?))
  }

  pub fn pkg_fn(&self) -> Result<String> {
    Ok(format!("{}.tar.bz2", self.dist()?))
  }
}

/// Requirement specs from a pip-style `requirements.txt`.
fn read_requirements_txt(path: &Path) -> Result<Vec<String>> {
  let text = fs::read_to_string(path).map_err(|e| RenderError::io(path, e))?;
  Ok(
    text
      .lines()
      .map(|line| line.split('#').next().unwrap_or_default().trim())
      .filter(|line| !line.is_empty())
      .map(|line| match line.split_once("==") {
        Some((name, version)) => format!("{} {}", name.trim(), version.trim()),
        None => line.to_string(),
      })
      .collect(),
  )
}

#[cfg(test)]
pub(crate) mod testutil {
  use super::*;

  pub fn linux_config() -> Arc<RenderConfig> {
    Arc::new(RenderConfig {
      host_subdir: "linux-64".to_string(),
      ..RenderConfig::default()
    })
  }

  pub fn metadata_from(text: &str) -> Metadata {
    let doc = crate::recipe::parse_document(text, "meta.yaml").unwrap();
    Metadata::from_document(doc, linux_config(), VariantAssignment::new())
  }
}

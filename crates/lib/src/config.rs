//! Render configuration.
//!
//! [`RenderConfig`] holds every knob the pipeline reads. It deserializes from
//! YAML with all fields optional, so a config file only names what it
//! overrides.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_HASH_LENGTH, DEFAULT_MAX_RESOLVE_ITERATIONS};
use crate::error::{RenderError, Result};
use crate::platform::{Platform, host_subdir};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
  /// Package subdir the recipe is rendered for (`linux-64`, `osx-arm64`, ...).
  pub host_subdir: String,
  /// Hex digits kept from the dependency digest.
  pub hash_length: usize,
  /// Inject the digest into build ids of final metadata.
  pub filename_hashing: bool,
  /// Fold recipe-directory files into the digest.
  pub include_recipe: bool,
  /// Build requirement names left out of the digest.
  pub ignore_version: Vec<String>,
  /// Keep prior metadata when dependencies cannot be satisfied yet.
  pub permit_unsatisfiable_variants: bool,
  /// Lenient render rounds allowed before the loop is declared divergent.
  pub max_resolve_iterations: usize,
  /// Sections merged into every rendered recipe.
  pub append_sections_file: Option<PathBuf>,
  /// Sections that replace rendered recipe sections.
  pub clobber_sections_file: Option<PathBuf>,
  /// Directory that source acquisition populates.
  pub work_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
  fn default() -> Self {
    Self {
      host_subdir: host_subdir(),
      hash_length: DEFAULT_HASH_LENGTH,
      filename_hashing: true,
      include_recipe: true,
      ignore_version: Vec::new(),
      permit_unsatisfiable_variants: false,
      max_resolve_iterations: DEFAULT_MAX_RESOLVE_ITERATIONS,
      append_sections_file: None,
      clobber_sections_file: None,
      work_dir: None,
    }
  }
}

impl RenderConfig {
  /// Load a config file. Missing keys keep their defaults.
  pub fn from_file(path: &Path) -> Result<Self> {
    let text = fs::read_to_string(path).map_err(|e| RenderError::io(path, e))?;
    Self::from_yaml_str(&text, path)
  }

  pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self> {
    if text.trim().is_empty() {
      return Ok(Self::default());
    }
    let config: Self = serde_yaml::from_str(text).map_err(|e| RenderError::Schema {
      path: origin.display().to_string(),
      message: e.to_string(),
    })?;
    config.validate(origin)?;
    Ok(config)
  }

  fn validate(&self, origin: &Path) -> Result<()> {
    if Platform::from_subdir(&self.host_subdir).is_none() {
      return Err(RenderError::Schema {
        path: origin.display().to_string(),
        message: format!("unknown host_subdir '{}'", self.host_subdir),
      });
    }
    if self.hash_length == 0 || self.hash_length > 64 {
      return Err(RenderError::Schema {
        path: origin.display().to_string(),
        message: format!("hash_length must be between 1 and 64, got {}", self.hash_length),
      });
    }
    self.ignore_patterns().map_err(|e| RenderError::Schema {
      path: origin.display().to_string(),
      message: e.to_string(),
    })?;
    Ok(())
  }

  /// `ignore_version` entries compiled as patterns anchored at the start of
  /// a requirement, so `cmak` matches `cmake >=3`.
  pub fn ignore_patterns(&self) -> Result<Vec<Regex>> {
    self
      .ignore_version
      .iter()
      .map(|pattern| {
        Regex::new(&format!("^(?:{})", pattern))
          .map_err(|e| RenderError::field("ignore_version", format!("invalid pattern '{}': {}", pattern, e)))
      })
      .collect()
  }

  /// The parsed host platform. Falls back to the running platform for
  /// subdirs set programmatically to something unknown.
  pub fn platform(&self) -> Platform {
    Platform::from_subdir(&self.host_subdir)
      .or_else(Platform::current)
      .unwrap_or(Platform::new(
        crate::platform::os::Os::Linux,
        crate::platform::arch::Arch::X86_64,
      ))
  }

  /// Placeholder substituted for `PKG_HASH` while rendering.
  pub fn hash_placeholder(&self) -> String {
    "0".repeat(self.hash_length)
  }
}

//! Source acquisition for recipes that read their own source while
//! rendering (`GIT_*` variables, `load_setup_py_data`, ...).

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::metadata::Metadata;
use crate::recipe::SourceSpec;

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("source path does not exist: {0}")]
  MissingPath(PathBuf),

  #[error("relative source path {0} needs a recipe directory")]
  NoRecipeDir(String),

  #[error("failed to copy {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to walk source tree: {0}")]
  Walk(#[from] walkdir::Error),
}

/// Makes a recipe's source available in the work directory.
pub trait SourceProvider {
  fn provide(&self, metadata: &Metadata) -> Result<(), SourceError>;
}

/// Provides nothing; recipes needing source render with what the variant
/// defines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSource;

impl SourceProvider for NoSource {
  fn provide(&self, metadata: &Metadata) -> Result<(), SourceError> {
    debug!(recipe = %metadata.origin(), "source acquisition disabled");
    Ok(())
  }
}

/// Copies `source/path` trees into a work directory. Remote sources are not
/// fetched.
#[derive(Debug, Clone)]
pub struct LocalPathSource {
  work_dir: PathBuf,
}

impl LocalPathSource {
  pub fn new(work_dir: impl Into<PathBuf>) -> Self {
    Self {
      work_dir: work_dir.into(),
    }
  }

  pub fn work_dir(&self) -> &Path {
    &self.work_dir
  }

  fn resolve(&self, metadata: &Metadata, path: &str) -> Result<PathBuf, SourceError> {
    let path = Path::new(path);
    if path.is_absolute() {
      return Ok(path.to_path_buf());
    }
    metadata
      .recipe_dir()
      .map(|dir| dir.join(path))
      .ok_or_else(|| SourceError::NoRecipeDir(path.display().to_string()))
  }

  fn copy_tree(&self, src: &Path) -> Result<usize, SourceError> {
    if !src.exists() {
      return Err(SourceError::MissingPath(src.to_path_buf()));
    }
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(true) {
      let entry = entry?;
      let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
      let dest = self.work_dir.join(rel);
      if entry.file_type().is_dir() {
        fs::create_dir_all(&dest).map_err(io_err(&dest))?;
      } else {
        if let Some(parent) = dest.parent() {
          fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        fs::copy(entry.path(), &dest).map_err(io_err(entry.path()))?;
        copied += 1;
      }
    }
    Ok(copied)
  }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SourceError {
  let path = path.to_path_buf();
  move |source| SourceError::Io { path, source }
}

fn remote_kind(spec: &SourceSpec) -> Option<&'static str> {
  if !spec.url.is_empty() {
    Some("url")
  } else if spec.git_url.is_some() {
    Some("git")
  } else if spec.hg_url.is_some() {
    Some("hg")
  } else if spec.svn_url.is_some() {
    Some("svn")
  } else {
    None
  }
}

impl SourceProvider for LocalPathSource {
  fn provide(&self, metadata: &Metadata) -> Result<(), SourceError> {
    if self.work_dir.exists() {
      fs::remove_dir_all(&self.work_dir).map_err(io_err(&self.work_dir))?;
    }
    fs::create_dir_all(&self.work_dir).map_err(io_err(&self.work_dir))?;

    let Some(section) = &metadata.document().source else {
      return Ok(());
    };
    for spec in section.specs() {
      if let Some(path) = &spec.path {
        let src = self.resolve(metadata, path)?;
        let copied = self.copy_tree(&src)?;
        info!(source = %src.display(), work_dir = %self.work_dir.display(), files = copied, "copied source");
      } else if let Some(kind) = remote_kind(spec) {
        warn!(kind, recipe = %metadata.origin(), "remote sources are not fetched");
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RenderConfig;
  use crate::metadata::RecipeFile;
  use crate::template::JinjaRenderer;
  use crate::variant::VariantAssignment;
  use std::sync::Arc;
  use tempfile::TempDir;

  fn metadata(dir: &Path, text: &str) -> Metadata {
    let config = Arc::new(RenderConfig {
      host_subdir: "linux-64".to_string(),
      ..RenderConfig::default()
    });
    let recipe = RecipeFile::new(dir.join("meta.yaml"), text);
    Metadata::from_recipe(recipe, config, VariantAssignment::new(), &JinjaRenderer).unwrap()
  }

  #[test]
  fn copies_relative_path_source() {
    let recipe = TempDir::new().unwrap();
    let src = recipe.path().join("src");
    fs::create_dir_all(src.join("pkg")).unwrap();
    fs::write(src.join("setup.py"), "setup()\n").unwrap();
    fs::write(src.join("pkg/__init__.py"), "").unwrap();

    let work = TempDir::new().unwrap();
    let work_dir = work.path().join("work");
    let m = metadata(recipe.path(), "package:\n  name: foo\n  version: '1.0'\nsource:\n  path: src\n");
    LocalPathSource::new(&work_dir).provide(&m).unwrap();

    assert!(work_dir.join("setup.py").is_file());
    assert!(work_dir.join("pkg/__init__.py").is_file());
  }

  #[test]
  fn work_dir_is_cleared_first() {
    let recipe = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::write(work.path().join("stale.txt"), "old").unwrap();

    let m = metadata(recipe.path(), "package:\n  name: foo\n  version: '1.0'\n");
    LocalPathSource::new(work.path()).provide(&m).unwrap();
    assert!(!work.path().join("stale.txt").exists());
  }

  #[test]
  fn missing_path_is_an_error() {
    let recipe = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let m = metadata(recipe.path(), "package:\n  name: foo\n  version: '1.0'\nsource:\n  - path: nowhere\n");
    let err = LocalPathSource::new(work.path().join("w")).provide(&m).unwrap_err();
    assert!(matches!(err, SourceError::MissingPath(_)));
  }

  #[test]
  fn remote_sources_are_skipped() {
    let recipe = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let m = metadata(
      recipe.path(),
      "package:\n  name: foo\n  version: '1.0'\nsource:\n  git_url: https://example.com/foo.git\n",
    );
    LocalPathSource::new(work.path().join("w")).provide(&m).unwrap();
  }
}

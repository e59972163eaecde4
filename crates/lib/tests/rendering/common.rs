//! Shared helpers for rendering tests.

use std::path::Path;

use metarender_lib::{
  Collaborators, RenderConfig, RenderOptions, RenderedOutput, Result, VariantMatrix, render_recipe,
};
use tempfile::TempDir;

/// A recipe directory that lives as long as the test.
pub struct RecipeDir {
  pub temp: TempDir,
}

impl RecipeDir {
  pub fn new(meta: &str) -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("meta.yaml"), meta).unwrap();
    Self { temp }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn write(&self, name: &str, content: &str) {
    std::fs::write(self.temp.path().join(name), content).unwrap();
  }

  pub fn render(&self, matrix: &VariantMatrix) -> Result<Vec<RenderedOutput>> {
    self.render_with(config("linux-64"), matrix)
  }

  pub fn render_with(&self, config: RenderConfig, matrix: &VariantMatrix) -> Result<Vec<RenderedOutput>> {
    render_recipe(
      self.path(),
      config,
      matrix,
      &Collaborators::default(),
      RenderOptions::default(),
    )
  }
}

pub fn config(subdir: &str) -> RenderConfig {
  RenderConfig {
    host_subdir: subdir.to_string(),
    ..RenderConfig::default()
  }
}

pub fn names(outputs: &[RenderedOutput]) -> Vec<String> {
  outputs.iter().map(|o| o.metadata.raw_name().to_string()).collect()
}

pub fn build_ids(outputs: &[RenderedOutput]) -> Vec<String> {
  outputs.iter().map(|o| o.metadata.build_id().unwrap()).collect()
}

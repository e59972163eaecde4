//! Implementation of the `metarender render` command.
//!
//! Loads the recipe, expands it over the variant matrix and prints one entry
//! per produced package.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use metarender_lib::consts::VARIANT_CONFIG_FILENAME;
use metarender_lib::metadata::find_recipe;
use metarender_lib::metadata::index::IndexRecord;
use metarender_lib::source::{LocalPathSource, NoSource, SourceProvider};
use metarender_lib::{
  Collaborators, RenderConfig, RenderOptions, RenderedOutput, VariantAssignment, VariantMatrix, VariantSupplier,
  render_recipe,
};

use super::apply_subdir;
use crate::output::{OutputFormat, format_list, print_json, print_stat, print_success, print_warning};

pub struct RenderArgs {
  pub recipe: PathBuf,
  pub variants: Option<PathBuf>,
  pub config: Option<PathBuf>,
  pub subdir: Option<String>,
  pub permit_unsatisfiable: bool,
  pub no_finalize: bool,
  pub work_dir: Option<PathBuf>,
  pub format: OutputFormat,
}

#[derive(Serialize)]
struct OutputSummary {
  name: String,
  kind: String,
  dist: String,
  subdir: String,
  variant: VariantAssignment,
  used_variables: Vec<String>,
  skip: bool,
  index: Option<IndexRecord>,
}

fn load_config(args: &RenderArgs) -> Result<RenderConfig> {
  let mut config = match &args.config {
    Some(path) => {
      RenderConfig::from_file(path).with_context(|| format!("Failed to load config: {}", path.display()))?
    }
    None => RenderConfig::default(),
  };
  apply_subdir(&mut config, args.subdir.as_deref())?;
  if args.permit_unsatisfiable {
    config.permit_unsatisfiable_variants = true;
  }
  if args.work_dir.is_some() {
    config.work_dir = args.work_dir.clone();
  }
  Ok(config)
}

/// The axis file named on the command line, else the one beside the recipe.
fn load_variants(args: &RenderArgs, recipe: &Path, config: &RenderConfig) -> Result<VariantMatrix> {
  let path = match &args.variants {
    Some(path) => path.clone(),
    None => {
      let beside = recipe.parent().unwrap_or(Path::new(".")).join(VARIANT_CONFIG_FILENAME);
      if !beside.is_file() {
        debug!("no variant file, rendering a single empty variant");
        return Ok(VariantMatrix::new());
      }
      beside
    }
  };
  VariantMatrix::from_file(&path, config).with_context(|| format!("Failed to load variants: {}", path.display()))
}

fn summarize(out: &RenderedOutput, loop_vars: &[String]) -> Result<OutputSummary> {
  let m = &out.metadata;
  let index = if out.descriptor.is_conda() {
    Some(m.index_record().with_context(|| format!("Failed to build index record for {}", m.raw_name()))?)
  } else {
    None
  };
  Ok(OutputSummary {
    name: m.name()?,
    kind: out.descriptor.kind().to_string(),
    dist: m.dist()?,
    subdir: m.target_subdir(),
    variant: m.variant().clone(),
    used_variables: m.used_loop_vars(loop_vars)?.into_iter().collect(),
    skip: m.skip(),
    index,
  })
}

pub fn cmd_render(args: RenderArgs) -> Result<()> {
  let recipe =
    find_recipe(&args.recipe).with_context(|| format!("Failed to find recipe: {}", args.recipe.display()))?;
  let config = load_config(&args)?;
  let variants = load_variants(&args, &recipe, &config)?;

  let local_source = config.work_dir.clone().map(LocalPathSource::new);
  let source: &dyn SourceProvider = match &local_source {
    Some(local) => local,
    None => &NoSource,
  };
  let collab = Collaborators {
    source,
    ..Collaborators::default()
  };
  let options = RenderOptions {
    no_finalize: args.no_finalize,
    ..RenderOptions::default()
  };

  let outputs = render_recipe(&recipe, config, &variants, &collab, options)
    .with_context(|| format!("Failed to render recipe: {}", recipe.display()))?;

  let loop_vars = variants.loop_vars();
  let summaries = outputs
    .iter()
    .map(|out| summarize(out, &loop_vars))
    .collect::<Result<Vec<_>>>()?;

  if args.format.is_json() {
    print_json(&summaries)?;
    return Ok(());
  }

  for summary in &summaries {
    if summary.skip {
      print_warning(&format!("{} (skipped)", summary.dist));
    } else {
      print_success(&summary.dist);
    }
    print_stat("Type", &summary.kind);
    print_stat("Subdir", &summary.subdir);
    print_stat("Variant", &summary.variant.to_string());
    print_stat("Uses", &format_list(&summary.used_variables));
  }
  Ok(())
}

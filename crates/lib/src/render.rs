//! Rendering a recipe into its complete set of outputs.
//!
//! For every variant the recipe is resolved, split into outputs and
//! de-duplicated; the combined set is ordered, checked for mutual
//! dependencies and finalized in three passes.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::consts::WHEEL_OUTPUT_TYPE;
use crate::error::{RenderError, Result};
use crate::finalize::{DependencyFinalizer, PassthroughFinalizer, finalize_outputs};
use crate::graph::{check_circular_dependencies, ensure_matching_hashes, toposort};
use crate::metadata::Metadata;
use crate::recipe::{OutputDescriptor, OutputRequirements};
use crate::source::{NoSource, SourceProvider};
use crate::template::{JinjaRenderer, TemplateRenderer, UndefinedPolicy};
use crate::util::hash::canonical_json;
use crate::variant::{VariantAssignment, VariantSupplier};

/// One produced package: the descriptor it came from and its metadata.
#[derive(Debug, Clone)]
pub struct RenderedOutput {
  pub descriptor: OutputDescriptor,
  pub metadata: Metadata,
}

/// External services a render calls out to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
  pub renderer: &'a dyn TemplateRenderer,
  pub source: &'a dyn SourceProvider,
  pub finalizer: &'a dyn DependencyFinalizer,
}

impl Default for Collaborators<'static> {
  fn default() -> Self {
    Self {
      renderer: &JinjaRenderer,
      source: &NoSource,
      finalizer: &PassthroughFinalizer,
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
  /// Keep going with names left undefined; implies no finalization.
  pub permit_undefined: bool,
  /// Stop after ordering and cycle checks.
  pub no_finalize: bool,
}

/// Load the recipe at `path` and render it for every variant `variants`
/// supplies.
pub fn render_recipe(
  path: &Path,
  config: RenderConfig,
  variants: &dyn VariantSupplier,
  collab: &Collaborators<'_>,
  options: RenderOptions,
) -> Result<Vec<RenderedOutput>> {
  let mut config = config;
  for pattern in variants.ignore_version() {
    if !config.ignore_version.contains(&pattern) {
      config.ignore_version.push(pattern);
    }
  }
  let base = Metadata::load(path, Arc::new(config), collab.renderer)?;
  render_metadata(&base, variants, collab, options)
}

/// Render already-loaded recipe metadata. Final metadata is returned as is
/// with its first output descriptor.
pub fn render_metadata(
  base: &Metadata,
  variants: &dyn VariantSupplier,
  collab: &Collaborators<'_>,
  options: RenderOptions,
) -> Result<Vec<RenderedOutput>> {
  if base.is_final() {
    let descriptor = base
      .output_descriptors()?
      .into_iter()
      .next()
      .unwrap_or_default();
    return Ok(vec![RenderedOutput {
      descriptor,
      metadata: base.clone(),
    }]);
  }

  let mut derived: IndexMap<String, RenderedOutput> = IndexMap::new();
  for variant in variants.variants() {
    let resolved = resolve_variant(base, &variant, collab, options)?;
    for descriptor in resolved.output_descriptors()? {
      let metadata = resolved.output_metadata(&descriptor)?;
      let key = format!(
        "{}{}",
        descriptor.structural_key(),
        canonical_json(&metadata.document().requirements)?
      );
      // later variants replace earlier ones that derive the same output
      derived.insert(key, RenderedOutput { descriptor, metadata });
    }
  }
  debug!(outputs = derived.len(), recipe = %base.origin(), "derived outputs");

  let ordered = toposort(derived.into_values().collect());
  check_circular_dependencies(&ordered)?;

  let (conda, mut other): (Vec<_>, Vec<_>) = ordered.into_iter().partition(|o| o.descriptor.is_conda());
  for out in other.iter_mut().filter(|o| o.descriptor.kind() == WHEEL_OUTPUT_TYPE) {
    add_wheel_build_requirements(out);
  }

  let conda = if options.permit_undefined || options.no_finalize {
    conda
  } else {
    let finalized = finalize_outputs(
      base,
      &conda,
      collab.renderer,
      collab.finalizer,
      base.config().permit_unsatisfiable_variants,
    )?;
    ensure_matching_hashes(&finalized)?;
    finalized
  };

  let mut outputs: Vec<RenderedOutput> = conda
    .into_iter()
    .map(|out| RenderedOutput {
      metadata: out.metadata.with_final(true),
      descriptor: out.descriptor,
    })
    .collect();
  outputs.extend(other);

  for out in &outputs {
    info!(
      output = out.metadata.raw_name(),
      kind = out.descriptor.kind(),
      variant = %out.metadata.variant(),
      "rendered output"
    );
  }
  Ok(outputs)
}

/// Scope `base` to `variant`, acquiring source first when the recipe reads
/// it and the variant changes what is read, then resolve all templates.
fn resolve_variant(
  base: &Metadata,
  variant: &VariantAssignment,
  collab: &Collaborators<'_>,
  options: RenderOptions,
) -> Result<Metadata> {
  let mut scoped = base.with_variant(variant);
  if scoped.needs_source_for_render() && scoped.variant_in_source(collab.renderer)? {
    let reparsed = scoped.reparse(collab.renderer, UndefinedPolicy::Lenient)?;
    collab
      .source
      .provide(&reparsed)
      .map_err(|source| RenderError::Source {
        package: reparsed.raw_name().to_string(),
        source,
      })?;
    scoped = reparsed.reparse(collab.renderer, UndefinedPolicy::Lenient)?;
  }

  match scoped.parse_until_resolved(collab.renderer) {
    Err(RenderError::UnresolvedTemplate { names, .. }) if options.permit_undefined => {
      warn!(?names, variant = %variant, "continuing with undefined template variables");
      scoped.reparse(collab.renderer, UndefinedPolicy::Lenient)
    }
    other => other,
  }
}

/// Wheel outputs build with `wheel` and the variant's python unless their
/// build requirements already mention wheel.
fn add_wheel_build_requirements(out: &mut RenderedOutput) {
  let mut reqs = out
    .descriptor
    .requirements
    .as_ref()
    .map(OutputRequirements::to_requirements)
    .unwrap_or_default();
  if reqs.build.iter().any(|r| r.contains("wheel")) {
    return;
  }

  let python = match out.metadata.variant().get("python") {
    Some(version) => format!("python {}", version),
    None => "python".to_string(),
  };
  reqs.build.extend(["wheel".to_string(), python]);

  let mut doc = out.metadata.document().clone();
  doc.requirements.build = reqs.build.clone();
  out.metadata = out.metadata.with_document(doc);
  out.descriptor.requirements = Some(OutputRequirements::Map(reqs));
  debug!(output = out.descriptor.name(), "added wheel build requirements");
}

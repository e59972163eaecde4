//! Multi-pass finalization of conda outputs.
//!
//! Outputs can pin each other exactly (`pin_subpackage(..., exact=True)`),
//! and an exact pin embeds the pinned output's build id, which only exists
//! once that output is final. Every round re-derives each output from the
//! base recipe with the pins known so far, so a downstream output picks up
//! the hash of an upstream one a round later. Three rounds settle an
//! upstream -> downstream chain with run-time pins in both directions.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::FINALIZE_ROUNDS;
use crate::error::{RenderError, Result};
use crate::metadata::Metadata;
use crate::recipe::OutputDescriptor;
use crate::render::RenderedOutput;
use crate::template::{SubpackagePin, TemplateRenderer};
use crate::variant::VariantAssignment;

#[derive(Debug, Error)]
pub enum FinalizeError {
  #[error("unsatisfiable dependencies: {}", .0.join(", "))]
  NeedsBuilding(Vec<String>),

  #[error("{0}")]
  Other(String),
}

/// Fills in concrete dependency versions for one output.
pub trait DependencyFinalizer {
  /// Return `metadata` with its dependencies resolved, marked final.
  fn finalize(&self, metadata: &Metadata, permit_unsatisfiable: bool) -> std::result::Result<Metadata, FinalizeError>;
}

/// Accepts every dependency as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFinalizer;

impl DependencyFinalizer for PassthroughFinalizer {
  fn finalize(&self, metadata: &Metadata, _permit_unsatisfiable: bool) -> std::result::Result<Metadata, FinalizeError> {
    Ok(metadata.with_final(true))
  }
}

type OutputKey = (String, VariantAssignment);

fn output_key(out: &RenderedOutput) -> OutputKey {
  (out.metadata.raw_name().to_string(), out.metadata.variant().clone())
}

fn run_finalizer(
  finalizer: &dyn DependencyFinalizer,
  metadata: &Metadata,
  permit_unsatisfiable: bool,
) -> Result<Metadata> {
  finalizer
    .finalize(metadata, permit_unsatisfiable)
    .map_err(|err| match err {
      FinalizeError::NeedsBuilding(unsatisfied) => RenderError::DependencyNeedsBuilding {
        package: metadata.raw_name().to_string(),
        unsatisfied,
      },
      other => RenderError::Finalize {
        package: metadata.raw_name().to_string(),
        source: other,
      },
    })
}

/// Pins for every output in `outputs`.
fn pins_of<'a>(outputs: impl Iterator<Item = &'a RenderedOutput>) -> Result<Vec<SubpackagePin>> {
  outputs
    .map(|out| {
      Ok(SubpackagePin {
        name: out.metadata.name()?,
        version: out.metadata.version()?,
        build_id: out.metadata.build_id()?,
        variant: out.metadata.variant().clone(),
      })
    })
    .collect()
}

/// The descriptor named like `original` in a reparsed recipe, or `original`
/// when the reparsed recipe no longer declares it.
fn rederive_descriptor(reparsed: &[OutputDescriptor], original: &OutputDescriptor) -> OutputDescriptor {
  reparsed
    .iter()
    .find(|d| d.name() == original.name() && d.kind() == original.kind())
    .cloned()
    .unwrap_or_else(|| original.clone())
}

struct Finalization<'a> {
  base: &'a Metadata,
  renderer: &'a dyn TemplateRenderer,
  finalizer: &'a dyn DependencyFinalizer,
  permit_unsatisfiable: bool,
}

impl Finalization<'_> {
  fn finalize_one(&self, out: &RenderedOutput, pins: Vec<SubpackagePin>) -> Result<RenderedOutput> {
    let scoped = self
      .base
      .with_variant(out.metadata.variant())
      .with_other_outputs(pins)
      .parse_until_resolved(self.renderer)?;
    let descriptor = rederive_descriptor(&scoped.output_descriptors()?, &out.descriptor);
    let derived = scoped.output_metadata(&descriptor)?;
    let metadata = run_finalizer(self.finalizer, &derived, self.permit_unsatisfiable)?;
    Ok(RenderedOutput { descriptor, metadata })
  }

  /// Apply `step`, keeping `fallback` when dependencies are unsatisfiable
  /// and that is permitted.
  fn tolerate(
    &self,
    fallback: &RenderedOutput,
    step: impl FnOnce() -> Result<RenderedOutput>,
  ) -> Result<RenderedOutput> {
    match step() {
      Err(RenderError::DependencyNeedsBuilding { package, unsatisfied }) if self.permit_unsatisfiable => {
        warn!(%package, missing = ?unsatisfied, "could not finalize metadata due to missing dependencies");
        Ok(fallback.clone())
      }
      other => other,
    }
  }

  fn round(
    &self,
    outputs: &[RenderedOutput],
    previous: &IndexMap<OutputKey, RenderedOutput>,
  ) -> Result<IndexMap<OutputKey, RenderedOutput>> {
    let mut current: IndexMap<OutputKey, RenderedOutput> = IndexMap::new();
    for out in outputs {
      let mut known = previous.clone();
      known.extend(current.iter().map(|(k, v)| (k.clone(), v.clone())));
      let pins = pins_of(known.values())?;

      let done = self.tolerate(out, || self.finalize_one(out, pins))?;
      current.insert(output_key(&done), done);
    }
    Ok(current)
  }
}

/// Finalize conda `outputs` of the recipe behind `base`, in render order.
pub fn finalize_outputs(
  base: &Metadata,
  outputs: &[RenderedOutput],
  renderer: &dyn TemplateRenderer,
  finalizer: &dyn DependencyFinalizer,
  permit_unsatisfiable: bool,
) -> Result<Vec<RenderedOutput>> {
  let pass = Finalization {
    base,
    renderer,
    finalizer,
    permit_unsatisfiable,
  };

  let mut settled: IndexMap<OutputKey, RenderedOutput> = IndexMap::new();
  for round in 0..FINALIZE_ROUNDS {
    settled = pass.round(outputs, &settled)?;
    debug!(round, outputs = settled.len(), "finalization round complete");
  }

  settled
    .into_values()
    .map(|out| {
      pass.tolerate(&out, || {
        let metadata = run_finalizer(finalizer, &out.metadata, permit_unsatisfiable)?;
        Ok(RenderedOutput {
          descriptor: out.descriptor.clone(),
          metadata,
        })
      })
    })
    .collect()
}

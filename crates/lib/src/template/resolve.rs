//! Driving a renderer to a fixpoint.
//!
//! A recipe may reference names that only become defined after another
//! round (a sibling version, a value computed from an earlier render), so
//! the loop stops when the unresolved set stops changing rather than when
//! it is empty. The set is not guaranteed to shrink monotonically, hence the
//! iteration cap.

use std::collections::BTreeSet;

use tracing::debug;

use super::UndefinedPolicy;
use crate::consts::DEFAULT_MAX_RESOLVE_ITERATIONS;
use crate::error::{RenderError, Result};

#[derive(Debug, Clone)]
pub struct ResolveOptions {
  /// Lenient rounds allowed before the loop is declared divergent.
  pub max_iterations: usize,
  /// Recipe path used in diagnostics.
  pub origin: String,
}

impl Default for ResolveOptions {
  fn default() -> Self {
    Self {
      max_iterations: DEFAULT_MAX_RESOLVE_ITERATIONS,
      origin: String::new(),
    }
  }
}

/// Run `step` leniently until its unresolved names settle, then once more
/// strictly and return that strict result.
///
/// `step` performs one render-select-parse round and reports the names the
/// render could not resolve.
pub fn resolve_until_fixpoint<T, F>(mut step: F, options: &ResolveOptions) -> Result<T>
where
  F: FnMut(UndefinedPolicy) -> Result<(T, BTreeSet<String>)>,
{
  let mut previous = BTreeSet::new();
  let (_, mut current) = step(UndefinedPolicy::Lenient)?;
  let mut rounds = 1;

  while current != previous {
    if rounds >= options.max_iterations {
      return Err(RenderError::ResolutionDiverged {
        path: options.origin.clone(),
        iterations: rounds,
        names: current.into_iter().collect(),
      });
    }
    debug!(round = rounds, unresolved = current.len(), "template names still changing");
    previous = current;
    let (_, next) = step(UndefinedPolicy::Lenient)?;
    current = next;
    rounds += 1;
  }

  if !current.is_empty() {
    // The strict render fails on the first missing name; the error below
    // reports all of them.
    if let Err(err) = step(UndefinedPolicy::Strict) {
      debug!(error = %err, "strict render failed");
    }
    return Err(RenderError::UnresolvedTemplate {
      path: options.origin.clone(),
      names: current.into_iter().collect(),
    });
  }

  let (value, _) = step(UndefinedPolicy::Strict)?;
  debug!(rounds, origin = %options.origin, "templates resolved");
  Ok(value)
}

//! Template rendering.
//!
//! Rendering is a collaborator behind [`TemplateRenderer`]; the pipeline
//! only needs the rendered text and the names that were referenced but not
//! defined. [`JinjaRenderer`] is the shipped implementation.
//!
//! A [`RenderContext`] carries everything a template may see: the selector
//! namespace, variant values, the hash placeholder, and the pins of sibling
//! outputs for `pin_subpackage`. While a render is in progress the context
//! is in the render phase; [`RenderContext::enter_render`] returns a guard
//! that leaves the phase when dropped.

pub mod jinja;
pub mod resolve;

use std::cell::Cell;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::config::RenderConfig;
use crate::consts::{BUILD_STATE_VAR, PKG_HASH_VAR, RENDER_STATE};
use crate::selector::Namespace;
use crate::variant::VariantAssignment;

pub use jinja::JinjaRenderer;
pub use resolve::{ResolveOptions, resolve_until_fixpoint};

/// How references to undefined names behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefinedPolicy {
  /// Undefined names render as empty and are recorded.
  Lenient,
  /// Undefined names are an error.
  Strict,
}

#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("syntax error: {0}")]
  Syntax(String),

  #[error("undefined value: {0}")]
  Undefined(String),

  #[error("{0}")]
  Render(String),
}

/// Output of one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
  pub text: String,
  /// Names that were looked up but not defined.
  pub unresolved: BTreeSet<String>,
}

pub trait TemplateRenderer {
  fn render(&self, text: &str, ctx: &RenderContext, policy: UndefinedPolicy) -> Result<Rendered, TemplateError>;
}

/// Exact identity of an already-rendered sibling output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubpackagePin {
  pub name: String,
  pub version: String,
  pub build_id: String,
  pub variant: VariantAssignment,
}

impl SubpackagePin {
  /// `name version build` when `exact`, otherwise a lower bound.
  pub fn spec(&self, exact: bool) -> String {
    if exact {
      format!("{} {} {}", self.name, self.version, self.build_id)
    } else {
      format!("{} >={}", self.name, self.version)
    }
  }
}

/// Pin of the sibling output `name`, preferring one rendered for a variant
/// that agrees with `variant`.
pub fn find_pin<'a>(pins: &'a [SubpackagePin], variant: &VariantAssignment, name: &str) -> Option<&'a SubpackagePin> {
  pins
    .iter()
    .filter(|p| p.name == name)
    .find(|p| p.variant.agrees_with(variant))
    .or_else(|| pins.iter().find(|p| p.name == name))
}

/// Values and helpers visible to a template during one render.
#[derive(Debug)]
pub struct RenderContext {
  vars: BTreeMap<String, serde_json::Value>,
  variant: VariantAssignment,
  pins: Vec<SubpackagePin>,
  target_platform: String,
  rendering: Cell<bool>,
}

impl RenderContext {
  pub fn new(ns: &Namespace, variant: &VariantAssignment, config: &RenderConfig) -> Self {
    let mut vars: BTreeMap<String, serde_json::Value> = ns
      .iter()
      .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.clone(), v)))
      .collect();
    for (axis, value) in variant.iter() {
      vars.insert(axis.clone(), serde_json::Value::String(value.clone()));
    }
    vars.insert(PKG_HASH_VAR.to_string(), config.hash_placeholder().into());
    vars.insert("target_platform".to_string(), config.host_subdir.clone().into());

    Self {
      vars,
      variant: variant.clone(),
      pins: Vec::new(),
      target_platform: config.host_subdir.clone(),
      rendering: Cell::new(false),
    }
  }

  pub fn with_pins(mut self, pins: Vec<SubpackagePin>) -> Self {
    self.pins = pins;
    self
  }

  pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
    self.vars.insert(name.into(), value.into());
  }

  /// Variables for the template, including the phase marker when active.
  pub fn variables(&self) -> BTreeMap<String, serde_json::Value> {
    let mut vars = self.vars.clone();
    if self.is_rendering() {
      vars.insert(BUILD_STATE_VAR.to_string(), RENDER_STATE.into());
    }
    vars
  }

  pub fn variant(&self) -> &VariantAssignment {
    &self.variant
  }

  pub fn target_platform(&self) -> &str {
    &self.target_platform
  }

  pub fn pins(&self) -> &[SubpackagePin] {
    &self.pins
  }

  pub fn is_rendering(&self) -> bool {
    self.rendering.get()
  }

  /// Enter the render phase until the returned guard is dropped.
  pub fn enter_render(&self) -> RenderPhase<'_> {
    let previous = self.rendering.replace(true);
    RenderPhase { ctx: self, previous }
  }
}

/// Scope of one render; restores the previous phase on drop.
#[derive(Debug)]
pub struct RenderPhase<'a> {
  ctx: &'a RenderContext,
  previous: bool,
}

impl Drop for RenderPhase<'_> {
  fn drop(&mut self) {
    self.ctx.rendering.set(self.previous);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx() -> RenderContext {
    let config = RenderConfig {
      host_subdir: "linux-64".to_string(),
      ..RenderConfig::default()
    };
    let variant = VariantAssignment::from_pairs([("python", "3.6")]);
    let ns = Namespace::for_render(&config, &variant);
    RenderContext::new(&ns, &variant, &config)
  }

  #[test]
  fn phase_marker_is_scoped() {
    let ctx = ctx();
    assert!(!ctx.variables().contains_key(BUILD_STATE_VAR));
    {
      let _phase = ctx.enter_render();
      assert_eq!(ctx.variables()[BUILD_STATE_VAR], RENDER_STATE);
    }
    assert!(!ctx.is_rendering());
    assert!(!ctx.variables().contains_key(BUILD_STATE_VAR));
  }

  #[test]
  fn phase_is_released_when_render_fails() {
    let ctx = ctx();
    let failing = || -> Result<(), TemplateError> {
      let _phase = ctx.enter_render();
      Err(TemplateError::Render("boom".to_string()))
    };
    assert!(failing().is_err());
    assert!(!ctx.is_rendering());
  }

  #[test]
  fn variant_values_are_strings() {
    let ctx = ctx();
    let vars = ctx.variables();
    assert_eq!(vars["python"], "3.6");
    assert_eq!(vars["py"], 36);
    assert_eq!(vars[PKG_HASH_VAR], "0000000");
    assert_eq!(vars["linux"], true);
  }

  #[test]
  fn pins_prefer_matching_variant() {
    let pin = |py: &str, build: &str| SubpackagePin {
      name: "liba".to_string(),
      version: "1.0".to_string(),
      build_id: build.to_string(),
      variant: VariantAssignment::from_pairs([("python", py)]),
    };
    let ctx = ctx().with_pins(vec![pin("2.7", "py27_0"), pin("3.6", "py36_0")]);
    let found = find_pin(ctx.pins(), ctx.variant(), "liba").unwrap();
    assert_eq!(found.build_id, "py36_0");
    assert_eq!(found.spec(true), "liba 1.0 py36_0");
    assert!(find_pin(ctx.pins(), ctx.variant(), "libb").is_none());

    let other = VariantAssignment::from_pairs([("python", "3.9")]);
    assert_eq!(find_pin(ctx.pins(), &other, "liba").unwrap().build_id, "py27_0");
  }
}

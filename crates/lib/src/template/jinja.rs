//! [`TemplateRenderer`] backed by minijinja.
//!
//! Template variables come from a recording context object: every lookup of
//! a name the context does not define is remembered, which is how lenient
//! renders report their unresolved names.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use minijinja::value::{Enumerator, Kwargs, Object};
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};
use tracing::trace;

use super::{RenderContext, Rendered, SubpackagePin, TemplateError, TemplateRenderer, UndefinedPolicy, find_pin};
use crate::platform::os::Os;
use crate::platform::Platform;

/// Names resolved by the environment rather than the context. Lookups of
/// these reach the context first and must not count as unresolved.
const GLOBAL_NAMES: &[&str] = &["compiler", "pin_subpackage", "range", "dict", "debug", "namespace"];

#[derive(Debug, Default, Clone, Copy)]
pub struct JinjaRenderer;

impl JinjaRenderer {
  pub fn new() -> Self {
    Self
  }
}

#[derive(Debug)]
struct RecordingContext {
  vars: BTreeMap<String, Value>,
  missing: Arc<Mutex<BTreeSet<String>>>,
}

impl Object for RecordingContext {
  fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
    let name = key.as_str()?;
    match self.vars.get(name) {
      Some(value) => Some(value.clone()),
      None => {
        if let Ok(mut missing) = self.missing.lock() {
          missing.insert(name.to_string());
        }
        None
      }
    }
  }

  fn enumerate(self: &Arc<Self>) -> Enumerator {
    Enumerator::Values(self.vars.keys().map(|k| Value::from(k.as_str())).collect())
  }
}

fn default_compiler(lang: &str, os: Os) -> Option<&'static str> {
  let compiler = match (os, lang) {
    (Os::Linux, "c") => "gcc",
    (Os::Linux, "cxx") => "gxx",
    (Os::Osx, "c") => "clang",
    (Os::Osx, "cxx") => "clangxx",
    (Os::Win, "c" | "cxx") => "vs2017",
    (Os::Win, "fortran") => "flang",
    (_, "fortran") => "gfortran",
    _ => return None,
  };
  Some(compiler)
}

/// `compiler('c')` -> `gcc_linux-64`, honoring `c_compiler` and
/// `c_compiler_version` from the variant.
fn compiler_spec(lang: &str, variant: &crate::variant::VariantAssignment, target_platform: &str) -> String {
  let os = Platform::from_subdir(target_platform)
    .map(|p| p.os)
    .unwrap_or(Os::Linux);
  let name = variant
    .get(&format!("{}_compiler", lang))
    .map(str::to_string)
    .or_else(|| default_compiler(lang, os).map(str::to_string))
    .unwrap_or_else(|| lang.to_string());

  let mut spec = format!("{}_{}", name, target_platform);
  if let Some(version) = variant.get(&format!("{}_compiler_version", lang)) {
    spec.push(' ');
    spec.push_str(version);
  }
  spec
}

/// Upper bound for `version` keeping `max_pin` components (`x.x` keeps two).
fn upper_bound(version: &str, max_pin: &str) -> Option<String> {
  let places = max_pin.split('.').count();
  let parts: Vec<&str> = version.split('.').collect();
  if places == 0 || parts.len() < places {
    return None;
  }
  let mut bound: Vec<String> = parts[..places].iter().map(|p| p.to_string()).collect();
  let last = bound.last_mut()?;
  let bumped = last.parse::<u64>().ok()? + 1;
  *last = bumped.to_string();
  Some(bound.join("."))
}

/// Lower bound for `version` keeping `min_pin` components (`x.x` keeps two).
fn lower_bound(version: &str, min_pin: &str) -> String {
  let places = min_pin.split('.').count();
  version.split('.').take(places).collect::<Vec<_>>().join(".")
}

fn pin_spec(pin: &SubpackagePin, exact: bool, min_pin: Option<&str>, max_pin: Option<&str>) -> String {
  if exact {
    return pin.spec(true);
  }
  let lower = match min_pin {
    Some(min_pin) => lower_bound(&pin.version, min_pin),
    None => pin.version.clone(),
  };
  match max_pin.and_then(|m| upper_bound(&pin.version, m)) {
    Some(upper) => format!("{} >={},<{}", pin.name, lower, upper),
    None => format!("{} >={}", pin.name, lower),
  }
}

fn register_helpers(env: &mut Environment<'_>, ctx: &RenderContext) {
  let variant = ctx.variant().clone();
  let target_platform = ctx.target_platform().to_string();
  env.add_function("compiler", move |lang: String| -> Result<String, Error> {
    Ok(compiler_spec(&lang, &variant, &target_platform))
  });

  let pins: Vec<SubpackagePin> = ctx.pins().to_vec();
  let own_variant = ctx.variant().clone();
  env.add_function("pin_subpackage", move |name: String, kwargs: Kwargs| -> Result<String, Error> {
    let exact = kwargs.get::<Option<bool>>("exact")?.unwrap_or(false);
    let max_pin = kwargs.get::<Option<String>>("max_pin")?;
    let min_pin = kwargs.get::<Option<String>>("min_pin")?;
    kwargs.assert_all_used()?;

    Ok(match find_pin(&pins, &own_variant, &name) {
      Some(pin) => pin_spec(pin, exact, min_pin.as_deref(), max_pin.as_deref()),
      // sibling not rendered yet; a later round fills in the pin
      None => name,
    })
  });
}

fn convert_error(err: Error) -> TemplateError {
  let message = err.to_string();
  match err.kind() {
    ErrorKind::SyntaxError => TemplateError::Syntax(message),
    ErrorKind::UndefinedError => TemplateError::Undefined(message),
    _ => TemplateError::Render(message),
  }
}

impl TemplateRenderer for JinjaRenderer {
  fn render(&self, text: &str, ctx: &RenderContext, policy: UndefinedPolicy) -> Result<Rendered, TemplateError> {
    let _phase = ctx.enter_render();

    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(match policy {
      UndefinedPolicy::Lenient => UndefinedBehavior::Chainable,
      UndefinedPolicy::Strict => UndefinedBehavior::Strict,
    });
    register_helpers(&mut env, ctx);

    let missing = Arc::new(Mutex::new(BTreeSet::new()));
    let root = Value::from_object(RecordingContext {
      vars: ctx
        .variables()
        .iter()
        .map(|(k, v)| (k.clone(), Value::from_serialize(v)))
        .collect(),
      missing: Arc::clone(&missing),
    });

    let rendered = env.render_str(text, root).map_err(convert_error)?;

    let unresolved: BTreeSet<String> = missing
      .lock()
      .map(|names| {
        names
          .iter()
          .filter(|n| !GLOBAL_NAMES.contains(&n.as_str()))
          .cloned()
          .collect()
      })
      .unwrap_or_default();
    trace!(?policy, unresolved = unresolved.len(), "rendered template");

    Ok(Rendered {
      text: rendered,
      unresolved,
    })
  }
}

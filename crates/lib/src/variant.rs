//! Variant assignments and the matrix they are drawn from.
//!
//! A [`VariantAssignment`] maps axis names (`python`, `numpy`, ...) to one
//! value each. A [`VariantSupplier`] produces the assignments a recipe is
//! rendered against; [`VariantMatrix`] is the cartesian product of a YAML
//! axis file such as `conda_build_config.yaml`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::selector::{Namespace, select_lines};

/// Axis file keys that configure the matrix rather than name an axis.
const NON_AXIS_KEYS: &[&str] = &["zip_keys", "pin_run_as_build", "extend_keys"];

/// Axis-file key listing build requirements left out of the hash.
const IGNORE_VERSION_KEY: &str = "ignore_version";

/// One point of the variant matrix. Ordering and equality ignore insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantAssignment(BTreeMap<String, String>);

impl VariantAssignment {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }

  pub fn get(&self, axis: &str) -> Option<&str> {
    self.0.get(axis).map(String::as_str)
  }

  pub fn insert(&mut self, axis: impl Into<String>, value: impl Into<String>) {
    self.0.insert(axis.into(), value.into());
  }

  pub fn contains(&self, axis: &str) -> bool {
    self.0.contains_key(axis)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
    self.0.iter()
  }

  pub fn keys(&self) -> impl Iterator<Item = &String> {
    self.0.keys()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// True when every axis present in both assignments has the same value.
  pub fn agrees_with(&self, other: &VariantAssignment) -> bool {
    self
      .0
      .iter()
      .all(|(k, v)| other.0.get(k).is_none_or(|o| o == v))
  }

  /// Restrict to the given axes.
  pub fn subset<'a>(&self, axes: impl IntoIterator<Item = &'a String>) -> Self {
    Self(
      axes
        .into_iter()
        .filter_map(|k| self.0.get(k).map(|v| (k.clone(), v.clone())))
        .collect(),
    )
  }
}

impl fmt::Display for VariantAssignment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    write!(f, "{{{}}}", parts.join(", "))
  }
}

/// Source of the variant assignments a recipe renders against.
pub trait VariantSupplier {
  /// Every assignment to render, in a stable order.
  fn variants(&self) -> Vec<VariantAssignment>;

  /// Axes that take more than one value.
  fn loop_vars(&self) -> Vec<String>;

  /// Build-requirement patterns to leave out of the hash, on top of the
  /// render configuration's own.
  fn ignore_version(&self) -> Vec<String> {
    Vec::new()
  }
}

/// Values of one axis. Scalars count as a single value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AxisValues(Vec<String>);

struct AxisValuesVisitor;

impl<'de> Visitor<'de> for AxisValuesVisitor {
  type Value = AxisValues;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a value or a list of values")
  }

  fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<AxisValues, E> {
    Ok(AxisValues(vec![v.to_string()]))
  }

  fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<AxisValues, E> {
    Ok(AxisValues(vec![v.to_string()]))
  }

  fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<AxisValues, E> {
    Ok(AxisValues(vec![v.to_string()]))
  }

  fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<AxisValues, E> {
    Ok(AxisValues(vec![v.to_string()]))
  }

  fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<AxisValues, E> {
    Ok(AxisValues(vec![v.to_string()]))
  }

  fn visit_unit<E: de::Error>(self) -> std::result::Result<AxisValues, E> {
    Ok(AxisValues::default())
  }

  fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<AxisValues, A::Error> {
    let mut values = Vec::new();
    while let Some(value) = seq.next_element::<Option<String>>()? {
      values.extend(value);
    }
    Ok(AxisValues(values))
  }
}

impl<'de> Deserialize<'de> for AxisValues {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    deserializer.deserialize_any(AxisValuesVisitor)
  }
}

/// The axis file: axis name to values, skipping matrix-configuration keys.
#[derive(Default)]
struct AxisFile {
  axes: BTreeMap<String, Vec<String>>,
  ignore_version: Vec<String>,
}

impl<'de> Deserialize<'de> for AxisFile {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    struct AxisFileVisitor;

    impl<'de> Visitor<'de> for AxisFileVisitor {
      type Value = AxisFile;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of variant axes to values")
      }

      fn visit_unit<E: de::Error>(self) -> std::result::Result<AxisFile, E> {
        Ok(AxisFile::default())
      }

      fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<AxisFile, A::Error> {
        let mut file = AxisFile::default();
        while let Some(key) = map.next_key::<String>()? {
          if key == IGNORE_VERSION_KEY {
            let AxisValues(patterns) = map.next_value()?;
            file.ignore_version = patterns;
            continue;
          }
          if NON_AXIS_KEYS.contains(&key.as_str()) {
            map.next_value::<de::IgnoredAny>()?;
            continue;
          }
          let AxisValues(values) = map.next_value()?;
          if !values.is_empty() {
            file.axes.insert(key, values);
          }
        }
        Ok(file)
      }
    }

    deserializer.deserialize_any(AxisFileVisitor)
  }
}

/// Cartesian product of named axes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantMatrix {
  axes: BTreeMap<String, Vec<String>>,
  ignore_version: Vec<String>,
}

impl VariantMatrix {
  pub fn new() -> Self {
    Self::default()
  }

  /// A matrix holding exactly one assignment.
  pub fn single(assignment: &VariantAssignment) -> Self {
    Self {
      axes: assignment.iter().map(|(k, v)| (k.clone(), vec![v.clone()])).collect(),
      ignore_version: Vec::new(),
    }
  }

  pub fn with_axis<I, S>(mut self, axis: impl Into<String>, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.axes.insert(axis.into(), values.into_iter().map(Into::into).collect());
    self
  }

  /// Load an axis file. Selectors are applied against the host platform
  /// first, so axes may differ per platform.
  pub fn from_file(path: &Path, config: &RenderConfig) -> Result<Self> {
    let text = fs::read_to_string(path).map_err(|e| RenderError::io(path, e))?;
    Self::from_yaml_str(&text, config, &path.display().to_string())
  }

  pub fn from_yaml_str(text: &str, config: &RenderConfig, origin: &str) -> Result<Self> {
    let ns = Namespace::for_render(config, &VariantAssignment::new());
    let selected = select_lines(text, &ns, false, origin)?;
    if selected.trim().is_empty() {
      return Ok(Self::new());
    }
    let AxisFile { axes, ignore_version } = serde_yaml::from_str(&selected).map_err(|e| RenderError::VariantConfig {
      path: origin.to_string(),
      message: e.to_string(),
    })?;
    debug!(origin, axes = axes.len(), ignored = ignore_version.len(), "loaded variant axes");
    Ok(Self { axes, ignore_version })
  }

  /// Leave build requirements matching `pattern` out of the hash.
  pub fn with_ignore_version(mut self, pattern: impl Into<String>) -> Self {
    self.ignore_version.push(pattern.into());
    self
  }

  /// Layer another matrix on top; its axes replace ours and its ignore
  /// patterns add to ours.
  pub fn merged_with(mut self, other: VariantMatrix) -> Self {
    self.axes.extend(other.axes);
    for pattern in other.ignore_version {
      if !self.ignore_version.contains(&pattern) {
        self.ignore_version.push(pattern);
      }
    }
    self
  }

  pub fn axes(&self) -> &BTreeMap<String, Vec<String>> {
    &self.axes
  }
}

impl VariantSupplier for VariantMatrix {
  fn variants(&self) -> Vec<VariantAssignment> {
    let mut combos = vec![VariantAssignment::new()];
    for (axis, values) in &self.axes {
      combos = combos
        .into_iter()
        .flat_map(|combo| {
          values.iter().map(move |value| {
            let mut next = combo.clone();
            next.insert(axis.clone(), value.clone());
            next
          })
        })
        .collect();
    }
    combos
  }

  fn loop_vars(&self) -> Vec<String> {
    self
      .axes
      .iter()
      .filter(|(_, values)| values.len() > 1)
      .map(|(axis, _)| axis.clone())
      .collect()
  }

  fn ignore_version(&self) -> Vec<String> {
    self.ignore_version.clone()
  }
}

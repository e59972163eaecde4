//! Typed recipe document.
//!
//! Every section is its own struct with `deny_unknown_fields`, so an unknown
//! key is reported by the YAML layer with its location. Scalars are kept as
//! the raw text from the recipe; boolean-like fields are interpreted through
//! [`is_true`] when read.

use std::collections::BTreeMap;

use serde::de::{MapAccess, SeqAccess, value::MapAccessDeserializer, value::SeqAccessDeserializer};
use serde::{Deserialize, Deserializer, Serialize};

use super::de::{MapOrSeq, MapOrSeqVisitor, null_default, string_list};

/// YAML 1.1 truthy spellings, compared case-insensitively.
const TRUES: &[&str] = &["y", "on", "true", "yes"];

/// YAML 1.1 falsy spellings, compared case-insensitively.
const FALSES: &[&str] = &["n", "no", "false", "off"];

/// Interpret an optional scalar as a boolean. Absent means `default`.
pub fn parse_bool(value: Option<&str>, default: bool) -> bool {
  match value.map(|v| v.trim().to_ascii_lowercase()) {
    None => default,
    Some(v) if TRUES.contains(&v.as_str()) => true,
    Some(v) if FALSES.contains(&v.as_str()) => false,
    Some(v) => !v.is_empty() && v != "0",
  }
}

/// Absent-is-false shorthand for [`parse_bool`].
pub fn is_true(value: &Option<String>) -> bool {
  parse_bool(value.as_deref(), false)
}

macro_rules! impl_is_empty {
  ($($ty:ty),* $(,)?) => {
    $(
      impl $ty {
        pub fn is_empty(&self) -> bool {
          *self == Self::default()
        }
      }
    )*
  };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

/// One entry of the `source` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
  #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
  pub file_name: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub url: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub md5: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sha1: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sha256: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub git_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub git_tag: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub git_branch: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub git_rev: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub git_depth: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hg_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hg_tag: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub svn_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub svn_rev: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub svn_ignore_externals: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub patches: Vec<String>,
}

/// The `source` section: a single mapping or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SourceSection {
  Single(SourceSpec),
  Multiple(Vec<SourceSpec>),
}

impl SourceSection {
  pub fn specs(&self) -> Vec<&SourceSpec> {
    match self {
      SourceSection::Single(spec) => vec![spec],
      SourceSection::Multiple(specs) => specs.iter().collect(),
    }
  }

  pub fn specs_mut(&mut self) -> Vec<&mut SourceSpec> {
    match self {
      SourceSection::Single(spec) => vec![spec],
      SourceSection::Multiple(specs) => specs.iter_mut().collect(),
    }
  }
}

impl<'de> MapOrSeq<'de> for SourceSection {
  const EXPECTING: &'static str = "a source mapping or a list of source mappings";

  fn from_map<A: MapAccess<'de>>(map: A) -> Result<Self, A::Error> {
    SourceSpec::deserialize(MapAccessDeserializer::new(map)).map(SourceSection::Single)
  }

  fn from_seq<A: SeqAccess<'de>>(seq: A) -> Result<Self, A::Error> {
    Vec::<SourceSpec>::deserialize(SeqAccessDeserializer::new(seq)).map(SourceSection::Multiple)
  }
}

impl<'de> Deserialize<'de> for SourceSection {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    deserializer.deserialize_any(MapOrSeqVisitor::new())
  }
}

/// `run_exports`: a plain list, or `strong`/`weak` lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RunExports {
  List(Vec<String>),
  Split {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    strong: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    weak: Vec<String>,
  },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SplitRunExports {
  #[serde(default, deserialize_with = "string_list")]
  strong: Vec<String>,
  #[serde(default, deserialize_with = "string_list")]
  weak: Vec<String>,
}

impl RunExports {
  /// Every exported spec; `strong` before `weak`.
  pub fn all(&self) -> Vec<&String> {
    match self {
      RunExports::List(specs) => specs.iter().collect(),
      RunExports::Split { strong, weak } => strong.iter().chain(weak).collect(),
    }
  }
}

impl<'de> MapOrSeq<'de> for RunExports {
  const EXPECTING: &'static str = "a list of specs or a mapping with strong/weak lists";

  fn from_map<A: MapAccess<'de>>(map: A) -> Result<Self, A::Error> {
    let split = SplitRunExports::deserialize(MapAccessDeserializer::new(map))?;
    Ok(RunExports::Split {
      strong: split.strong,
      weak: split.weak,
    })
  }

  fn from_seq<A: SeqAccess<'de>>(seq: A) -> Result<Self, A::Error> {
    Vec::<String>::deserialize(SeqAccessDeserializer::new(seq)).map(RunExports::List)
  }

  fn from_scalar<E: serde::de::Error>(value: &str) -> Result<Self, E> {
    Ok(RunExports::List(vec![value.to_string()]))
  }
}

impl<'de> Deserialize<'de> for RunExports {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    deserializer.deserialize_any(MapOrSeqVisitor::new())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub number: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub string: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub entry_points: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub osx_is_app: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub features: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub track_features: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub preserve_egg_dir: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub no_link: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub binary_relocation: Option<serde_yaml::Value>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub script: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub noarch: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub noarch_python: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub has_prefix_files: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub binary_has_prefix_files: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ignore_prefix_files: Option<serde_yaml::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detect_binary_files_with_prefix: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub skip_compile_pyc: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub rpaths: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub script_env: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub always_include_files: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub skip: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub msvc_compiler: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pin_depends: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub include_recipe: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub preferred_env: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub preferred_env_executable_paths: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_exports: Option<RunExports>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub ignore_run_exports: Vec<String>,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
  pub requires_features: BTreeMap<String, String>,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
  pub provides_features: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub disable_pip: Option<String>,
}

impl BuildSection {
  pub fn skip(&self) -> bool {
    is_true(&self.skip)
  }

  /// Whether recipe files feed the dependency hash; defaults to true.
  pub fn include_recipe(&self) -> bool {
    parse_bool(self.include_recipe.as_deref(), true)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Requirements {
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub build: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub host: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub run: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub conflicts: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub run_constrained: Vec<String>,
}

/// Which requirement list to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepEnv {
  Build,
  Host,
  Run,
  RunConstrained,
}

impl DepEnv {
  pub fn as_str(&self) -> &'static str {
    match self {
      DepEnv::Build => "build",
      DepEnv::Host => "host",
      DepEnv::Run => "run",
      DepEnv::RunConstrained => "run_constrained",
    }
  }
}

impl Requirements {
  pub fn get(&self, env: DepEnv) -> &[String] {
    match env {
      DepEnv::Build => &self.build,
      DepEnv::Host => &self.host,
      DepEnv::Run => &self.run,
      DepEnv::RunConstrained => &self.run_constrained,
    }
  }

  pub fn get_mut(&mut self, env: DepEnv) -> &mut Vec<String> {
    match env {
      DepEnv::Build => &mut self.build,
      DepEnv::Host => &mut self.host,
      DepEnv::Run => &mut self.run,
      DepEnv::RunConstrained => &mut self.run_constrained,
    }
  }

  /// Build, host and run requirements, in that order.
  pub fn build_host_run(&self) -> impl Iterator<Item = &String> {
    self.build.iter().chain(&self.host).chain(&self.run)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entry: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cli_opts: Option<serde_yaml::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub own_environment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSection {
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub requires: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub commands: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub files: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub imports: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub source_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AboutSection {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub home: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dev_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub doc_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub doc_source_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub license_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub license: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub license_family: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub license_file: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub readme: Option<String>,
}

/// `requirements` of an output: a mapping, or a bare list used for both
/// build and run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputRequirements {
  List(Vec<String>),
  Map(Requirements),
}

impl OutputRequirements {
  /// Resolve to a full requirement mapping.
  pub fn to_requirements(&self) -> Requirements {
    match self {
      OutputRequirements::Map(reqs) => reqs.clone(),
      OutputRequirements::List(specs) => Requirements {
        build: specs.clone(),
        run: specs.clone(),
        ..Requirements::default()
      },
    }
  }
}

impl<'de> MapOrSeq<'de> for OutputRequirements {
  const EXPECTING: &'static str = "a requirements mapping or a list of specs";

  fn from_map<A: MapAccess<'de>>(map: A) -> Result<Self, A::Error> {
    Requirements::deserialize(MapAccessDeserializer::new(map)).map(OutputRequirements::Map)
  }

  fn from_seq<A: SeqAccess<'de>>(seq: A) -> Result<Self, A::Error> {
    Vec::<String>::deserialize(SeqAccessDeserializer::new(seq)).map(OutputRequirements::List)
  }
}

impl<'de> Deserialize<'de> for OutputRequirements {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    deserializer.deserialize_any(MapOrSeqVisitor::new())
  }
}

/// One output of a recipe, as declared under `outputs` or synthesized from
/// the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDescriptor {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub requirements: Option<OutputRequirements>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub number: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub string: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub noarch: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub noarch_python: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub build: Option<BuildSection>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub script: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub script_interpreter: Option<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub files: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub test: Option<TestSection>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub about: Option<AboutSection>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_exports: Option<RunExports>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub track_features: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub features: Vec<String>,
  #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
  pub entry_points: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<String>,
}

impl OutputDescriptor {
  pub fn name(&self) -> &str {
    self.name.as_deref().unwrap_or_default()
  }

  /// Output type; `conda` when unset.
  pub fn kind(&self) -> &str {
    self.kind.as_deref().unwrap_or(crate::consts::CONDA_OUTPUT_TYPE)
  }

  pub fn is_conda(&self) -> bool {
    self.kind() == crate::consts::CONDA_OUTPUT_TYPE
  }

  /// Canonical JSON of the descriptor; equal descriptors share a key.
  pub fn structural_key(&self) -> String {
    serde_json::to_value(self)
      .map(|v| v.to_string())
      .unwrap_or_else(|_| format!("{:?}", self))
  }
}

/// A parsed recipe. Cloning produces an independent value; documents are
/// never shared mutably between metadata instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeDocument {
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "PackageSection::is_empty")]
  pub package: PackageSection,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<SourceSection>,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BuildSection::is_empty")]
  pub build: BuildSection,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Requirements::is_empty")]
  pub requirements: Requirements,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "AppSection::is_empty")]
  pub app: AppSection,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "TestSection::is_empty")]
  pub test: TestSection,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "AboutSection::is_empty")]
  pub about: AboutSection,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
  pub outputs: Vec<OutputDescriptor>,
  #[serde(default, deserialize_with = "null_default", skip_serializing_if = "serde_yaml::Mapping::is_empty")]
  pub extra: serde_yaml::Mapping,
}

impl_is_empty!(PackageSection, BuildSection, Requirements, AppSection, TestSection, AboutSection);

/// Section names a recipe may contain.
pub const SECTIONS: &[&str] = &[
  "package",
  "source",
  "build",
  "requirements",
  "app",
  "test",
  "about",
  "outputs",
  "extra",
];

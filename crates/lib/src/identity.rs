//! Build identity of a rendered package.
//!
//! The dependency hash covers requirements, the build section minus the
//! fields that may change without changing what is built (number, string,
//! noarch flags), the source section, and the bytes of the recipe's
//! auxiliary files. It is folded into the composed build string to give the
//! build id that names the package file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::consts::{BUILD_STRING_PINS, HASH_INPUT_FILES, HASH_PREFIX, VARIANT_CONFIG_FILENAME};
use crate::error::{RenderError, Result};
use crate::metadata::Metadata;
use crate::recipe::{DepEnv, check_bad_chars, is_true};
use crate::util::hash::{HashError, canonical_json, collect_files, feed_file};

/// Build fields left out of the hash.
const VOLATILE_BUILD_KEYS: &[&str] = &["number", "string", "noarch", "noarch_python"];

const SKIPPED_DIRS: &[&str] = &[".git", ".svn", ".hg", "__pycache__"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildIdentity {
  pub build_string: String,
  pub hash_digest: String,
  pub build_number: u64,
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
  serde_json::to_value(value).map_err(|e| RenderError::Hash(HashError::from(e)))
}

/// Drop nulls, empty strings, and containers left empty.
fn trim_empty(value: &mut Value) {
  match value {
    Value::Object(map) => {
      for v in map.values_mut() {
        trim_empty(v);
      }
      map.retain(|_, v| !is_empty_value(v));
    }
    Value::Array(items) => {
      for v in items.iter_mut() {
        trim_empty(v);
      }
      items.retain(|v| !is_empty_value(v));
    }
    _ => {}
  }
}

fn is_empty_value(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    Value::Array(items) => items.is_empty(),
    Value::Object(map) => map.is_empty(),
    _ => false,
  }
}

/// Start of the first `h` + `len` lowercase hex digits in `s`.
fn find_hash_slot(s: &str, len: usize) -> Option<usize> {
  let bytes = s.as_bytes();
  (0..bytes.len()).find(|&i| {
    bytes[i] == HASH_PREFIX as u8
      && bytes.len() >= i + 1 + len
      && bytes[i + 1..i + 1 + len]
        .iter()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
  })
}

/// Put `hash` into `build_string`: over every existing hash slot, otherwise
/// in front of the trailing build number.
fn inject_hash(build_string: &str, hash: &str, len: usize) -> String {
  if find_hash_slot(build_string, len).is_some() {
    let mut out = String::new();
    let mut rest = build_string;
    while let Some(at) = find_hash_slot(rest, len) {
      out.push_str(&rest[..at]);
      out.push_str(hash);
      rest = &rest[at + 1 + len..];
    }
    out.push_str(rest);
    return out;
  }

  match build_string.rsplit_once('_') {
    Some((head, tail)) if head.parse::<u64>().is_ok() => format!("{}_{}_{}", hash, head, tail),
    Some((head, tail)) => format!("{}{}_{}", head, hash, tail),
    None if build_string.parse::<u64>().is_ok() => format!("{}_{}", hash, build_string),
    None => format!("{}{}", build_string, hash),
  }
}

impl Metadata {
  /// The structured part of the hash input.
  pub fn hash_contents(&self) -> Result<Value> {
    let doc = self.document();
    let ignored = self.config().ignore_patterns()?;

    let mut requirements = doc.requirements.clone();
    requirements.build.retain(|req| !ignored.iter().any(|pattern| pattern.is_match(req.trim())));

    let mut build = match to_json(&doc.build)? {
      Value::Object(map) => map,
      _ => Map::new(),
    };
    for key in VOLATILE_BUILD_KEYS {
      build.remove(*key);
    }

    let mut composite = Map::new();
    composite.insert("requirements".to_string(), to_json(&requirements)?);
    composite.insert("build".to_string(), Value::Object(build));
    if let Some(source) = &doc.source {
      composite.insert("source".to_string(), to_json(source)?);
    }
    let copy_key = serde_yaml::Value::from("copy_test_source_files");
    if let Some(copy) = doc.extra.get(&copy_key) {
      let flag = match copy {
        serde_yaml::Value::Bool(b) => *b,
        serde_yaml::Value::String(s) => is_true(&Some(s.clone())),
        _ => false,
      };
      let mut extra = Map::new();
      extra.insert("copy_test_source_files".to_string(), Value::Bool(flag));
      composite.insert("extra".to_string(), Value::Object(extra));
    }

    let mut composite = Value::Object(composite);
    trim_empty(&mut composite);
    Ok(composite)
  }

  /// Auxiliary files hashed after the structured input, as
  /// `(base directory, sorted relative paths)`.
  pub fn hash_input_files(&self) -> Result<(PathBuf, Vec<String>)> {
    let Some(base) = self.recipe_dir().map(Path::to_path_buf) else {
      return Ok((PathBuf::new(), Vec::new()));
    };
    if !(self.config().include_recipe && self.document().build.include_recipe()) || !base.is_dir() {
      return Ok((base, Vec::new()));
    }

    let recorded = base.join("..").join(HASH_INPUT_FILES);
    let mut files: Vec<String> = if recorded.is_file() {
      let text = fs::read_to_string(&recorded).map_err(|e| RenderError::io(&recorded, e))?;
      text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
    } else if self.parent().is_some() {
      let name = self.raw_name();
      let script = self
        .document()
        .outputs
        .iter()
        .find(|o| o.name() == name)
        .and_then(|o| o.script.clone());
      script
        .into_iter()
        .chain(["build.sh".to_string(), "bld.bat".to_string()])
        .filter(|f| base.join(f).is_file())
        .collect()
    } else {
      let recipe_file = self
        .recipe()
        .map(|r| r.file_name())
        .unwrap_or_default();
      collect_files(&base, |dir| SKIPPED_DIRS.contains(&dir), |file| file.ends_with(".pyc"))?
        .iter()
        .filter_map(|path| path.strip_prefix(&base).ok())
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .filter(|rel| *rel != recipe_file && !rel.starts_with("run_test") && rel.as_str() != VARIANT_CONFIG_FILENAME)
        .collect()
    };
    files.sort();
    files.dedup();
    Ok((base, files))
  }

  /// `h` followed by the first `hash_length` hex digits of the digest.
  pub fn hash_dependencies(&self) -> Result<String> {
    let contents = self.hash_contents()?;
    let (base, files) = self.hash_input_files()?;

    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&contents)?.as_bytes());
    for file in &files {
      feed_file(&mut hasher, &base.join(file))?;
    }
    let digest = hex::encode(hasher.finalize());
    let len = self.config().hash_length.min(digest.len());
    trace!(package = self.raw_name(), files = files.len(), "hashed dependencies");
    Ok(format!("{}{}", HASH_PREFIX, &digest[..len]))
  }

  /// Build string before hashing: runtime pin tokens, features, build
  /// number. An explicit `build/string` is returned as written.
  pub fn build_string(&self) -> Result<String> {
    let doc = self.document();
    if let Some(explicit) = doc.build.string.as_deref().filter(|s| !s.is_empty()) {
      return Ok(explicit.to_string());
    }

    let build_env = if self.is_cross() { DepEnv::Host } else { DepEnv::Build };
    let build_names: Vec<String> = self.ms_depends(build_env)?.into_iter().map(|ms| ms.name).collect();
    let run_names: Vec<String> = self.ms_depends(DepEnv::Run)?.into_iter().map(|ms| ms.name).collect();

    let mut out = String::new();
    for (token, names, places) in BUILD_STRING_PINS {
      let Some(name) = names
        .iter()
        .find(|n| run_names.iter().any(|r| r.as_str() == **n) && build_names.iter().any(|b| b.as_str() == **n))
      else {
        continue;
      };
      if *name == "numpy" && !self.uses_numpy_xx()? {
        continue;
      }
      if self.is_noarch() {
        if self.noarch() == Some(*name) || (self.noarch_python() && *name == "python") {
          out.push_str(token);
        }
        continue;
      }
      let version = names.iter().find_map(|n| self.variant().get(&n.replace('-', "_")));
      if let Some(version) = version {
        out.push_str(token);
        out.extend(version.split('.').take(*places));
      }
    }

    if !out.is_empty() {
      out.push('_');
    }
    if !doc.build.features.is_empty() {
      out.push_str(&doc.build.features.join("_"));
      out.push('_');
    }
    out.push_str(&self.build_number().unwrap_or(0).to_string());
    Ok(out)
  }

  /// The package's build id. A literal `build/string` passes through;
  /// otherwise the composed build string gets the dependency hash once the
  /// metadata is final.
  pub fn build_id(&self) -> Result<String> {
    let explicit = self.document().build.string.as_deref().filter(|s| !s.is_empty());
    let placeholder = format!("{}{}", HASH_PREFIX, self.config().hash_placeholder());
    let has_placeholder = self.uses_hash_placeholder()? || explicit.is_some_and(|s| s.contains(&placeholder));

    if let Some(explicit) = explicit
      && !has_placeholder
    {
      check_bad_chars(explicit, "build/string")?;
      return Ok(explicit.to_string());
    }

    let mut out = self.build_string()?;
    if self.config().filename_hashing && self.is_final() {
      let hash = self.hash_dependencies()?;
      out = inject_hash(&out, &hash, self.config().hash_length);
    }
    check_bad_chars(&out, "build/string")?;
    debug!(package = self.raw_name(), build_id = %out, "computed build id");
    Ok(out)
  }

  pub fn build_identity(&self) -> Result<BuildIdentity> {
    Ok(BuildIdentity {
      build_string: self.build_id()?,
      hash_digest: self.hash_dependencies()?,
      build_number: self.build_number().unwrap_or(0),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RenderConfig;
  use crate::metadata::RecipeFile;
  use crate::recipe::parse_document;
  use crate::template::JinjaRenderer;
  use crate::variant::VariantAssignment;
  use std::sync::Arc;
  use tempfile::TempDir;

  fn config() -> RenderConfig {
    RenderConfig {
      host_subdir: "linux-64".to_string(),
      ..RenderConfig::default()
    }
  }

  fn metadata(text: &str, variant: &[(&str, &str)]) -> Metadata {
    let doc = parse_document(text, "meta.yaml").unwrap();
    Metadata::from_document(doc, Arc::new(config()), VariantAssignment::from_pairs(variant.iter().copied()))
  }

  mod hashing {
    use super::*;

    const BASE: &str = "package:\n  name: foo\n  version: '1.0'\nsource:\n  url: https://example.com/foo.tar.gz\nrequirements:\n  build:\n    - cmake\n  run:\n    - zlib\n";

    #[test]
    fn volatile_build_fields_do_not_change_the_hash() {
      let plain = metadata(BASE, &[]).hash_dependencies().unwrap();
      let bumped = metadata(
        &format!("{}build:\n  number: 7\n  string: custom\n  noarch: generic\n  noarch_python: true\n", BASE),
        &[],
      )
      .hash_dependencies()
      .unwrap();
      assert_eq!(plain, bumped);
      assert_eq!(plain.len(), 8);
      assert!(plain.starts_with('h'));
    }

    #[test]
    fn requirements_change_the_hash() {
      let plain = metadata(BASE, &[]).hash_dependencies().unwrap();
      let changed = metadata(&BASE.replace("zlib", "zlib 1.2"), &[]).hash_dependencies().unwrap();
      assert_ne!(plain, changed);
    }

    #[test]
    fn ignored_build_requirements_are_skipped() {
      let with_cmake = metadata(BASE, &[]);
      let without = metadata(&BASE.replace("    - cmake\n", ""), &[]);
      assert_ne!(
        with_cmake.hash_dependencies().unwrap(),
        without.hash_dependencies().unwrap()
      );

      let config = Arc::new(RenderConfig {
        ignore_version: vec!["cmake".to_string()],
        ..config()
      });
      let ignoring = Metadata::from_document(with_cmake.document().clone(), config, VariantAssignment::new());
      assert_eq!(
        ignoring.hash_dependencies().unwrap(),
        without.hash_dependencies().unwrap()
      );
    }

    #[test]
    fn ignore_patterns_match_by_prefix() {
      let pinned = metadata(&BASE.replace("    - cmake\n", "    - cmake >=3\n"), &[]);
      let newer = metadata(&BASE.replace("    - cmake\n", "    - cmake >=3.12\n"), &[]);
      assert_ne!(pinned.hash_dependencies().unwrap(), newer.hash_dependencies().unwrap());

      let config = Arc::new(RenderConfig {
        ignore_version: vec!["cmak".to_string()],
        ..config()
      });
      let rebind = |m: &Metadata| Metadata::from_document(m.document().clone(), config.clone(), VariantAssignment::new());
      assert_eq!(
        rebind(&pinned).hash_dependencies().unwrap(),
        rebind(&newer).hash_dependencies().unwrap()
      );
    }

    #[test]
    fn hash_contents_drop_volatile_and_empty_fields() {
      let m = metadata(&format!("{}build:\n  number: 1\n", BASE), &[]);
      let contents = m.hash_contents().unwrap();
      assert!(contents.get("build").is_none());
      assert_eq!(contents["requirements"]["run"][0], "zlib");
      assert!(contents["requirements"].get("host").is_none());
      assert_eq!(contents["source"]["url"][0], "https://example.com/foo.tar.gz");
    }

    #[test]
    fn recipe_files_feed_the_hash() {
      let dir = TempDir::new().unwrap();
      fs::write(dir.path().join("meta.yaml"), BASE).unwrap();
      fs::write(dir.path().join("build.sh"), "make").unwrap();
      fs::write(dir.path().join("run_test.sh"), "true").unwrap();
      fs::write(dir.path().join(VARIANT_CONFIG_FILENAME), "python: ['3.6']\n").unwrap();
      fs::create_dir(dir.path().join(".git")).unwrap();
      fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

      let load = || Metadata::load(dir.path(), Arc::new(config()), &JinjaRenderer).unwrap();
      let (_, files) = load().hash_input_files().unwrap();
      assert_eq!(files, vec!["build.sh"]);

      let before = load().hash_dependencies().unwrap();
      fs::write(dir.path().join("run_test.sh"), "false").unwrap();
      assert_eq!(load().hash_dependencies().unwrap(), before);
      fs::write(dir.path().join("build.sh"), "make install").unwrap();
      assert_ne!(load().hash_dependencies().unwrap(), before);
    }

    #[test]
    fn recorded_input_files_win() {
      let root = TempDir::new().unwrap();
      let dir = root.path().join("recipe");
      fs::create_dir(&dir).unwrap();
      fs::write(dir.join("meta.yaml"), BASE).unwrap();
      fs::write(dir.join("build.sh"), "make").unwrap();
      fs::write(dir.join("patch.diff"), "--- a").unwrap();
      fs::write(root.path().join(HASH_INPUT_FILES), "patch.diff\n").unwrap();

      let m = Metadata::load(&dir, Arc::new(config()), &JinjaRenderer).unwrap();
      let (_, files) = m.hash_input_files().unwrap();
      assert_eq!(files, vec!["patch.diff"]);
    }

    #[test]
    fn include_recipe_false_skips_files() {
      let dir = TempDir::new().unwrap();
      fs::write(
        dir.path().join("meta.yaml"),
        format!("{}build:\n  include_recipe: false\n", BASE),
      )
      .unwrap();
      fs::write(dir.path().join("build.sh"), "make").unwrap();
      let m = Metadata::load(dir.path(), Arc::new(config()), &JinjaRenderer).unwrap();
      assert!(m.hash_input_files().unwrap().1.is_empty());
    }

    #[test]
    fn subpackage_hashes_its_script_and_parent_build_files() {
      let dir = TempDir::new().unwrap();
      let text = "package:\n  name: foo\n  version: '1.0'\noutputs:\n  - name: libfoo\n    script: install-lib.sh\n";
      fs::write(dir.path().join("meta.yaml"), text).unwrap();
      fs::write(dir.path().join("install-lib.sh"), "cp lib").unwrap();
      fs::write(dir.path().join("build.sh"), "make").unwrap();
      fs::write(dir.path().join("README"), "docs").unwrap();

      let base = Metadata::load(dir.path(), Arc::new(config()), &JinjaRenderer).unwrap();
      let desc = base.output_descriptors().unwrap().remove(0);
      let out = base.output_metadata(&desc).unwrap();
      let (files_base, files) = out.hash_input_files().unwrap();
      assert_eq!(files_base, dir.path());
      assert_eq!(files, vec!["build.sh", "install-lib.sh"]);
    }
  }

  mod build_string {
    use super::*;

    #[test]
    fn runtime_tokens_in_fixed_order() {
      let m = metadata(
        "package:\n  name: foo\n  version: '1.0'\nbuild:\n  number: 3\nrequirements:\n  build:\n    - python\n    - perl\n  run:\n    - perl\n    - python\n",
        &[("python", "3.6.5"), ("perl", "5.26.2")],
      );
      assert_eq!(m.build_string().unwrap(), "py36pl526_3");
    }

    #[test]
    fn host_is_used_when_cross() {
      let m = metadata(
        "package:\n  name: foo\n  version: '1.0'\nrequirements:\n  build:\n    - cmake\n  host:\n    - python\n  run:\n    - python\n",
        &[("python", "2.7")],
      );
      assert_eq!(m.build_string().unwrap(), "py27_0");
    }

    #[test]
    fn run_only_pins_are_not_tokens() {
      let m = metadata(
        "package:\n  name: foo\n  version: '1.0'\nrequirements:\n  run:\n    - python\n",
        &[("python", "3.6")],
      );
      assert_eq!(m.build_string().unwrap(), "0");
    }

    #[test]
    fn numpy_needs_legacy_pin() {
      let m = metadata(
        "package:\n  name: foo\n  version: '1.0'\nrequirements:\n  build:\n    - numpy\n  run:\n    - numpy\n",
        &[("numpy", "1.11")],
      );
      assert_eq!(m.build_string().unwrap(), "0");
    }

    #[test]
    fn r_base_uses_three_places() {
      let m = metadata(
        "package:\n  name: foo\n  version: '1.0'\nrequirements:\n  build:\n    - r-base\n  run:\n    - r-base\n",
        &[("r_base", "3.4.1")],
      );
      assert_eq!(m.build_string().unwrap(), "r341_0");
    }

    #[test]
    fn noarch_keeps_only_its_axis() {
      let m = metadata(
        "package:\n  name: foo\n  version: '1.0'\nbuild:\n  noarch: python\nrequirements:\n  build:\n    - python\n    - perl\n  run:\n    - python\n    - perl\n",
        &[("python", "3.6"), ("perl", "5.26")],
      );
      assert_eq!(m.build_string().unwrap(), "py_0");
    }

    #[test]
    fn features_follow_tokens() {
      let m = metadata(
        "package:\n  name: foo\n  version: '1.0'\nbuild:\n  number: 1\n  features:\n    - vc14\n    - debug\n",
        &[],
      );
      assert_eq!(m.build_string().unwrap(), "vc14_debug_1");
    }
  }

  mod build_id {
    use super::*;

    #[test]
    fn explicit_string_passes_through() {
      let m = metadata("package:\n  name: foo\n  version: '1.0'\nbuild:\n  string: mine_1\n", &[]).with_final(true);
      assert_eq!(m.build_id().unwrap(), "mine_1");
    }

    #[test]
    fn hash_goes_before_build_number() {
      let m = metadata(
        "package:\n  name: foo\n  version: '1.0'\nrequirements:\n  build:\n    - python\n  run:\n    - python\n",
        &[("python", "3.6")],
      );
      assert_eq!(m.build_id().unwrap(), "py36_0");

      let m = m.with_final(true);
      let hash = m.hash_dependencies().unwrap();
      assert_eq!(m.build_id().unwrap(), format!("py36{}_0", hash));
    }

    #[test]
    fn bare_build_number_gets_leading_hash() {
      let m = metadata("package:\n  name: foo\n  version: '1.0'\n", &[]).with_final(true);
      let hash = m.hash_dependencies().unwrap();
      assert_eq!(m.build_id().unwrap(), format!("{}_0", hash));
    }

    #[test]
    fn placeholder_is_replaced() {
      let recipe = RecipeFile::new(
        "recipe/meta.yaml",
        "package:\n  name: foo\n  version: 1.0\nbuild:\n  string: h{{ PKG_HASH }}_custom\n",
      );
      let m = Metadata::from_recipe(recipe, Arc::new(config()), VariantAssignment::new(), &JinjaRenderer).unwrap();
      assert_eq!(m.build_id().unwrap(), "h0000000_custom");

      let m = m.with_final(true);
      let hash = m.hash_dependencies().unwrap();
      assert_eq!(m.build_id().unwrap(), format!("{}_custom", hash));
    }

    #[test]
    fn no_hash_without_filename_hashing() {
      let doc = parse_document("package:\n  name: foo\n  version: '1.0'\n", "meta.yaml").unwrap();
      let config = Arc::new(RenderConfig {
        filename_hashing: false,
        ..config()
      });
      let m = Metadata::from_document(doc, config, VariantAssignment::new()).with_final(true);
      assert_eq!(m.build_id().unwrap(), "0");
    }

    #[test]
    fn identity_bundles_all_parts() {
      let m = metadata("package:\n  name: foo\n  version: '1.0'\nbuild:\n  number: 4\n", &[]).with_final(true);
      let identity = m.build_identity().unwrap();
      assert_eq!(identity.build_number, 4);
      assert_eq!(identity.build_string, format!("{}_4", identity.hash_digest));
      assert_eq!(m.dist().unwrap(), format!("foo-1.0-{}", identity.build_string));
    }
  }

  #[test]
  fn inject_hash_positions() {
    assert_eq!(inject_hash("py36_0", "habcdef1", 7), "py36habcdef1_0");
    assert_eq!(inject_hash("0", "habcdef1", 7), "habcdef1_0");
    assert_eq!(inject_hash("1_0", "habcdef1", 7), "habcdef1_1_0");
    assert_eq!(inject_hash("custom", "habcdef1", 7), "customhabcdef1");
    assert_eq!(inject_hash("h0000000_2", "habcdef1", 7), "habcdef1_2");
  }
}

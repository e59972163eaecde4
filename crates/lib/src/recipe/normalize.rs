//! Post-parse cleanup of a [`RecipeDocument`].
//!
//! - `git_tag` / `git_branch` fold into `git_rev`
//! - string fields equal to the null marker become absent, and list
//!   entries equal to it are dropped
//! - empty mappings and sequences under `extra` are dropped

use serde_yaml::Value;
use tracing::debug;

use super::types::{
  AboutSection, AppSection, BuildSection, OutputDescriptor, OutputRequirements, PackageSection, RecipeDocument,
  Requirements, RunExports, SourceSpec, TestSection,
};
use crate::consts::NULL_MARKER;
use crate::error::{RenderError, Result};

fn trim(value: &mut Option<String>) {
  if value.as_deref() == Some(NULL_MARKER) {
    *value = None;
  }
}

fn trim_list(values: &mut Vec<String>) {
  values.retain(|v| v.as_str() != NULL_MARKER);
}

/// Free-form values that prune to nothing become absent.
fn trim_value(value: &mut Option<Value>) {
  if let Some(inner) = value.as_mut()
    && !prune_value(inner)
  {
    *value = None;
  }
}

macro_rules! trim_fields {
  ($target:expr; $($field:ident),* $(,)?) => {
    $( trim(&mut $target.$field); )*
  };
}

macro_rules! trim_lists {
  ($target:expr; $($field:ident),* $(,)?) => {
    $( trim_list(&mut $target.$field); )*
  };
}

fn trim_package(p: &mut PackageSection) {
  trim_fields!(p; name, version);
}

fn trim_source(s: &mut SourceSpec) {
  trim_fields!(s;
    file_name, md5, sha1, sha256, path, git_url, git_tag, git_branch, git_rev, git_depth,
    hg_url, hg_tag, svn_url, svn_rev, svn_ignore_externals,
  );
  trim_lists!(s; url, patches);
}

fn trim_requirements(r: &mut Requirements) {
  trim_lists!(r; build, host, run, conflicts, run_constrained);
}

fn trim_test(t: &mut TestSection) {
  trim_lists!(t; requires, commands, files, imports, source_files);
}

fn trim_run_exports(exports: &mut RunExports) {
  match exports {
    RunExports::List(specs) => trim_list(specs),
    RunExports::Split { strong, weak } => {
      trim_list(strong);
      trim_list(weak);
    }
  }
}

fn trim_build(b: &mut BuildSection) {
  trim_fields!(b;
    number, string, osx_is_app, preserve_egg_dir, noarch, noarch_python,
    detect_binary_files_with_prefix, skip, msvc_compiler, pin_depends, include_recipe,
    preferred_env, disable_pip,
  );
  trim_lists!(b;
    entry_points, features, track_features, no_link, script, has_prefix_files, binary_has_prefix_files,
    skip_compile_pyc, rpaths, script_env, always_include_files, preferred_env_executable_paths, ignore_run_exports,
  );
  trim_value(&mut b.binary_relocation);
  trim_value(&mut b.ignore_prefix_files);
  if let Some(exports) = b.run_exports.as_mut() {
    trim_run_exports(exports);
  }
}

fn trim_app(a: &mut AppSection) {
  trim_fields!(a; entry, icon, summary, kind, own_environment);
  trim_value(&mut a.cli_opts);
}

fn trim_about(a: &mut AboutSection) {
  trim_fields!(a;
    home, dev_url, doc_url, doc_source_url, license_url, license, summary, description,
    license_family, readme,
  );
  trim_list(&mut a.license_file);
}

fn trim_output(o: &mut OutputDescriptor) {
  trim_fields!(o; name, kind, version, number, string, noarch, noarch_python, script, script_interpreter, target);
  trim_lists!(o; files, track_features, features, entry_points);
  match o.requirements.as_mut() {
    Some(OutputRequirements::List(specs)) => trim_list(specs),
    Some(OutputRequirements::Map(reqs)) => trim_requirements(reqs),
    None => {}
  }
  if let Some(exports) = o.run_exports.as_mut() {
    trim_run_exports(exports);
  }
  if let Some(test) = o.test.as_mut() {
    trim_test(test);
  }
  if let Some(build) = o.build.as_mut() {
    trim_build(build);
  }
  if let Some(about) = o.about.as_mut() {
    trim_about(about);
  }
}

/// Recursively drop null markers and empty containers from free-form values.
fn prune_value(value: &mut Value) -> bool {
  match value {
    Value::Null => false,
    Value::String(s) => s.as_str() != NULL_MARKER,
    Value::Sequence(items) => {
      items.retain_mut(prune_value);
      !items.is_empty()
    }
    Value::Mapping(map) => {
      let keys: Vec<Value> = map.keys().cloned().collect();
      for key in keys {
        let keep = map.get_mut(&key).is_some_and(prune_value);
        if !keep {
          map.remove(&key);
        }
      }
      !map.is_empty()
    }
    _ => true,
  }
}

/// Fold git alias fields into `git_rev`. More than one of
/// `git_tag`, `git_branch`, `git_rev` is an error.
pub fn fold_git_aliases(spec: &mut SourceSpec) -> Result<()> {
  let set = [&spec.git_tag, &spec.git_branch, &spec.git_rev]
    .iter()
    .filter(|v| v.is_some())
    .count();
  if set > 1 {
    return Err(RenderError::field(
      "source/git_rev",
      "multiple git revisions given (git_tag, git_branch, git_rev); use only one",
    ));
  }
  if let Some(rev) = spec.git_tag.take().or_else(|| spec.git_branch.take()) {
    debug!(rev = %rev, "folding git alias into git_rev");
    spec.git_rev = Some(rev);
  }
  Ok(())
}

/// Apply every cleanup rule in place.
pub fn sanitize(doc: &mut RecipeDocument) -> Result<()> {
  trim_package(&mut doc.package);
  if let Some(source) = doc.source.as_mut() {
    for spec in source.specs_mut() {
      trim_source(spec);
      fold_git_aliases(spec)?;
    }
  }
  trim_build(&mut doc.build);
  trim_requirements(&mut doc.requirements);
  trim_test(&mut doc.test);
  trim_app(&mut doc.app);
  trim_about(&mut doc.about);
  doc.outputs.iter_mut().for_each(trim_output);

  let mut extra = Value::Mapping(std::mem::take(&mut doc.extra));
  prune_value(&mut extra);
  if let Value::Mapping(map) = extra {
    doc.extra = map;
  }
  Ok(())
}

//! Splitting a rendered recipe into the packages it produces.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::{Metadata, ParentRecipe};
use crate::consts::CONDA_OUTPUT_TYPE;
use crate::error::Result;
use crate::recipe::{OutputDescriptor, OutputRequirements, Requirements};
use crate::variant::VariantAssignment;

/// Whether `req` names the package `name`.
fn names_package(req: &str, name: &str) -> bool {
  req
    .strip_prefix(name)
    .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// `name version`, with `.*` appended to plain versions so they match any
/// patch release.
fn versioned_spec(name: &str, version: &str) -> String {
  let plain = !version.is_empty()
    && !version.ends_with('*')
    && version
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
  if plain {
    format!("{} {}.*", name, version)
  } else {
    format!("{} {}", name, version)
  }
}

/// Pin bare requirements to the version chosen by the variant. A `-` in the
/// package name matches `_` in the axis name.
fn insert_variant_versions(reqs: &mut [String], variant: &VariantAssignment) {
  for req in reqs.iter_mut() {
    let name = req.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
      continue;
    }
    if let Some(version) = variant.get(&name.replace('-', "_")) {
      *req = versioned_spec(name, version);
    }
  }
}

impl Metadata {
  fn top_level_output(&self) -> OutputDescriptor {
    let doc = self.document();
    OutputDescriptor {
      name: Some(self.raw_name().to_string()),
      kind: Some(CONDA_OUTPUT_TYPE.to_string()),
      requirements: Some(OutputRequirements::Map(doc.requirements.clone())),
      noarch: doc.build.noarch.clone(),
      noarch_python: doc.build.noarch_python.clone(),
      run_exports: doc.build.run_exports.clone(),
      ..OutputDescriptor::default()
    }
  }

  /// Output descriptors in declaration order. A recipe without `outputs`
  /// produces one descriptor for its top level; a recipe whose run
  /// requirements refer to one of its outputs also produces the top level as
  /// a metapackage unless an output already carries that name.
  pub fn output_descriptors(&self) -> Result<Vec<OutputDescriptor>> {
    let doc = self.document();
    let name = self.raw_name();

    let mut outputs = if doc.outputs.is_empty() {
      vec![self.top_level_output()]
    } else {
      let mut outputs = doc.outputs.clone();
      if self.uses_subpackage()? && !outputs.iter().any(|o| o.name() == name) {
        debug!(package = name, "adding top-level metapackage output");
        outputs.push(self.top_level_output());
      }
      outputs
    };

    for out in outputs.iter_mut() {
      if out.name() == name && out.files.is_empty() && out.script.is_none() {
        if out.requirements.is_none() {
          out.requirements = Some(OutputRequirements::Map(doc.requirements.clone()));
        }
        if out.noarch_python.is_none() {
          out.noarch_python = doc.build.noarch_python.clone();
        }
        if out.noarch.is_none() {
          out.noarch = doc.build.noarch.clone();
        }
      }
    }
    Ok(outputs)
  }

  /// Metadata for one output of this recipe.
  pub fn output_metadata(&self, desc: &OutputDescriptor) -> Result<Metadata> {
    let top_name = self.name()?;
    let out_name = desc
      .name
      .as_deref()
      .filter(|n| !n.is_empty())
      .unwrap_or(&top_name)
      .to_string();
    let is_subpackage = out_name != top_name;
    let mut doc = self.document().clone();

    if is_subpackage {
      doc.package.name = Some(out_name.clone());
      doc.test.commands.clear();
      doc.test.imports.clear();
      doc.build.entry_points = desc.entry_points.clone();
    }
    if !desc.is_conda() {
      doc.package.name = Some(format!("{}_{}", out_name, desc.kind()));
    }

    let declared = desc
      .requirements
      .as_ref()
      .map(OutputRequirements::to_requirements)
      .unwrap_or_default();
    let own = |reqs: Vec<String>| -> Vec<String> {
      reqs
        .into_iter()
        .filter(|req| !names_package(req, &out_name))
        .collect()
    };
    let mut requirements = Requirements {
      build: own(declared.build),
      host: own(declared.host),
      run: own(declared.run),
      conflicts: declared.conflicts,
      run_constrained: declared.run_constrained,
    };
    insert_variant_versions(&mut requirements.build, self.variant());
    insert_variant_versions(&mut requirements.host, self.variant());
    doc.requirements = requirements;

    if desc.version.is_some() {
      doc.package.version = desc.version.clone();
    }

    doc.build.noarch = desc.noarch.clone();
    doc.build.noarch_python = desc.noarch_python.clone();
    if desc.number.is_some() {
      doc.build.number = desc.number.clone();
    }
    if desc.string.is_some() {
      doc.build.string = desc.string.clone();
    }
    if let Some(run_exports) = &desc.run_exports
      && !run_exports.all().is_empty()
    {
      doc.build.run_exports = Some(run_exports.clone());
    }
    if !desc.track_features.is_empty() {
      doc.build.track_features = desc.track_features.clone();
    }
    if !desc.features.is_empty() {
      doc.build.features = desc.features.clone();
    }
    if let Some(build) = &desc.build {
      doc.build = build.clone();
    }
    if let Some(test) = &desc.test {
      doc.test = test.clone();
    }
    if let Some(about) = &desc.about {
      doc.about = about.clone();
    }

    let (recipe, parent) = if is_subpackage {
      let parent = ParentRecipe {
        path: self.recipe_dir().map(|p| p.to_path_buf()).unwrap_or_default(),
        name: top_name.clone(),
        version: self.document().package.version.clone().unwrap_or_default(),
      };
      (None, Some(parent))
    } else {
      (self.recipe.clone(), self.parent.clone())
    };

    trace!(output = %out_name, kind = desc.kind(), variant = %self.variant(), "derived output metadata");
    Ok(Metadata {
      doc,
      recipe,
      parent,
      target_subdir: desc.target.clone().or_else(|| self.target_subdir.clone()),
      is_final: false,
      unresolved: BTreeSet::new(),
      ..self.clone()
    })
  }
}

//! Build identity stability.

use metarender_lib::{RenderConfig, RenderError, VariantMatrix};

use super::common::*;

const RECIPE: &str = r#"
package:
  name: stable
  version: "1.0"
build:
  number: 3
requirements:
  build:
    - cmake
  run:
    - zlib
"#;

fn single_build_id(recipe: &RecipeDir) -> String {
  let outputs = recipe.render(&VariantMatrix::new()).unwrap();
  assert_eq!(outputs.len(), 1);
  outputs[0].metadata.build_id().unwrap()
}

#[test]
fn build_id_is_deterministic() {
  let first = RecipeDir::new(RECIPE);
  let second = RecipeDir::new(RECIPE);
  let id = single_build_id(&first);
  assert_eq!(id, single_build_id(&first));
  assert_eq!(id, single_build_id(&second));
  assert!(id.starts_with('h') && id.ends_with("_3"), "{}", id);
  assert_eq!(id.len(), "h".len() + 7 + "_3".len());
}

#[test]
fn recipe_files_feed_the_hash() {
  let recipe = RecipeDir::new(RECIPE);
  recipe.write("build.sh", "make install\n");
  let before = single_build_id(&recipe);

  recipe.write("build.sh", "make install PREFIX=$PREFIX\n");
  assert_ne!(before, single_build_id(&recipe));
}

#[test]
fn ignored_build_requirements_do_not_feed_the_hash() {
  let plain = RecipeDir::new(RECIPE);
  let changed = RecipeDir::new(&RECIPE.replace("- cmake", "- cmake >=3.12"));
  let ignore = || RenderConfig {
    ignore_version: vec!["cmake".to_string()],
    ..config("linux-64")
  };

  let a = plain.render_with(ignore(), &VariantMatrix::new()).unwrap();
  let b = changed.render_with(ignore(), &VariantMatrix::new()).unwrap();
  assert_eq!(a[0].metadata.build_id().unwrap(), b[0].metadata.build_id().unwrap());

  let a = plain.render(&VariantMatrix::new()).unwrap();
  let b = changed.render(&VariantMatrix::new()).unwrap();
  assert_ne!(a[0].metadata.build_id().unwrap(), b[0].metadata.build_id().unwrap());
}

#[test]
fn hash_length_is_configurable() {
  let recipe = RecipeDir::new(RECIPE);
  let outputs = recipe
    .render_with(
      RenderConfig {
        hash_length: 12,
        ..config("linux-64")
      },
      &VariantMatrix::new(),
    )
    .unwrap();
  let id = outputs[0].metadata.build_id().unwrap();
  assert_eq!(id.len(), 1 + 12 + 2, "{}", id);
}

#[test]
fn explicit_build_string_passes_through() {
  let recipe = RecipeDir::new(&RECIPE.replace("  number: 3\n", "  number: 3\n  string: custom_3\n"));
  assert_eq!(single_build_id(&recipe), "custom_3");
}

#[test]
fn placeholder_outside_build_leaves_explicit_string_alone() {
  let recipe = RecipeDir::new(&format!(
    "{}about:\n  summary: build ids look like h{{{{ PKG_HASH }}}}_0\n",
    RECIPE.replace("  number: 3\n", "  number: 3\n  string: custom_3\n")
  ));
  assert_eq!(single_build_id(&recipe), "custom_3");
}

#[test]
fn placeholder_in_build_string_gets_the_hash() {
  let recipe = RecipeDir::new(&RECIPE.replace("  number: 3\n", "  number: 3\n  string: h{{ PKG_HASH }}_3\n"));
  let id = single_build_id(&recipe);
  assert!(id.starts_with('h') && id.ends_with("_3"), "{}", id);
  assert_ne!(id, "h0000000_3");
  assert_eq!(id.len(), "h".len() + 7 + "_3".len());
}

#[test]
fn ignore_patterns_match_requirement_prefixes() {
  let older = RecipeDir::new(&RECIPE.replace("- cmake", "- cmake >=3"));
  let newer = RecipeDir::new(&RECIPE.replace("- cmake", "- cmake >=3.12"));

  let a = older.render(&VariantMatrix::new()).unwrap();
  let b = newer.render(&VariantMatrix::new()).unwrap();
  assert_ne!(a[0].metadata.build_id().unwrap(), b[0].metadata.build_id().unwrap());

  let prefix = || RenderConfig {
    ignore_version: vec!["cmak".to_string()],
    ..config("linux-64")
  };
  let a = older.render_with(prefix(), &VariantMatrix::new()).unwrap();
  let b = newer.render_with(prefix(), &VariantMatrix::new()).unwrap();
  assert_eq!(a[0].metadata.build_id().unwrap(), b[0].metadata.build_id().unwrap());
}

#[test]
fn axis_file_ignore_version_reaches_the_hash() {
  let older = RecipeDir::new(&RECIPE.replace("- cmake", "- cmake >=3"));
  let newer = RecipeDir::new(&RECIPE.replace("- cmake", "- cmake >=3.12"));
  let axis_file = "ignore_version:\n  - cmake\n";
  let matrix = VariantMatrix::from_yaml_str(axis_file, &config("linux-64"), "conda_build_config.yaml").unwrap();

  let a = older.render(&matrix).unwrap();
  let b = newer.render(&matrix).unwrap();
  assert_eq!(a[0].metadata.build_id().unwrap(), b[0].metadata.build_id().unwrap());
}

#[test]
fn unknown_section_is_a_schema_error() {
  let recipe = RecipeDir::new("package:\n  name: bad\n  version: '1.0'\nbogus:\n  key: value\n");
  let err = recipe.render(&VariantMatrix::new()).unwrap_err();
  assert!(matches!(err, RenderError::Schema { .. }), "{:?}", err);
}

//! Variant expansion and selector evaluation through a full render.

use metarender_lib::VariantMatrix;

use super::common::*;

const PYTHON_RECIPE: &str = r#"
package:
  name: pyfoo
  version: "1.0"
requirements:
  host:
    - python
  run:
    - python
"#;

mod expansion {
  use super::*;

  #[test]
  fn python_variants_give_distinct_build_ids() {
    let recipe = RecipeDir::new(PYTHON_RECIPE);
    let matrix = VariantMatrix::new().with_axis("python", ["2.7", "3.6"]);
    let outputs = recipe.render(&matrix).unwrap();

    let ids = build_ids(&outputs);
    assert_eq!(ids.len(), 2);
    assert!(ids[0].starts_with("py27h") && ids[0].ends_with("_0"), "{}", ids[0]);
    assert!(ids[1].starts_with("py36h") && ids[1].ends_with("_0"), "{}", ids[1]);
    assert_ne!(ids[0][4..], ids[1][4..]);
  }

  #[test]
  fn unused_axes_do_not_multiply_outputs() {
    let recipe = RecipeDir::new("package:\n  name: plain\n  version: '1.0'\n");
    let matrix = VariantMatrix::new()
      .with_axis("python", ["2.7", "3.6"])
      .with_axis("perl", ["5.26"]);
    let outputs = recipe.render(&matrix).unwrap();
    assert_eq!(names(&outputs), vec!["plain"]);
  }

  #[test]
  fn variant_values_reach_templates() {
    let recipe = RecipeDir::new(
      "package:\n  name: tmpl\n  version: {{ version }}\nrequirements:\n  run:\n    - zlib {{ zlib }}\n",
    );
    let matrix = VariantMatrix::new()
      .with_axis("version", ["3.1"])
      .with_axis("zlib", ["1.2.11"]);
    let outputs = recipe.render(&matrix).unwrap();
    let m = &outputs[0].metadata;
    assert_eq!(m.version().unwrap(), "3.1");
    assert_eq!(m.document().requirements.run, vec!["zlib 1.2.11"]);
  }
}

mod selectors {
  use super::*;

  const SELECTED: &str = r#"
package:
  name: sel
  version: "1.0"
requirements:
  run:
    - libposix     # [unix]
    - vc           # [win]
    - py3only      # [py3k]
"#;

  #[test]
  fn linux_selects_unix_lines() {
    let recipe = RecipeDir::new(SELECTED);
    let matrix = VariantMatrix::new().with_axis("python", ["2.7"]);
    let outputs = recipe.render(&matrix).unwrap();
    assert_eq!(outputs[0].metadata.document().requirements.run, vec!["libposix"]);
  }

  #[test]
  fn windows_and_python3_select_their_lines() {
    let recipe = RecipeDir::new(SELECTED);
    let matrix = VariantMatrix::new().with_axis("python", ["3.6"]);
    let outputs = recipe.render_with(config("win-64"), &matrix).unwrap();
    assert_eq!(outputs[0].metadata.document().requirements.run, vec!["vc", "py3only"]);
    assert_eq!(outputs[0].metadata.target_subdir(), "win-64");
  }
}

mod null_markers {
  use super::*;

  #[test]
  fn none_entries_are_dropped_from_requirement_lists() {
    let recipe = RecipeDir::new(
      "package:\n  name: nulls\n  version: '1.0'\nrequirements:\n  build:\n    - None\n  run:\n    - zlib\n    - None\ntest:\n  requires:\n    - None\n",
    );
    let outputs = recipe.render(&VariantMatrix::new()).unwrap();
    let doc = outputs[0].metadata.document();
    assert_eq!(doc.requirements.run, vec!["zlib"]);
    assert!(doc.requirements.build.is_empty());
    assert!(doc.test.requires.is_empty());
  }
}

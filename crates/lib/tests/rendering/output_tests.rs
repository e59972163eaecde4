//! Output ordering, cycle detection and exact-pin consistency.

use metarender_lib::{RenderError, VariantMatrix};

use super::common::*;

#[test]
fn outputs_are_ordered_by_run_dependencies() {
  let recipe = RecipeDir::new(
    r#"
package:
  name: chain
  version: "1.0"
outputs:
  - name: pkgc
    requirements:
      run:
        - pkgb
  - name: pkgb
    requirements:
      run:
        - pkga >=1.0
  - name: pkga
"#,
  );
  let outputs = recipe.render(&VariantMatrix::new()).unwrap();
  assert_eq!(names(&outputs), vec!["pkga", "pkgb", "pkgc"]);
  assert!(outputs.iter().all(|o| o.metadata.is_final()));
}

#[test]
fn mutual_dependency_is_a_circular_error() {
  let recipe = RecipeDir::new(
    r#"
package:
  name: loop
  version: "1.0"
outputs:
  - name: pkga
    requirements:
      run:
        - pkgb
  - name: pkgb
    requirements:
      host:
        - pkga
"#,
  );
  let err = recipe.render(&VariantMatrix::new()).unwrap_err();
  assert!(matches!(err, RenderError::CircularDependency { .. }));
  assert!(err.to_string().contains("pkga <-> pkgb"), "{}", err);
}

#[test]
fn exact_pin_to_a_sibling_matches_its_build_id() {
  let recipe = RecipeDir::new(
    r#"
package:
  name: split
  version: "2.0"
outputs:
  - name: libsplit
    script: install_lib.sh
  - name: split-tools
    script: install_tools.sh
    requirements:
      run:
        - {{ pin_subpackage('libsplit', exact=True) }}
"#,
  );
  let outputs = recipe.render(&VariantMatrix::new()).unwrap();
  assert_eq!(names(&outputs), vec!["libsplit", "split-tools"]);

  let lib_id = outputs[0].metadata.build_id().unwrap();
  assert_eq!(
    outputs[1].metadata.document().requirements.run,
    vec![format!("libsplit 2.0 {}", lib_id)]
  );
}

#[test]
fn stale_exact_pin_is_a_hash_mismatch() {
  let recipe = RecipeDir::new(
    r#"
package:
  name: stale
  version: "1.0"
outputs:
  - name: pkga
    script: a.sh
  - name: pkgb
    script: b.sh
    requirements:
      run:
        - pkga 1.0 h0123456_0
"#,
  );
  let err = recipe.render(&VariantMatrix::new()).unwrap_err();
  match err {
    RenderError::HashMismatch { pairs } => {
      assert_eq!(pairs, vec![("pkga".to_string(), "pkgb".to_string())]);
    }
    other => panic!("unexpected {:?}", other),
  }
}

#[test]
fn subpackage_reference_adds_metapackage() {
  let recipe = RecipeDir::new(
    r#"
package:
  name: meta
  version: "1.0"
requirements:
  run:
    - libmeta
outputs:
  - name: libmeta
    script: install.sh
"#,
  );
  let outputs = recipe.render(&VariantMatrix::new()).unwrap();
  assert_eq!(names(&outputs), vec!["libmeta", "meta"]);
  assert_eq!(outputs[1].metadata.document().requirements.run, vec!["libmeta"]);
}

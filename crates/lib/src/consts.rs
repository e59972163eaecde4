//! Shared constants for recipe rendering.

/// File name of a recipe inside a recipe directory.
pub const RECIPE_FILENAME: &str = "meta.yaml";

/// Alternate recipe file name accepted when `meta.yaml` is absent.
pub const ALT_RECIPE_FILENAME: &str = "conda.yaml";

/// Variant axis file that lives next to a recipe.
pub const VARIANT_CONFIG_FILENAME: &str = "conda_build_config.yaml";

/// Recorded list of hash input files, relative to the recipe directory's parent.
pub const HASH_INPUT_FILES: &str = "hash_input_files";

/// Extra sections merged into every rendered recipe when present.
pub const RECIPE_APPEND_FILENAME: &str = "recipe_append.yaml";

/// Sections that replace rendered recipe sections when present.
pub const RECIPE_CLOBBER_FILENAME: &str = "recipe_clobber.yaml";

/// Plain-text run requirements used when a recipe declares none.
pub const REQUIREMENTS_TXT: &str = "requirements.txt";

/// Number of hex digits kept from the dependency digest.
pub const DEFAULT_HASH_LENGTH: usize = 7;

/// Marker character prepended to a truncated digest.
pub const HASH_PREFIX: char = 'h';

/// String value treated as an absent field after rendering.
pub const NULL_MARKER: &str = "None";

/// Template variable holding the hash placeholder during rendering.
pub const PKG_HASH_VAR: &str = "PKG_HASH";

/// Template variable exposing the render phase.
pub const BUILD_STATE_VAR: &str = "CONDA_BUILD_STATE";

/// Value of [`BUILD_STATE_VAR`] while a render is in progress.
pub const RENDER_STATE: &str = "RENDER";

/// Upper bound on lenient render rounds before giving up on a fixpoint.
pub const DEFAULT_MAX_RESOLVE_ITERATIONS: usize = 10;

/// Number of re-derivation rounds run over the output set.
pub const FINALIZE_ROUNDS: usize = 3;

/// Output type of a regular package.
pub const CONDA_OUTPUT_TYPE: &str = "conda";

/// Output type of a python wheel.
pub const WHEEL_OUTPUT_TYPE: &str = "wheel";

/// Characters never allowed in names, versions and build strings.
pub const BAD_CHARS: &str = "=@#$%^&*:;\"'\\|<>?/ ";

/// Characters never allowed in dependency names.
pub const BAD_DEP_CHARS: &str = "=!@#$%^&*:;\"'\\|<>?/";

/// Version operators that must be attached to the version they qualify.
pub const VERSION_OPERATORS: &[&str] = &["<", ">", "=", "<=", ">=", "==", "!=", "~="];

/// Runtime pins folded into the build string: `(token, package names, version places)`.
pub const BUILD_STRING_PINS: &[(&str, &[&str], usize)] = &[
  ("np", &["numpy"], 2),
  ("py", &["python"], 2),
  ("pl", &["perl"], 2),
  ("lua", &["lua"], 2),
  ("r", &["r", "r-base"], 3),
];

/// Runtime versions assumed when the variant does not name one.
pub const DEFAULT_VARIANT_VERSIONS: &[(&str, &str)] = &[
  ("python", "3.6"),
  ("numpy", "1.11"),
  ("perl", "5.22.2"),
  ("lua", "5"),
  ("r_base", "3.4"),
];

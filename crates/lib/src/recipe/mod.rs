//! Recipe documents: typed sections, parsing, cleanup and validation.

pub(crate) mod de;
pub mod merge;
pub mod normalize;
pub mod parse;
pub mod types;
pub mod validate;

pub use merge::{MergeMode, merge_sections};
pub use parse::{parse_document, parse_recipe_text};
pub use types::{
  AboutSection, AppSection, BuildSection, DepEnv, OutputDescriptor, OutputRequirements, PackageSection,
  RecipeDocument, Requirements, RunExports, SourceSection, SourceSpec, TestSection, is_true, parse_bool,
};
pub use validate::{MatchSpec, check_bad_chars, check_dependency};

//! metarender-lib: Rendering of conda-style package recipes
//!
//! This crate turns a `meta.yaml` recipe into fully resolved package
//! descriptors:
//! - `selector`: line-level `# [expr]` conditions
//! - `template`: template rendering driven to a fixpoint
//! - `recipe`: the typed, validated recipe document
//! - `metadata`: one recipe bound to one variant, and its outputs
//! - `identity`: content hashes and build strings
//! - `graph` / `finalize`: output ordering, cycles and sibling pins
//! - `render`: the whole pipeline across a variant matrix

pub mod config;
pub mod consts;
pub mod error;
pub mod finalize;
pub mod graph;
pub mod identity;
pub mod metadata;
pub mod platform;
pub mod recipe;
pub mod render;
pub mod selector;
pub mod source;
pub mod template;
pub mod util;
pub mod variant;

pub use config::RenderConfig;
pub use error::{RenderError, Result};
pub use metadata::Metadata;
pub use render::{Collaborators, RenderOptions, RenderedOutput, render_recipe};
pub use variant::{VariantAssignment, VariantMatrix, VariantSupplier};

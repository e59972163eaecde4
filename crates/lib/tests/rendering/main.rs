//! End-to-end rendering tests against recipes written to temporary
//! directories.

mod common;
mod hash_tests;
mod output_tests;
mod variant_tests;

use std::collections::BTreeMap;

use anyhow::Result;

use metarender_lib::selector::Namespace;
use metarender_lib::{RenderConfig, VariantAssignment};

use super::apply_subdir;
use crate::output::{OutputFormat, print_info, print_json, print_stat};

pub fn cmd_info(subdir: Option<&str>, format: OutputFormat) -> Result<()> {
  let mut config = RenderConfig::default();
  apply_subdir(&mut config, subdir)?;
  let ns = Namespace::for_render(&config, &VariantAssignment::new());

  if format.is_json() {
    let names: BTreeMap<_, _> = ns.iter().collect();
    print_json(&serde_json::json!({ "subdir": config.host_subdir, "namespace": names }))?;
    return Ok(());
  }

  print_info(&format!("Subdir: {}", config.host_subdir));
  println!();
  println!("Selector namespace:");
  for (name, value) in ns.iter() {
    print_stat(name, &serde_json::to_string(value)?);
  }
  Ok(())
}

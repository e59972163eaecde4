mod info;
mod render;

use anyhow::{Result, bail};
use metarender_lib::RenderConfig;
use metarender_lib::platform::Platform;

pub use info::cmd_info;
pub use render::{RenderArgs, cmd_render};

/// Apply a `--subdir` override, rejecting subdirs that name no platform.
fn apply_subdir(config: &mut RenderConfig, subdir: Option<&str>) -> Result<()> {
  if let Some(subdir) = subdir {
    if Platform::from_subdir(subdir).is_none() {
      bail!("Unknown subdir '{}', expected e.g. linux-64 or osx-arm64", subdir);
    }
    config.host_subdir = subdir.to_string();
  }
  Ok(())
}

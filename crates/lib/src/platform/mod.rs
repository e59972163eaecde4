//! Host platform identification in package-subdir form (`linux-64`, `osx-arm64`).

pub mod arch;
pub mod os;

use arch::Arch;
use os::Os;
use std::fmt;

/// Subdir used when the running platform has no package subdir.
pub const FALLBACK_SUBDIR: &str = "linux-64";

/// Platform identifier combining OS and architecture (e.g., "linux-64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub os: Os,
  pub arch: Arch,
}

impl Platform {
  pub fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture has no subdir
  pub fn current() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Arch::current()?,
    })
  }

  /// Parse a subdir string such as `linux-64` or `osx-arm64`.
  pub fn from_subdir(subdir: &str) -> Option<Self> {
    let (os, arch) = subdir.split_once('-')?;
    Some(Self {
      os: Os::from_subdir_part(os)?,
      arch: Arch::from_subdir_part(arch)?,
    })
  }

  /// Returns the subdir string (e.g., "linux-64")
  pub fn subdir(&self) -> String {
    format!("{}-{}", self.os, self.arch)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.subdir())
  }
}

/// Returns the subdir for the current system, or [`FALLBACK_SUBDIR`].
pub fn host_subdir() -> String {
  Platform::current()
    .map(|p| p.subdir())
    .unwrap_or_else(|| FALLBACK_SUBDIR.to_string())
}

use std::fmt;

/// Operating system families that have a package subdir.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  Osx,
  Win,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::Osx),
      "windows" => Some(Self::Win),
      _ => None,
    }
  }

  pub fn from_subdir_part(part: &str) -> Option<Self> {
    match part {
      "linux" => Some(Self::Linux),
      "osx" => Some(Self::Osx),
      "win" => Some(Self::Win),
      _ => None,
    }
  }

  /// Returns the identifier used in subdir strings
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::Osx => "osx",
      Self::Win => "win",
    }
  }

  pub fn is_unix(&self) -> bool {
    matches!(self, Self::Linux | Self::Osx)
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

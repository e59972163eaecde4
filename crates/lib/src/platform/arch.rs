use std::fmt;

/// CPU architectures that have a package subdir.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86,
  X86_64,
  Aarch64,
  Arm64,
  Armv6l,
  Armv7l,
  Ppc64le,
  S390x,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86" => Some(Self::X86),
      "x86_64" => Some(Self::X86_64),
      "aarch64" if cfg!(target_os = "macos") => Some(Self::Arm64),
      "aarch64" => Some(Self::Aarch64),
      "arm" => Some(Self::Armv7l),
      "powerpc64" => Some(Self::Ppc64le),
      "s390x" => Some(Self::S390x),
      _ => None,
    }
  }

  /// Parse the architecture half of a subdir such as `64` or `aarch64`.
  pub fn from_subdir_part(part: &str) -> Option<Self> {
    match part {
      "32" => Some(Self::X86),
      "64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      "arm64" => Some(Self::Arm64),
      "armv6l" => Some(Self::Armv6l),
      "armv7l" => Some(Self::Armv7l),
      "ppc64le" => Some(Self::Ppc64le),
      "s390x" => Some(Self::S390x),
      _ => None,
    }
  }

  /// Returns the identifier used in subdir strings
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86 => "32",
      Self::X86_64 => "64",
      Self::Aarch64 => "aarch64",
      Self::Arm64 => "arm64",
      Self::Armv6l => "armv6l",
      Self::Armv7l => "armv7l",
      Self::Ppc64le => "ppc64le",
      Self::S390x => "s390x",
    }
  }

  pub fn bits(&self) -> u32 {
    match self {
      Self::X86 | Self::Armv6l | Self::Armv7l => 32,
      _ => 64,
    }
  }

  /// Intel-family architectures.
  pub fn is_x86(&self) -> bool {
    matches!(self, Self::X86 | Self::X86_64)
  }

  pub fn is_arm(&self) -> bool {
    matches!(self, Self::Aarch64 | Self::Arm64 | Self::Armv6l | Self::Armv7l)
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn subdir_parts_round_trip() {
    for part in ["32", "64", "aarch64", "arm64", "armv6l", "armv7l", "ppc64le", "s390x"] {
      let arch = Arch::from_subdir_part(part).unwrap();
      assert_eq!(arch.as_str(), part);
    }
    assert!(Arch::from_subdir_part("mips").is_none());
  }

  #[test]
  fn bit_width() {
    assert_eq!(Arch::X86.bits(), 32);
    assert_eq!(Arch::Armv7l.bits(), 32);
    assert_eq!(Arch::Aarch64.bits(), 64);
  }
}

//! Hashing primitives for build identity.
//!
//! - `hash_file()` / `hash_bytes()`: full SHA-256 of one input
//! - `feed_file()`: stream a file's bytes into a running digest
//! - `canonical_json()`: key-sorted JSON used as hash input
//! - `collect_files()`: sorted recipe-directory listing

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A full 64-character SHA-256 hash, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to serialize hash input: {0}")]
  Serialize(#[from] serde_json::Error),
}

fn read_error(path: &Path, e: std::io::Error) -> HashError {
  HashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  }
}

/// Feed the bytes of `path` into `hasher`.
pub fn feed_file(hasher: &mut Sha256, path: &Path) -> Result<(), HashError> {
  let mut file = fs::File::open(path).map_err(|e| read_error(path, e))?;
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| read_error(path, e))?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }
  Ok(())
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let mut hasher = Sha256::new();
  feed_file(&mut hasher, path)?;
  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Serialize with object keys in sorted order.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, HashError> {
  // `serde_json::Value` maps are ordered by key.
  let value = serde_json::to_value(value)?;
  Ok(serde_json::to_string(&value)?)
}

/// Every regular file below `root`, sorted by path. Directories for which
/// `skip_dir` returns true are not entered; files for which `skip_file`
/// returns true are left out.
pub fn collect_files(
  root: &Path,
  skip_dir: impl Fn(&str) -> bool,
  skip_file: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>, HashError> {
  let mut files = Vec::new();

  let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| {
    if e.depth() == 0 || !e.file_type().is_dir() {
      return true;
    }
    e.file_name().to_str().map(|name| !skip_dir(name)).unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(|e| HashError::WalkDir { message: e.to_string() })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let name = entry.file_name().to_string_lossy();
    if skip_file(&name) {
      continue;
    }
    files.push(entry.into_path());
  }

  files.sort();
  Ok(files)
}

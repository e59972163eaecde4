//! The repository index entry of a rendered package.

use std::collections::BTreeMap;

use serde::Serialize;

use super::Metadata;
use crate::error::Result;
use crate::platform::Platform;
use crate::platform::arch::Arch;
use crate::recipe::DepEnv;
use crate::util::hash::hash_file;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecord {
  pub name: String,
  pub version: String,
  pub build: String,
  pub build_number: u64,
  pub depends: Vec<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub constrains: Vec<String>,
  pub subdir: String,
  pub arch: Option<String>,
  pub platform: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub license: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub license_family: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub features: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub track_features: Option<String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub provides_features: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub requires_features: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub noarch: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub preferred_env: Option<String>,
  #[serde(flatten)]
  pub app: Option<AppRecord>,
}

/// Index fields of packages that declare `app/entry`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppRecord {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  pub app_entry: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub app_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub app_cli_opts: Option<serde_yaml::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub app_own_environment: Option<String>,
}

fn index_arch(arch: Arch) -> String {
  match arch {
    Arch::X86 => "x86".to_string(),
    Arch::X86_64 => "x86_64".to_string(),
    other => other.as_str().to_string(),
  }
}

fn joined(values: &[String]) -> Option<String> {
  (!values.is_empty()).then(|| values.join(" "))
}

impl Metadata {
  fn app_record(&self) -> Result<Option<AppRecord>> {
    let app = &self.document().app;
    let Some(entry) = app.entry.clone() else {
      return Ok(None);
    };
    let icon = match (&app.icon, self.recipe_dir()) {
      (Some(icon), Some(dir)) => Some(format!("{}.png", hash_file(&dir.join(icon))?)),
      _ => None,
    };
    Ok(Some(AppRecord {
      kind: "app".to_string(),
      icon,
      app_entry: entry,
      app_type: app.kind.clone(),
      app_cli_opts: app.cli_opts.clone(),
      summary: app.summary.clone(),
      app_own_environment: app.own_environment.clone(),
    }))
  }

  /// Index entry for this package. Needs final metadata for a hashed build.
  pub fn index_record(&self) -> Result<IndexRecord> {
    let doc = self.document();
    let subdir = self.target_subdir();
    let platform = Platform::from_subdir(&subdir);

    let mut depends: Vec<String> = self
      .ms_depends(DepEnv::Run)?
      .iter()
      .map(|ms| ms.to_string())
      .collect();
    depends.sort();

    let noarch = self.is_noarch();
    Ok(IndexRecord {
      name: self.name()?,
      version: self.version()?,
      build: self.build_id()?,
      build_number: self.build_number().unwrap_or(0),
      depends,
      constrains: doc
        .requirements
        .run_constrained
        .iter()
        .filter(|c| !c.is_empty())
        .cloned()
        .collect(),
      arch: platform.filter(|_| !noarch).map(|p| index_arch(p.arch)),
      platform: platform.filter(|_| !noarch).map(|p| p.os.to_string()),
      subdir,
      license: doc.about.license.clone(),
      license_family: doc.about.license_family.clone(),
      features: joined(&doc.build.features),
      track_features: joined(&doc.build.track_features),
      provides_features: doc.build.provides_features.clone(),
      requires_features: doc.build.requires_features.clone(),
      noarch: if noarch { self.noarch().map(str::to_string) } else { None },
      preferred_env: doc.build.preferred_env.clone(),
      app: self.app_record()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::super::testutil::metadata_from;

  #[test]
  fn record_for_linux_package() {
    let m = metadata_from(
      "package:\n  name: foo\n  version: '1.0'\nbuild:\n  number: 3\n  string: custom_3\n  track_features:\n    - fast\nrequirements:\n  run:\n    - zlib\n    - python >=3\n  run_constrained:\n    - openssl >=1.1\nabout:\n  license: MIT\n",
    )
    .with_final(true);
    let record = m.index_record().unwrap();
    assert_eq!(record.name, "foo");
    assert_eq!(record.build, "custom_3");
    assert_eq!(record.build_number, 3);
    assert_eq!(record.depends, vec!["python >=3", "zlib"]);
    assert_eq!(record.constrains, vec!["openssl >=1.1"]);
    assert_eq!(record.subdir, "linux-64");
    assert_eq!(record.arch.as_deref(), Some("x86_64"));
    assert_eq!(record.platform.as_deref(), Some("linux"));
    assert_eq!(record.track_features.as_deref(), Some("fast"));
    assert_eq!(record.license.as_deref(), Some("MIT"));
    assert!(record.app.is_none());
  }

  #[test]
  fn noarch_record_has_no_platform() {
    let m = metadata_from("package:\n  name: foo\n  version: '1.0'\nbuild:\n  noarch: python\n  string: py_0\n")
      .with_final(true);
    let record = m.index_record().unwrap();
    assert_eq!(record.subdir, "noarch");
    assert_eq!(record.arch, None);
    assert_eq!(record.platform, None);
    assert_eq!(record.noarch.as_deref(), Some("python"));

    let json = serde_json::to_value(&record).unwrap();
    assert!(json["arch"].is_null());
    assert!(json.get("constrains").is_none());
  }

  #[test]
  fn app_fields_are_flattened() {
    let m = metadata_from(
      "package:\n  name: foo\n  version: '1.0'\nbuild:\n  string: app_0\napp:\n  entry: foo-gui\n  summary: Foo\n",
    )
    .with_final(true);
    let json = serde_json::to_value(m.index_record().unwrap()).unwrap();
    assert_eq!(json["type"], "app");
    assert_eq!(json["app_entry"], "foo-gui");
    assert_eq!(json["summary"], "Foo");
  }
}

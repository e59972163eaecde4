//! The closed namespace selector expressions are evaluated against.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::RenderConfig;
use crate::consts::DEFAULT_VARIANT_VERSIONS;
use crate::platform::arch::Arch;
use crate::platform::os::Os;
use crate::variant::VariantAssignment;

/// Linux machines that get their own selector flag.
const NON_X86_LINUX_MACHINES: &[Arch] = &[Arch::Armv6l, Arch::Armv7l, Arch::Aarch64, Arch::Ppc64le, Arch::S390x];

/// Runtime versions that get a `pyXY` flag.
const PY_FLAGS: &[i64] = &[26, 27, 33, 34, 35, 36];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Int(i64),
  Str(String),
  List(Vec<Value>),
  None,
}

impl Value {
  pub fn truthy(&self) -> bool {
    match self {
      Value::Bool(b) => *b,
      Value::Int(i) => *i != 0,
      Value::Str(s) => !s.is_empty(),
      Value::List(items) => !items.is_empty(),
      Value::None => false,
    }
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Str(_) => "str",
      Value::List(_) => "tuple",
      Value::None => "None",
    }
  }

  /// Numeric view; booleans count as 0 and 1.
  fn as_int(&self) -> Option<i64> {
    match self {
      Value::Bool(b) => Some(i64::from(*b)),
      Value::Int(i) => Some(*i),
      _ => None,
    }
  }

  /// Equality where `True == 1` and `False == 0`.
  pub fn loose_eq(&self, other: &Value) -> bool {
    match (self.as_int(), other.as_int()) {
      (Some(a), Some(b)) => a == b,
      _ => self == other,
    }
  }

  /// Ordering between values of compatible types.
  pub fn partial_order(&self, other: &Value) -> Option<Ordering> {
    match (self, other) {
      (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
      (Value::List(a), Value::List(b)) => {
        for (x, y) in a.iter().zip(b) {
          match x.partial_order(y)? {
            Ordering::Equal => continue,
            ord => return Some(ord),
          }
        }
        Some(a.len().cmp(&b.len()))
      }
      _ => Some(self.as_int()?.cmp(&other.as_int()?)),
    }
  }

  /// Integer when the text parses as one, otherwise the text itself.
  pub fn coerce(text: &str) -> Value {
    text
      .parse::<i64>()
      .map(Value::Int)
      .unwrap_or_else(|_| Value::Str(text.to_string()))
  }
}

/// Identifier table for selectors and the base of the template context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Namespace {
  values: BTreeMap<String, Value>,
}

impl Namespace {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, name: impl Into<String>, value: Value) {
    self.values.insert(name.into(), value);
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.values.contains_key(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
    self.values.iter()
  }

  /// Platform flags, runtime shorthands and the variant entries for one
  /// render.
  pub fn for_render(config: &RenderConfig, variant: &VariantAssignment) -> Self {
    let platform = config.platform();
    let (os, arch) = (platform.os, platform.arch);
    let linux = os == Os::Linux;
    let win = os == Os::Win;

    let mut ns = Self::new();
    let flags = [
      ("linux", linux),
      ("linux32", linux && arch.bits() == 32),
      ("linux64", linux && arch.bits() == 64),
      ("arm", linux && matches!(arch, Arch::Armv6l | Arch::Armv7l)),
      ("osx", os == Os::Osx),
      ("unix", os.is_unix()),
      ("win", win),
      ("win32", win && arch.bits() == 32),
      ("win64", win && arch.bits() == 64),
      ("x86", arch.is_x86()),
      ("x86_64", arch == Arch::X86_64),
    ];
    for (name, flag) in flags {
      ns.insert(name, Value::Bool(flag));
    }
    for machine in NON_X86_LINUX_MACHINES {
      ns.insert(machine.as_str(), Value::Bool(linux && arch == *machine));
    }

    let version_of = |key: &str| -> String {
      variant
        .get(key)
        .map(str::to_string)
        .or_else(|| {
          DEFAULT_VARIANT_VERSIONS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, v)| v.to_string())
        })
        .unwrap_or_default()
    };

    let py = major_minor(&version_of("python"));
    ns.insert("py", Value::Int(py));
    ns.insert("py3k", Value::Bool((30..40).contains(&py)));
    ns.insert("py2k", Value::Bool((20..30).contains(&py)));
    for flag in PY_FLAGS {
      ns.insert(format!("py{}", flag), Value::Bool(py == *flag));
    }

    ns.insert("np", Value::Int(major_minor(&version_of("numpy"))));
    ns.insert("pl", Value::Str(version_of("perl")));
    let lua = version_of("lua");
    ns.insert("luajit", Value::Bool(lua.starts_with('2')));
    ns.insert("lua", Value::Str(lua));

    for (key, value) in variant.iter() {
      if !ns.contains(key) {
        ns.insert(key.clone(), Value::coerce(value));
      }
    }
    ns
  }
}

/// `"3.6.2"` becomes `36`; unparseable versions become `0`.
fn major_minor(version: &str) -> i64 {
  let digits: String = version.split('.').take(2).collect();
  digits.parse().unwrap_or(0)
}

//! Deserialization helpers for recipe fields.
//!
//! Recipes use YAML-1.1 base-loader semantics: every scalar stays the text
//! that was written. Scalar targets are therefore `String`, which keeps
//! `1.10` as `"1.10"`. Fields that accept either one value or a list go
//! through [`string_list`].

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

/// Treat an explicit `null` like an absent key.
pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de> + Default,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

struct StringListVisitor;

impl<'de> Visitor<'de> for StringListVisitor {
  type Value = Vec<String>;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a string or a list of strings")
  }

  fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
    Ok(Vec::new())
  }

  fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
    Ok(Vec::new())
  }

  fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
    Ok(vec![v.to_string()])
  }

  fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
    Ok(vec![v.to_string()])
  }

  fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
    Ok(vec![v.to_string()])
  }

  fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
    Ok(vec![v.to_string()])
  }

  fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
    Ok(vec![v.to_string()])
  }

  fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
    let mut items = Vec::new();
    // elements go through the String deserializer, which keeps raw scalar text
    while let Some(item) = seq.next_element::<Option<String>>()? {
      items.extend(item);
    }
    Ok(items)
  }
}

/// A scalar or a sequence of scalars, as a list. `null` entries are dropped.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  deserializer.deserialize_any(StringListVisitor)
}

/// Shared visitor shape for fields that are either a mapping or a sequence.
pub(crate) trait MapOrSeq<'de>: Sized {
  const EXPECTING: &'static str;

  fn from_map<A: MapAccess<'de>>(map: A) -> Result<Self, A::Error>;

  fn from_seq<A: SeqAccess<'de>>(seq: A) -> Result<Self, A::Error>;

  fn from_scalar<E: de::Error>(value: &str) -> Result<Self, E> {
    Err(E::invalid_type(de::Unexpected::Str(value), &Self::EXPECTING))
  }
}

pub(crate) struct MapOrSeqVisitor<T>(std::marker::PhantomData<T>);

impl<T> MapOrSeqVisitor<T> {
  pub(crate) fn new() -> Self {
    Self(std::marker::PhantomData)
  }
}

impl<'de, T: MapOrSeq<'de>> Visitor<'de> for MapOrSeqVisitor<T> {
  type Value = T;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(T::EXPECTING)
  }

  fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<T, A::Error> {
    T::from_map(map)
  }

  fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<T, A::Error> {
    T::from_seq(seq)
  }

  fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
    T::from_scalar(v)
  }
}

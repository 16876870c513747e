//! Deterministic cache key construction.
//!
//! A key is made of ordered prefixes followed by the flattened rendering of
//! ordered [`KeyElement`]s, all joined with `_`. The element part can
//! optionally be replaced by its SHA-256 digest to bound the key length.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::FetchError;

/// The separator placed between prefixes and rendered elements.
pub const SEPARATOR: &str = "_";

/// A single structured value contributing to a cache key.
///
/// The set of variants is closed: every value that can take part in a key is
/// converted into one of these up front, and rendering matches on them
/// exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyElement {
  Str(String),
  Bool(bool),
  Int(i64),
  UInt(u64),
  Float(f64),
  /// Members are flattened in order. An empty list counts as "no value".
  List(Vec<KeyElement>),
  /// Dereferenced when present; `None` is rejected.
  Optional(Option<Box<KeyElement>>),
  /// A composite value represented by its canonical string rendering.
  Display(String),
  /// A value kind without canonical textual form (maps, callables, raw
  /// handles). Always rejected; the payload names the kind for diagnostics.
  Unsupported(&'static str),
}

impl KeyElement {
  /// Wraps a composite value through its canonical `Display` rendering.
  pub fn display<T: fmt::Display + ?Sized>(value: &T) -> Self {
    KeyElement::Display(value.to_string())
  }

  /// Renders this element into `out`, appending one token per scalar.
  fn flatten_into(&self, out: &mut Vec<String>) -> Result<(), FetchError> {
    match self {
      KeyElement::Str(s) => out.push(s.clone()),
      KeyElement::Bool(b) => out.push(b.to_string()),
      KeyElement::Int(i) => out.push(i.to_string()),
      KeyElement::UInt(u) => out.push(u.to_string()),
      KeyElement::Float(f) => out.push(f.to_string()),
      KeyElement::Display(s) => out.push(s.clone()),
      KeyElement::List(members) => out.push(flatten(members)?),
      KeyElement::Optional(Some(inner)) => inner.flatten_into(out)?,
      KeyElement::Optional(None) => return Err(FetchError::Invalid),
      KeyElement::Unsupported(kind) => {
        tracing::trace!(kind, "rejecting key element without canonical form");
        return Err(FetchError::Invalid);
      }
    }
    Ok(())
  }
}

/// Flattens `elements` into one `_`-joined string.
fn flatten(elements: &[KeyElement]) -> Result<String, FetchError> {
  if elements.is_empty() {
    return Err(FetchError::Invalid);
  }
  let mut tokens = Vec::with_capacity(elements.len());
  for element in elements {
    element.flatten_into(&mut tokens)?;
  }
  Ok(tokens.join(SEPARATOR))
}

/// Builds a cache key from `prefixes` and `elements`.
///
/// When `hashed` is set, the rendered elements are replaced by the lowercase
/// hex SHA-256 digest of their joined form. Spaces anywhere in the final key
/// are replaced by `_`.
///
/// # Errors
///
/// Returns [`FetchError::Invalid`] if `elements` is empty, or if any element
/// (at any depth) is absent or has no canonical textual form.
pub fn build_key<P>(prefixes: &[P], elements: &[KeyElement], hashed: bool) -> Result<String, FetchError>
where
  P: AsRef<str>,
{
  let mut rendered = flatten(elements)?;
  if hashed {
    rendered = hex::encode(Sha256::digest(rendered.as_bytes()));
  }

  let mut parts: Vec<&str> = prefixes.iter().map(AsRef::as_ref).collect();
  parts.push(&rendered);
  Ok(parts.join(SEPARATOR).replace(' ', SEPARATOR))
}

// --- Conversions ---

impl From<&str> for KeyElement {
  fn from(value: &str) -> Self {
    KeyElement::Str(value.to_owned())
  }
}

impl From<String> for KeyElement {
  fn from(value: String) -> Self {
    KeyElement::Str(value)
  }
}

impl From<&String> for KeyElement {
  fn from(value: &String) -> Self {
    KeyElement::Str(value.clone())
  }
}

impl From<bool> for KeyElement {
  fn from(value: bool) -> Self {
    KeyElement::Bool(value)
  }
}

macro_rules! impl_from_int {
  ($variant:ident, $target:ty; $($t:ty),*) => {
    $(
      impl From<$t> for KeyElement {
        fn from(value: $t) -> Self {
          KeyElement::$variant(value as $target)
        }
      }
    )*
  };
}

impl_from_int!(Int, i64; i8, i16, i32, i64, isize);
impl_from_int!(UInt, u64; u8, u16, u32, u64, usize);

impl From<f32> for KeyElement {
  fn from(value: f32) -> Self {
    KeyElement::Float(f64::from(value))
  }
}

impl From<f64> for KeyElement {
  fn from(value: f64) -> Self {
    KeyElement::Float(value)
  }
}

impl<T: Into<KeyElement>> From<Vec<T>> for KeyElement {
  fn from(value: Vec<T>) -> Self {
    KeyElement::List(value.into_iter().map(Into::into).collect())
  }
}

impl<T: Into<KeyElement>, const N: usize> From<[T; N]> for KeyElement {
  fn from(value: [T; N]) -> Self {
    KeyElement::List(value.into_iter().map(Into::into).collect())
  }
}

impl<T: Into<KeyElement>> From<Option<T>> for KeyElement {
  fn from(value: Option<T>) -> Self {
    KeyElement::Optional(value.map(|v| Box::new(v.into())))
  }
}

impl<T: Into<KeyElement>> From<Box<T>> for KeyElement {
  fn from(value: Box<T>) -> Self {
    KeyElement::Optional(Some(Box::new((*value).into())))
  }
}

/// Builds a `Vec<KeyElement>` from heterogeneous values.
///
/// ```
/// use fibre_fetcher::{build_key, key_elements};
///
/// let key = build_key(&["user", "profile"], &key_elements![42u64, "en", true], false).unwrap();
/// assert_eq!(key, "user_profile_42_en_true");
/// ```
#[macro_export]
macro_rules! key_elements {
  ($($element:expr),* $(,)?) => {
    vec![$($crate::KeyElement::from($element)),*]
  };
}

//! Cache keys and invalidation tags.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

/// Opaque label for a category of domain data (e.g. "accounts").
///
/// Query entries provide tags; mutations invalidate them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Cow<'static, str>);

impl Tag {
  pub const fn from_static(label: &'static str) -> Self {
    Self(Cow::Borrowed(label))
  }

  pub fn new(label: impl Into<String>) -> Self {
    Self(Cow::Owned(label.into()))
  }

  /// Tag scoped to a single record, e.g. `accounts:42`.
  pub fn item(kind: &str, id: impl fmt::Display) -> Self {
    Self(Cow::Owned(format!("{}:{}", kind, id)))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&'static str> for Tag {
  fn from(label: &'static str) -> Self {
    Self::from_static(label)
  }
}

impl From<String> for Tag {
  fn from(label: String) -> Self {
    Self::new(label)
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

pub type TagSet = BTreeSet<Tag>;

/// Build a tag set from anything tag-like.
pub fn tag_set<I, T>(tags: I) -> TagSet
where
  I: IntoIterator<Item = T>,
  T: Into<Tag>,
{
  tags.into_iter().map(Into::into).collect()
}

/// Identity of one cached query: endpoint plus canonical arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  endpoint: String,
  args: String,
}

impl CacheKey {
  pub fn new(endpoint: impl Into<String>, args: &Value) -> Self {
    Self {
      endpoint: endpoint.into(),
      args: canonicalize(args),
    }
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  /// Canonical JSON text of the arguments.
  pub fn args(&self) -> &str {
    &self.args
  }

  /// Short, fixed-length fingerprint for log fields.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.endpoint.as_bytes());
    hasher.update([0u8]);
    hasher.update(self.args.as_bytes());
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(12);
    hash
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}({})", self.endpoint, self.args)
  }
}

/// Serialize a JSON value with object keys sorted and null-valued fields
/// dropped, so structurally equal arguments produce identical text.
///
/// Dropping nulls makes `{"search": null}` and `{}` the same argument
/// set, which is what an `Option` field that is `None` means.
pub fn canonicalize(value: &Value) -> String {
  let mut out = String::new();
  write_canonical(value, &mut out);
  out
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    Value::Object(map) => {
      let mut fields: Vec<_> = map.iter().filter(|(_, v)| !v.is_null()).collect();
      fields.sort_by(|a, b| a.0.cmp(b.0));
      out.push('{');
      for (i, (name, field)) in fields.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        // Value's Display is compact JSON with proper escaping
        out.push_str(&Value::String(name.clone()).to_string());
        out.push(':');
        write_canonical(field, out);
      }
      out.push('}');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

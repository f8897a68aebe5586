//! Static endpoint declarations: identity, route, argument shape and tags.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::cache::{tag_set, Tag, TagSet};
use crate::error::QueryError;

/// Derives extra tags from a result, e.g. one tag per returned record.
pub type TagDeriver = fn(&Value) -> Vec<Tag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
  Query,
  Mutation,
}

impl EndpointKind {
  pub fn as_str(self) -> &'static str {
    match self {
      EndpointKind::Query => "query",
      EndpointKind::Mutation => "mutation",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl Method {
  /// Whether arguments travel in the query string rather than a body.
  pub fn uses_query_string(self) -> bool {
    matches!(self, Method::Get | Method::Delete)
  }
}

/// HTTP method plus a path that may contain `{field}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
  pub method: Method,
  pub path: &'static str,
}

impl Route {
  pub const fn new(method: Method, path: &'static str) -> Self {
    Self { method, path }
  }

  /// Substitute placeholders from `args`. Returns the concrete path and
  /// the arguments that were not consumed by it.
  pub fn fill(&self, args: &Value) -> Result<(String, Map<String, Value>), String> {
    let mut remaining = match args {
      Value::Object(map) => map.clone(),
      Value::Null => Map::new(),
      _ => return Err("arguments must be an object".to_string()),
    };

    let mut path = String::with_capacity(self.path.len());
    let mut rest = self.path;
    while let Some(start) = rest.find('{') {
      let Some(len) = rest[start..].find('}') else {
        return Err(format!("unterminated placeholder in {}", self.path));
      };
      let field = &rest[start + 1..start + len];
      path.push_str(&rest[..start]);
      match remaining.remove(field) {
        Some(Value::String(s)) => path.push_str(&s),
        Some(Value::Number(n)) => path.push_str(&n.to_string()),
        Some(other) if !other.is_null() => {
          return Err(format!("path field `{}` must be a string or number", field))
        }
        _ => return Err(format!("missing path field `{}`", field)),
      }
      rest = &rest[start + len + 1..];
    }
    path.push_str(rest);
    Ok((path, remaining))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  String,
  Integer,
  Number,
  Bool,
  Any,
}

impl FieldKind {
  fn accepts(self, value: &Value) -> bool {
    match self {
      FieldKind::String => value.is_string(),
      FieldKind::Integer => value.is_i64() || value.is_u64(),
      FieldKind::Number => value.is_number(),
      FieldKind::Bool => value.is_boolean(),
      FieldKind::Any => true,
    }
  }

  fn label(self) -> &'static str {
    match self {
      FieldKind::String => "a string",
      FieldKind::Integer => "an integer",
      FieldKind::Number => "a number",
      FieldKind::Bool => "a boolean",
      FieldKind::Any => "a value",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
  pub name: &'static str,
  pub kind: FieldKind,
  pub required: bool,
}

/// Declared argument shape. Null fields count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgSchema {
  fields: Vec<Field>,
  allow_unknown: bool,
}

impl ArgSchema {
  /// A schema that accepts no fields at all.
  pub fn empty() -> Self {
    Self::default()
  }

  /// A schema that accepts anything.
  pub fn any() -> Self {
    Self {
      fields: Vec::new(),
      allow_unknown: true,
    }
  }

  pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
    self.fields.push(Field {
      name,
      kind,
      required: true,
    });
    self
  }

  pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
    self.fields.push(Field {
      name,
      kind,
      required: false,
    });
    self
  }

  pub fn allow_unknown(mut self) -> Self {
    self.allow_unknown = true;
    self
  }

  pub fn fields(&self) -> &[Field] {
    &self.fields
  }

  /// Check `args` against the declared fields. The error message names the
  /// first offending field.
  pub fn check(&self, args: &Value) -> Result<(), String> {
    let empty = Map::new();
    let map = match args {
      Value::Object(map) => map,
      Value::Null => &empty,
      _ => return Err("arguments must be an object".to_string()),
    };

    for field in &self.fields {
      match map.get(field.name).filter(|v| !v.is_null()) {
        Some(value) if !field.kind.accepts(value) => {
          return Err(format!("`{}` must be {}", field.name, field.kind.label()));
        }
        None if field.required => {
          return Err(format!("`{}` is required", field.name));
        }
        _ => {}
      }
    }

    if !self.allow_unknown {
      if let Some(name) = map
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, _)| k)
        .find(|k| !self.fields.iter().any(|f| f.name == k.as_str()))
      {
        return Err(format!("unknown field `{}`", name));
      }
    }
    Ok(())
  }
}

/// Tags a query's results provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvidesTags {
  Static(TagSet),
  FromResult(TagSet, TagDeriver),
}

impl ProvidesTags {
  pub fn declared(&self) -> &TagSet {
    match self {
      ProvidesTags::Static(tags) | ProvidesTags::FromResult(tags, _) => tags,
    }
  }

  pub fn deriver(&self) -> Option<TagDeriver> {
    match self {
      ProvidesTags::Static(_) => None,
      ProvidesTags::FromResult(_, derive) => Some(*derive),
    }
  }
}

impl Default for ProvidesTags {
  fn default() -> Self {
    ProvidesTags::Static(TagSet::new())
  }
}

/// Declaration of one remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  pub id: &'static str,
  pub kind: EndpointKind,
  pub route: Route,
  pub args: ArgSchema,
  pub provides: ProvidesTags,
  pub invalidates: TagSet,
}

impl Endpoint {
  pub fn query(id: &'static str, route: Route) -> Self {
    Self {
      id,
      kind: EndpointKind::Query,
      route,
      args: ArgSchema::empty(),
      provides: ProvidesTags::default(),
      invalidates: TagSet::new(),
    }
  }

  pub fn mutation(id: &'static str, route: Route) -> Self {
    Self {
      kind: EndpointKind::Mutation,
      ..Self::query(id, route)
    }
  }

  pub fn args(mut self, schema: ArgSchema) -> Self {
    self.args = schema;
    self
  }

  pub fn provides<I, T>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<Tag>,
  {
    self.provides = ProvidesTags::Static(tag_set(tags));
    self
  }

  /// Provide `tags` plus whatever `derive` returns for each result.
  pub fn provides_from_result<I, T>(mut self, tags: I, derive: TagDeriver) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<Tag>,
  {
    self.provides = ProvidesTags::FromResult(tag_set(tags), derive);
    self
  }

  pub fn invalidates<I, T>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<Tag>,
  {
    self.invalidates = tag_set(tags);
    self
  }

  /// Validate arguments before anything is cached or sent.
  pub fn validate(&self, args: &Value) -> Result<(), QueryError> {
    self
      .args
      .check(args)
      .and_then(|_| self.route.fill(args).map(|_| ()))
      .map_err(|message| QueryError::validation(self.id, message))
  }
}

/// All endpoints known to a client, by id.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
  endpoints: HashMap<&'static str, Endpoint>,
}

impl EndpointRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, endpoint: Endpoint) -> Self {
    self.register(endpoint);
    self
  }

  pub fn register(&mut self, endpoint: Endpoint) {
    self.endpoints.insert(endpoint.id, endpoint);
  }

  pub fn get(&self, id: &str) -> Result<&Endpoint, QueryError> {
    self
      .endpoints
      .get(id)
      .ok_or_else(|| QueryError::UnknownEndpoint(id.to_string()))
  }

  /// Look up `id` and check it is of the expected kind.
  pub fn expect(&self, id: &str, kind: EndpointKind) -> Result<&Endpoint, QueryError> {
    let endpoint = self.get(id)?;
    if endpoint.kind != kind {
      return Err(QueryError::WrongEndpointKind {
        endpoint: id.to_string(),
        expected: kind.as_str(),
      });
    }
    Ok(endpoint)
  }

  pub fn len(&self) -> usize {
    self.endpoints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.endpoints.is_empty()
  }
}

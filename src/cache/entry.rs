//! A single cached query result and its bookkeeping.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::key::{CacheKey, TagSet};
use crate::error::QueryError;

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// Entry exists (someone subscribed) but no load has started yet
  Uninitialized,
  /// A load is in flight, or is about to be issued after invalidation
  Loading,
  /// Last load succeeded
  Success,
  /// Last load failed
  Error,
}

/// Identifies one load attempt for a key, so a result belonging to an
/// earlier attempt can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadId(pub(crate) u64);

/// One entry of the cache store.
///
/// Entries are only ever mutated by [`CacheStore`](super::CacheStore);
/// everyone else sees them through shared references.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub(crate) key: CacheKey,
  pub(crate) status: EntryStatus,
  pub(crate) value: Option<Value>,
  pub(crate) error: Option<QueryError>,
  /// Tags from the endpoint declaration, fixed when the entry is created
  pub(crate) declared_tags: TagSet,
  /// Declared tags plus whatever the last result contributed
  pub(crate) provides: TagSet,
  pub(crate) subscribers: usize,
  pub(crate) stale: bool,
  pub(crate) in_flight: Option<LoadId>,
  pub(crate) revision: u64,
  pub(crate) fetched_at: Option<DateTime<Utc>>,
  pub(crate) released_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
  pub(crate) fn new(key: CacheKey) -> Self {
    Self {
      key,
      status: EntryStatus::Uninitialized,
      value: None,
      error: None,
      declared_tags: TagSet::new(),
      provides: TagSet::new(),
      subscribers: 0,
      stale: false,
      in_flight: None,
      revision: 0,
      fetched_at: None,
      released_at: None,
    }
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  pub fn status(&self) -> EntryStatus {
    self.status
  }

  /// Last good value. Kept while a refetch is in flight so readers can
  /// keep showing it.
  pub fn value(&self) -> Option<&Value> {
    self.value.as_ref()
  }

  pub fn error(&self) -> Option<&QueryError> {
    self.error.as_ref()
  }

  pub fn provides_tags(&self) -> &TagSet {
    &self.provides
  }

  pub fn subscriber_count(&self) -> usize {
    self.subscribers
  }

  pub fn is_stale(&self) -> bool {
    self.stale
  }

  pub fn is_in_flight(&self) -> bool {
    self.in_flight.is_some()
  }

  /// Bumped every time a load settles, successfully or not.
  pub fn revision(&self) -> u64 {
    self.revision
  }

  pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
    self.fetched_at
  }

  /// Whether any of `tags` is provided by this entry.
  pub fn provides_any(&self, tags: &TagSet) -> bool {
    // Iterate the smaller set
    if tags.len() < self.provides.len() {
      tags.iter().any(|t| self.provides.contains(t))
    } else {
      self.provides.iter().any(|t| tags.contains(t))
    }
  }

  /// Fresh, successful and usable without touching the network.
  pub fn is_fresh(&self) -> bool {
    self.status == EntryStatus::Success && !self.stale
  }
}

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{CacheEntry, EntryStatus};
use crate::error::QueryError;

/// Read-only projection of one cache entry, as seen by a view.
///
/// `data` is the last good value and is kept while a refetch is loading,
/// so a view can keep rendering it (stale-while-revalidate).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
  pub status: EntryStatus,
  pub data: Option<T>,
  pub error: Option<QueryError>,
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> QueryState<T> {
  /// State of a key that has no entry (never read, or evicted).
  pub fn uninitialized() -> Self {
    Self {
      status: EntryStatus::Uninitialized,
      data: None,
      error: None,
      fetched_at: None,
    }
  }

  pub fn is_uninitialized(&self) -> bool {
    self.status == EntryStatus::Uninitialized
  }

  pub fn is_loading(&self) -> bool {
    self.status == EntryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == EntryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == EntryStatus::Error
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&QueryError> {
    self.error.as_ref()
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
    QueryState {
      status: self.status,
      data: self.data.map(f),
      error: self.error,
      fetched_at: self.fetched_at,
    }
  }
}

impl<'a> QueryState<&'a Value> {
  pub(crate) fn of(entry: Option<&'a CacheEntry>) -> Self {
    match entry {
      Some(entry) => Self {
        status: entry.status(),
        data: entry.value(),
        error: entry.error().cloned(),
        fetched_at: entry.fetched_at(),
      },
      None => Self::uninitialized(),
    }
  }

  /// Decode the raw value into `T`. A value that does not decode turns the
  /// state into an error so the view can show what went wrong.
  pub fn decode<T: DeserializeOwned>(self) -> QueryState<T> {
    let QueryState {
      status,
      data,
      error,
      fetched_at,
    } = self;
    match data.map(|value| T::deserialize(value)) {
      Some(Ok(decoded)) => QueryState {
        status,
        data: Some(decoded),
        error,
        fetched_at,
      },
      Some(Err(e)) => QueryState {
        status: EntryStatus::Error,
        data: None,
        error: Some(QueryError::decode(e.to_string())),
        fetched_at,
      },
      None => QueryState {
        status,
        data: None,
        error,
        fetched_at,
      },
    }
  }
}

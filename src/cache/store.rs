//! The cache store: entries, subscriber counts, tag invalidation and
//! change notification. No I/O happens here.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use super::entry::{CacheEntry, EntryStatus, LoadId};
use super::key::{CacheKey, TagSet};
use crate::error::QueryError;

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEventKind {
  Loading,
  Resolved,
  Rejected,
  Evicted,
}

/// Notification delivered to listeners of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
  pub key: CacheKey,
  pub kind: StoreEventKind,
}

/// Callback registered for one key.
///
/// Listeners only receive the event, never the store, so they cannot
/// re-enter it while it is being mutated.
pub type Listener = Box<dyn FnMut(&StoreEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Result of [`CacheStore::begin_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginLoad {
  /// A new load was registered; the caller must perform it
  Started(LoadId),
  /// A load for this key is already in flight; nothing to do
  AlreadyLoading(LoadId),
}

/// Result of settling a load with [`CacheStore::resolve`] or
/// [`CacheStore::reject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
  /// Result stored and subscribers notified
  Applied,
  /// The entry was invalidated while this load was in flight. The result
  /// was kept as last-good value but the entry stays Loading; the caller
  /// must load again.
  RefetchNeeded,
  /// The load no longer belongs to a live entry; result dropped
  Discarded,
}

/// Outcome of an invalidation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Invalidation {
  /// Subscribed entries that are now Loading and need a new load issued
  pub refetch: Vec<CacheKey>,
  /// Subscribed entries already in flight; they reload once that lands
  pub deferred: Vec<CacheKey>,
  /// Unsubscribed entries that were dropped
  pub evicted: Vec<CacheKey>,
}

impl Invalidation {
  pub fn affected(&self) -> usize {
    self.refetch.len() + self.deferred.len() + self.evicted.len()
  }
}

/// Single owner of every cached query result.
#[derive(Default)]
pub struct CacheStore {
  entries: HashMap<CacheKey, CacheEntry>,
  listeners: HashMap<CacheKey, Vec<(ListenerId, Listener)>>,
  next_listener: u64,
  next_load: u64,
}

impl CacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
    self.entries.get(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
    self.entries.values()
  }

  /// Add a reader to `key`, creating an uninitialized entry if needed.
  /// Returns the new subscriber count.
  pub fn subscribe(&mut self, key: &CacheKey) -> usize {
    let entry = self
      .entries
      .entry(key.clone())
      .or_insert_with(|| CacheEntry::new(key.clone()));
    entry.subscribers += 1;
    entry.released_at = None;
    entry.subscribers
  }

  /// Remove a reader from `key`. Returns `true` if this evicted the entry.
  ///
  /// An entry left without readers is only dropped when it is stale or was
  /// never loaded; a fresh result stays cached for the next reader.
  pub fn unsubscribe(&mut self, key: &CacheKey) -> bool {
    let Some(entry) = self.entries.get_mut(key) else {
      return false;
    };
    entry.subscribers = entry.subscribers.saturating_sub(1);
    if entry.subscribers > 0 {
      return false;
    }
    entry.released_at = Some(Utc::now());
    if entry.stale || entry.status == EntryStatus::Uninitialized {
      self.evict(key);
      return true;
    }
    false
  }

  /// Move `key` to Loading. Idempotent while a load is in flight: the
  /// existing load id is returned instead of a second marker.
  pub fn begin_load(&mut self, key: &CacheKey, provides: &TagSet) -> BeginLoad {
    self.next_load += 1;
    let candidate = LoadId(self.next_load);

    let entry = self
      .entries
      .entry(key.clone())
      .or_insert_with(|| CacheEntry::new(key.clone()));

    if let Some(load) = entry.in_flight {
      return BeginLoad::AlreadyLoading(load);
    }

    if entry.status == EntryStatus::Uninitialized {
      entry.declared_tags = provides.clone();
      entry.provides = provides.clone();
    }
    entry.in_flight = Some(candidate);
    entry.stale = false;
    entry.status = EntryStatus::Loading;

    self.notify(key, StoreEventKind::Loading);
    BeginLoad::Started(candidate)
  }

  /// Store a successful result for the load `load` of `key`.
  ///
  /// `result_tags` are added on top of the declared tags (per-item tags).
  pub fn resolve(
    &mut self,
    key: &CacheKey,
    load: LoadId,
    value: Value,
    result_tags: TagSet,
  ) -> Settled {
    let settled = {
      let Some(entry) = self.entries.get_mut(key) else {
        return Settled::Discarded;
      };
      if entry.in_flight != Some(load) {
        return Settled::Discarded;
      }
      entry.in_flight = None;
      entry.value = Some(value);
      entry.provides = &entry.declared_tags | &result_tags;
      entry.fetched_at = Some(Utc::now());

      if entry.stale {
        Settled::RefetchNeeded
      } else {
        entry.status = EntryStatus::Success;
        entry.error = None;
        entry.revision += 1;
        Settled::Applied
      }
    };

    if settled == Settled::Applied {
      self.notify(key, StoreEventKind::Resolved);
    }
    settled
  }

  /// Store a failure for the load `load` of `key`.
  pub fn reject(&mut self, key: &CacheKey, load: LoadId, error: QueryError) -> Settled {
    let settled = {
      let Some(entry) = self.entries.get_mut(key) else {
        return Settled::Discarded;
      };
      if entry.in_flight != Some(load) {
        return Settled::Discarded;
      }
      entry.in_flight = None;

      if entry.stale {
        Settled::RefetchNeeded
      } else {
        entry.status = EntryStatus::Error;
        entry.error = Some(error);
        entry.revision += 1;
        Settled::Applied
      }
    };

    if settled == Settled::Applied {
      self.notify(key, StoreEventKind::Rejected);
    }
    settled
  }

  /// Mark every entry providing any of `tags` as stale.
  ///
  /// Subscribed entries are Loading when this returns; unsubscribed ones
  /// are gone. Entries that provide none of the tags are untouched.
  pub fn invalidate(&mut self, tags: &TagSet) -> Invalidation {
    let hit: Vec<CacheKey> = self
      .entries
      .values()
      .filter(|entry| entry.provides_any(tags))
      .map(|entry| entry.key.clone())
      .collect();

    let mut outcome = Invalidation::default();
    for key in hit {
      let Some(entry) = self.entries.get_mut(&key) else {
        continue;
      };

      if entry.subscribers == 0 {
        self.evict(&key);
        outcome.evicted.push(key);
        continue;
      }

      entry.stale = true;
      let was_loading = entry.status == EntryStatus::Loading;
      entry.status = EntryStatus::Loading;
      if entry.in_flight.is_some() {
        outcome.deferred.push(key.clone());
      } else {
        outcome.refetch.push(key.clone());
      }
      if !was_loading {
        self.notify(&key, StoreEventKind::Loading);
      }
    }

    let labels: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
    info!(
      tags = ?labels,
      refetch = outcome.refetch.len(),
      deferred = outcome.deferred.len(),
      evicted = outcome.evicted.len(),
      "Invalidated cache entries"
    );
    outcome
  }

  /// Drop unread entries released at or before `cutoff`.
  pub fn collect_garbage(&mut self, cutoff: DateTime<Utc>) -> Vec<CacheKey> {
    let expired: Vec<CacheKey> = self
      .entries
      .values()
      .filter(|entry| {
        entry.subscribers == 0
          && entry.in_flight.is_none()
          && entry.released_at.is_some_and(|at| at <= cutoff)
      })
      .map(|entry| entry.key.clone())
      .collect();

    for key in &expired {
      self.evict(key);
    }
    expired
  }

  /// Drop every entry. Used at client teardown.
  pub fn clear(&mut self) {
    let keys: Vec<CacheKey> = self.entries.keys().cloned().collect();
    for key in &keys {
      self.evict(key);
    }
    self.listeners.clear();
  }

  /// Register a callback for changes to `key`.
  pub fn listen(&mut self, key: &CacheKey, listener: impl FnMut(&StoreEvent) + 'static) -> ListenerId {
    self.next_listener += 1;
    let id = ListenerId(self.next_listener);
    self
      .listeners
      .entry(key.clone())
      .or_default()
      .push((id, Box::new(listener)));
    id
  }

  /// Remove a callback. Returns `false` if it was not registered.
  pub fn unlisten(&mut self, id: ListenerId) -> bool {
    let mut removed = false;
    self.listeners.retain(|_, list| {
      let before = list.len();
      list.retain(|(lid, _)| *lid != id);
      removed |= list.len() != before;
      !list.is_empty()
    });
    removed
  }

  fn evict(&mut self, key: &CacheKey) {
    if self.entries.remove(key).is_some() {
      debug!(endpoint = key.endpoint(), key = %key.digest(), "Evicted cache entry");
      self.notify(key, StoreEventKind::Evicted);
    }
  }

  fn notify(&mut self, key: &CacheKey, kind: StoreEventKind) {
    if let Some(list) = self.listeners.get_mut(key) {
      let event = StoreEvent {
        key: key.clone(),
        kind,
      };
      for (_, listener) in list.iter_mut() {
        listener(&event);
      }
    }
  }
}

impl std::fmt::Debug for CacheStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheStore")
      .field("entries", &self.entries.len())
      .field("listeners", &self.listeners.values().map(Vec::len).sum::<usize>())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::key::tag_set;
  use serde_json::json;
  use std::cell::RefCell;
  use std::rc::Rc;

  fn key(page: u32) -> CacheKey {
    CacheKey::new("movements.list", &json!({ "page": page }))
  }

  fn started(outcome: BeginLoad) -> LoadId {
    match outcome {
      BeginLoad::Started(load) => load,
      BeginLoad::AlreadyLoading(_) => panic!("expected a new load"),
    }
  }

  #[test]
  fn test_begin_load_is_idempotent() {
    let mut store = CacheStore::new();
    let tags = tag_set(["movements"]);

    let first = started(store.begin_load(&key(0), &tags));
    assert_eq!(
      store.begin_load(&key(0), &tags),
      BeginLoad::AlreadyLoading(first)
    );
    assert_eq!(store.get(&key(0)).map(|e| e.status()), Some(EntryStatus::Loading));
  }

  #[test]
  fn test_resolve_and_reject_transitions() {
    let mut store = CacheStore::new();
    let tags = tag_set(["movements"]);

    let load = started(store.begin_load(&key(0), &tags));
    assert_eq!(
      store.resolve(&key(0), load, json!([1, 2]), TagSet::new()),
      Settled::Applied
    );
    let entry = store.get(&key(0)).unwrap();
    assert_eq!(entry.status(), EntryStatus::Success);
    assert_eq!(entry.value(), Some(&json!([1, 2])));
    assert!(entry.error().is_none());

    let load = started(store.begin_load(&key(0), &tags));
    // Last good value survives while reloading
    assert_eq!(store.get(&key(0)).unwrap().value(), Some(&json!([1, 2])));
    store.reject(&key(0), load, QueryError::api(500, "boom"));
    let entry = store.get(&key(0)).unwrap();
    assert_eq!(entry.status(), EntryStatus::Error);
    assert_eq!(entry.error(), Some(&QueryError::api(500, "boom")));
  }

  #[test]
  fn test_superseded_load_is_discarded() {
    let mut store = CacheStore::new();
    let tags = tag_set(["movements"]);
    let load = started(store.begin_load(&key(0), &tags));

    assert_eq!(
      store.resolve(&key(0), LoadId(load.0 + 100), json!([]), TagSet::new()),
      Settled::Discarded
    );
    assert!(store.get(&key(0)).unwrap().is_in_flight());
  }

  #[test]
  fn test_invalidate_touches_only_matching_entries() {
    let mut store = CacheStore::new();
    let movements = CacheKey::new("movements.list", &json!({}));
    let accounts = CacheKey::new("accounts.list", &json!({}));
    let orphan = CacheKey::new("movements.get", &json!({ "id": 1 }));

    for (key, tags) in [
      (&movements, tag_set(["users", "movements"])),
      (&accounts, tag_set(["users", "accounts"])),
      (&orphan, tag_set(["movements"])),
    ] {
      let load = started(store.begin_load(key, &tags));
      store.resolve(key, load, json!({}), TagSet::new());
    }
    store.subscribe(&movements);
    store.subscribe(&accounts);

    let outcome = store.invalidate(&tag_set(["movements"]));

    assert_eq!(outcome.refetch, vec![movements.clone()]);
    assert_eq!(outcome.evicted, vec![orphan.clone()]);
    assert_eq!(store.get(&movements).unwrap().status(), EntryStatus::Loading);
    assert!(store.get(&orphan).is_none());
    assert_eq!(store.get(&accounts).unwrap().status(), EntryStatus::Success);
  }

  #[test]
  fn test_invalidation_during_load_requests_refetch() {
    let mut store = CacheStore::new();
    let tags = tag_set(["movements"]);
    store.subscribe(&key(0));
    let load = started(store.begin_load(&key(0), &tags));

    let outcome = store.invalidate(&tags);
    assert_eq!(outcome.deferred, vec![key(0)]);

    assert_eq!(
      store.resolve(&key(0), load, json!(["old"]), TagSet::new()),
      Settled::RefetchNeeded
    );
    let entry = store.get(&key(0)).unwrap();
    assert_eq!(entry.status(), EntryStatus::Loading);
    assert!(!entry.is_in_flight());
    assert!(matches!(store.begin_load(&key(0), &tags), BeginLoad::Started(_)));
  }

  #[test]
  fn test_result_tags_extend_declared_tags() {
    let mut store = CacheStore::new();
    let accounts = CacheKey::new("accounts.list", &Value::Null);
    store.subscribe(&accounts);
    let load = started(store.begin_load(&accounts, &tag_set(["accounts"])));
    store.resolve(&accounts, load, json!([{ "id": 7 }]), tag_set(["accounts:7"]));

    let outcome = store.invalidate(&tag_set(["accounts:7"]));
    assert_eq!(outcome.refetch, vec![accounts]);
  }

  #[test]
  fn test_unsubscribe_keeps_fresh_and_evicts_stale() {
    let mut store = CacheStore::new();
    let tags = tag_set(["movements"]);
    store.subscribe(&key(0));
    let load = started(store.begin_load(&key(0), &tags));
    store.resolve(&key(0), load, json!([]), TagSet::new());

    assert!(!store.unsubscribe(&key(0)));
    assert!(store.get(&key(0)).is_some());

    store.subscribe(&key(0));
    store.invalidate(&tags);
    assert!(store.unsubscribe(&key(0)));
    assert!(store.get(&key(0)).is_none());
  }

  #[test]
  fn test_garbage_collection_respects_subscribers() {
    let mut store = CacheStore::new();
    let tags = tag_set(["movements"]);
    for page in 0..2 {
      store.subscribe(&key(page));
      let load = started(store.begin_load(&key(page), &tags));
      store.resolve(&key(page), load, json!([]), TagSet::new());
    }
    store.unsubscribe(&key(0));

    let evicted = store.collect_garbage(Utc::now());
    assert_eq!(evicted, vec![key(0)]);
    assert!(store.get(&key(1)).is_some());
  }

  #[test]
  fn test_listeners_are_notified_synchronously() {
    let mut store = CacheStore::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = store.listen(&key(0), move |event| sink.borrow_mut().push(event.kind));

    store.subscribe(&key(0));
    let load = started(store.begin_load(&key(0), &tag_set(["movements"])));
    store.resolve(&key(0), load, json!([]), TagSet::new());
    store.invalidate(&tag_set(["movements"]));

    assert_eq!(
      *seen.borrow(),
      vec![
        StoreEventKind::Loading,
        StoreEventKind::Resolved,
        StoreEventKind::Loading
      ]
    );

    assert!(store.unlisten(id));
    assert!(!store.unlisten(id));
  }
}

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{spawn_request, Delivery, DeliverySender, Origin, Request};
use crate::cache::{
  tag_set, BeginLoad, CacheKey, CacheStore, Invalidation, LoadId, Settled, TagSet,
};
use crate::endpoint::TagDeriver;
use crate::error::QueryError;

/// A factory that creates the network request for one key. It is called
/// on every (re)load of that key.
pub type Fetcher = Arc<dyn Fn() -> Request + Send + Sync>;

/// Everything the executor needs to (re)load one key.
#[derive(Clone)]
pub struct QuerySource {
  fetch: Fetcher,
  provides: TagSet,
  tags_from_result: Option<TagDeriver>,
}

impl QuerySource {
  pub fn new<F>(fetch: F) -> Self
  where
    F: Fn() -> Request + Send + Sync + 'static,
  {
    Self {
      fetch: Arc::new(fetch),
      provides: TagSet::new(),
      tags_from_result: None,
    }
  }

  /// Tags every result of this query provides.
  pub fn provides(mut self, tags: TagSet) -> Self {
    self.provides = tags;
    self
  }

  /// Extra tags derived from each result (per-item tags).
  pub fn tags_from_result(mut self, derive: TagDeriver) -> Self {
    self.tags_from_result = Some(derive);
    self
  }
}

impl std::fmt::Debug for QuerySource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QuerySource")
      .field("provides", &self.provides)
      .field("tags_from_result", &self.tags_from_result.is_some())
      .finish_non_exhaustive()
  }
}

/// A reader's hold on one cache key.
///
/// Release it through the owner of the executor to unsubscribe right away.
/// Dropping it unreleased queues the unsubscribe for the next poll, so a
/// torn-down view never leaks a reader.
#[must_use = "dropping a subscription unsubscribes from the key"]
#[derive(Debug)]
pub struct QuerySubscription {
  key: CacheKey,
  epoch: u64,
  release: Option<DeliverySender>,
}

impl QuerySubscription {
  fn new(key: CacheKey, epoch: u64, release: DeliverySender) -> Self {
    Self {
      key,
      epoch,
      release: Some(release),
    }
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// Consume the handle without queueing a release.
  pub(crate) fn disarm(mut self) -> (CacheKey, u64) {
    self.release = None;
    (self.key.clone(), self.epoch)
  }
}

impl Drop for QuerySubscription {
  fn drop(&mut self) {
    if let Some(tx) = self.release.take() {
      let _ = tx.send(Delivery::Released {
        key: self.key.clone(),
        epoch: self.epoch,
      });
    }
  }
}

/// Issues network loads for cache misses and writes their results back.
///
/// At most one load per key is in flight at any time: a reader arriving
/// while a key is loading joins that load instead of starting another.
/// There is no retry; a failed load stays failed until someone reads or
/// refetches the key again.
pub struct QueryExecutor {
  store: CacheStore,
  sources: HashMap<CacheKey, QuerySource>,
  deliveries: DeliverySender,
  /// Bumped by `clear`; handles from an older epoch no longer count
  epoch: u64,
  in_flight: usize,
  network_calls: u64,
}

impl QueryExecutor {
  pub(crate) fn new(deliveries: DeliverySender) -> Self {
    Self {
      store: CacheStore::new(),
      sources: HashMap::new(),
      deliveries,
      epoch: 0,
      in_flight: 0,
      network_calls: 0,
    }
  }

  pub fn store(&self) -> &CacheStore {
    &self.store
  }

  pub fn store_mut(&mut self) -> &mut CacheStore {
    &mut self.store
  }

  /// Subscribe to `key`, loading it if there is no fresh result and no
  /// load already in flight.
  pub fn run(&mut self, key: CacheKey, source: QuerySource) -> QuerySubscription {
    let subscribers = self.store.subscribe(&key);
    self.sources.insert(key.clone(), source);

    let (fresh, in_flight) = self
      .store
      .get(&key)
      .map(|entry| (entry.is_fresh(), entry.is_in_flight()))
      .unwrap_or((false, false));

    if fresh {
      debug!(endpoint = key.endpoint(), key = %key.digest(), subscribers, "Cache hit");
    } else if in_flight {
      debug!(endpoint = key.endpoint(), key = %key.digest(), subscribers, "Joined in-flight load");
    } else {
      self.start_load(&key);
    }

    QuerySubscription::new(key, self.epoch, self.deliveries.clone())
  }

  /// Force a new load of a subscribed key, unless one is already in flight.
  pub fn refetch(&mut self, key: &CacheKey) -> bool {
    match self.store.get(key) {
      Some(entry) if entry.subscriber_count() > 0 && !entry.is_in_flight() => self.start_load(key),
      _ => false,
    }
  }

  /// Unsubscribe immediately.
  pub fn release(&mut self, subscription: QuerySubscription) {
    let (key, epoch) = subscription.disarm();
    self.unsubscribe(&key, epoch);
  }

  /// Drop one reader of `key`. Handles issued before the last `clear`
  /// were already dropped with their entries and are ignored.
  pub(crate) fn unsubscribe(&mut self, key: &CacheKey, epoch: u64) {
    if epoch != self.epoch {
      debug!(endpoint = key.endpoint(), key = %key.digest(), "Ignored release from before clear");
      return;
    }
    if self.store.unsubscribe(key) {
      self.sources.remove(key);
    }
  }

  /// Invalidate `tags` and reload every subscribed entry that provides one.
  pub fn invalidate(&mut self, tags: &TagSet) -> Invalidation {
    let outcome = self.store.invalidate(tags);
    for key in &outcome.evicted {
      self.sources.remove(key);
    }
    for key in &outcome.refetch {
      self.start_load(key);
    }
    outcome
  }

  /// Apply the outcome of load `load` for `key`.
  pub(crate) fn complete(&mut self, key: CacheKey, load: LoadId, outcome: Result<Value, QueryError>) {
    self.in_flight = self.in_flight.saturating_sub(1);

    let settled = match outcome {
      Ok(value) => {
        let result_tags = self
          .sources
          .get(&key)
          .and_then(|source| source.tags_from_result)
          .map(|derive| tag_set(derive(&value)))
          .unwrap_or_default();
        debug!(endpoint = key.endpoint(), key = %key.digest(), "Load resolved");
        self.store.resolve(&key, load, value, result_tags)
      }
      Err(error) => {
        warn!(endpoint = key.endpoint(), key = %key.digest(), %error, "Load rejected");
        self.store.reject(&key, load, error)
      }
    };

    match settled {
      Settled::Applied => {}
      Settled::RefetchNeeded => {
        self.start_load(&key);
      }
      Settled::Discarded => {
        debug!(endpoint = key.endpoint(), key = %key.digest(), "Discarded superseded result");
      }
    }
  }

  /// Evict unread entries released at or before `cutoff`.
  pub fn collect_garbage(&mut self, cutoff: DateTime<Utc>) -> usize {
    let evicted = self.store.collect_garbage(cutoff);
    for key in &evicted {
      self.sources.remove(key);
    }
    evicted.len()
  }

  /// Drop everything. Loads still in flight are discarded on arrival.
  /// Outstanding handles become inert.
  pub fn clear(&mut self) {
    self.store.clear();
    self.sources.clear();
    self.epoch += 1;
  }

  /// Loads started and not yet reported back.
  pub fn in_flight(&self) -> usize {
    self.in_flight
  }

  /// Total network calls issued since creation.
  pub fn network_calls(&self) -> u64 {
    self.network_calls
  }

  fn start_load(&mut self, key: &CacheKey) -> bool {
    let Some(source) = self.sources.get(key) else {
      warn!(endpoint = key.endpoint(), key = %key.digest(), "No source registered for key");
      return false;
    };

    match self.store.begin_load(key, &source.provides) {
      BeginLoad::Started(load) => {
        let request = (source.fetch)();
        self.in_flight += 1;
        self.network_calls += 1;
        debug!(endpoint = key.endpoint(), key = %key.digest(), "Started load");
        spawn_request(
          &self.deliveries,
          Origin::Load {
            key: key.clone(),
            load,
          },
          request,
        );
        true
      }
      BeginLoad::AlreadyLoading(_) => false,
    }
  }
}

//! The client facade views talk to.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheKey, CacheStore, Invalidation, ListenerId, StoreEvent, TagSet};
use crate::endpoint::{Endpoint, EndpointKind, EndpointRegistry};
use crate::error::QueryError;
use crate::pagination::PaginatedQuery;
use crate::query::{
  delivery_channel, Completion, Delivery, DeliveryReceiver, MutationDispatcher, MutationTicket,
  Origin, QueryExecutor, QuerySource, QueryState, QuerySubscription,
};
use crate::transport::Transport;

/// Tunables for a [`QueryClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
  /// How long an entry nobody reads stays cached
  pub keep_unused_for: Duration,
  /// Scroll lookahead for paginated queries, in viewport heights
  pub lookahead_viewports: f64,
}

impl Default for ClientOptions {
  fn default() -> Self {
    Self {
      keep_unused_for: Duration::from_secs(60),
      lookahead_viewports: 1.0,
    }
  }
}

/// Owns the cache store, the executor and the mutation dispatcher.
///
/// There is exactly one of these per application, created at start-up and
/// passed by reference to every view. Request outcomes are applied when
/// the owner calls [`QueryClient::poll`] or awaits [`QueryClient::wait`].
pub struct QueryClient {
  registry: EndpointRegistry,
  transport: Arc<dyn Transport>,
  executor: QueryExecutor,
  mutations: MutationDispatcher,
  deliveries: DeliveryReceiver,
  options: ClientOptions,
}

impl QueryClient {
  pub fn new(registry: EndpointRegistry, transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
    let (tx, rx) = delivery_channel();
    info!(endpoints = registry.len(), "Query client started");
    Self {
      registry,
      transport,
      executor: QueryExecutor::new(tx.clone()),
      mutations: MutationDispatcher::new(tx),
      deliveries: rx,
      options,
    }
  }

  pub fn registry(&self) -> &EndpointRegistry {
    &self.registry
  }

  pub fn options(&self) -> &ClientOptions {
    &self.options
  }

  pub fn store(&self) -> &CacheStore {
    self.executor.store()
  }

  pub fn entry(&self, key: &CacheKey) -> Option<&CacheEntry> {
    self.executor.store().get(key)
  }

  /// Subscribe to the query `endpoint_id` with `args`.
  ///
  /// Arguments are validated first; a validation failure is returned here
  /// and never reaches the cache.
  pub fn use_query<A>(&mut self, endpoint_id: &str, args: &A) -> Result<QuerySubscription, QueryError>
  where
    A: Serialize + ?Sized,
  {
    let args = to_args(endpoint_id, args)?;
    self.subscribe_value(endpoint_id, args)
  }

  pub(crate) fn subscribe_value(
    &mut self,
    endpoint_id: &str,
    args: Value,
  ) -> Result<QuerySubscription, QueryError> {
    let endpoint = self.registry.expect(endpoint_id, EndpointKind::Query)?;
    endpoint.validate(&args)?;

    let key = CacheKey::new(endpoint.id, &args);
    let source = source_for(&self.transport, endpoint, args);
    Ok(self.executor.run(key, source))
  }

  /// Current projection of a subscribed entry.
  pub fn state(&self, subscription: &QuerySubscription) -> QueryState<&Value> {
    QueryState::of(self.executor.store().get(subscription.key()))
  }

  /// Current projection, decoded into `T`.
  pub fn read<T: DeserializeOwned>(&self, subscription: &QuerySubscription) -> QueryState<T> {
    self.state(subscription).decode()
  }

  /// Force a new load of a subscribed key. No-op while one is in flight.
  pub fn refetch(&mut self, subscription: &QuerySubscription) -> bool {
    self.executor.refetch(subscription.key())
  }

  /// Stop reading a key.
  pub fn release(&mut self, subscription: QuerySubscription) {
    self.executor.release(subscription);
  }

  /// A reusable trigger for the mutation `endpoint_id`.
  pub fn use_mutation(&self, endpoint_id: &str) -> Result<MutationTrigger, QueryError> {
    let endpoint = self.registry.expect(endpoint_id, EndpointKind::Mutation)?;
    Ok(MutationTrigger {
      endpoint: endpoint.id,
    })
  }

  /// Validate `args` and dispatch the mutation `endpoint_id`. On success
  /// its tags are invalidated before the ticket resolves.
  pub fn mutate<A>(&mut self, endpoint_id: &str, args: &A) -> Result<MutationTicket, QueryError>
  where
    A: Serialize + ?Sized,
  {
    let args = to_args(endpoint_id, args)?;
    let endpoint = self.registry.expect(endpoint_id, EndpointKind::Mutation)?;
    endpoint.validate(&args)?;

    let request = self.transport.send(endpoint, &args);
    Ok(
      self
        .mutations
        .dispatch(endpoint.id, endpoint.invalidates.clone(), request),
    )
  }

  /// Drive the client until `ticket` has its outcome.
  pub async fn resolve(&mut self, mut ticket: MutationTicket) -> Result<Value, QueryError> {
    loop {
      if let Some(outcome) = ticket.try_result() {
        return outcome;
      }
      if !self.wait().await {
        return ticket.try_result().unwrap_or(Err(QueryError::Cancelled));
      }
    }
  }

  /// Invalidate `tags` directly, as a successful mutation would.
  pub fn invalidate(&mut self, tags: &TagSet) -> Invalidation {
    self.executor.invalidate(tags)
  }

  /// Mount an infinite-scroll listing over `endpoint_id`.
  pub fn use_paginated_query<T, F>(
    &mut self,
    endpoint_id: &str,
    filter: &F,
    page_size: usize,
  ) -> Result<PaginatedQuery<T>, QueryError>
  where
    T: DeserializeOwned,
    F: Serialize + ?Sized,
  {
    let filter = to_args(endpoint_id, filter)?;
    PaginatedQuery::mount(self, endpoint_id, filter, page_size)
  }

  /// Register a synchronous callback for changes to `key`.
  pub fn listen(&mut self, key: &CacheKey, listener: impl FnMut(&StoreEvent) + 'static) -> ListenerId {
    self.executor.store_mut().listen(key, listener)
  }

  pub fn unlisten(&mut self, id: ListenerId) -> bool {
    self.executor.store_mut().unlisten(id)
  }

  /// Apply every outcome that has arrived, without waiting. Returns `true`
  /// if anything was applied.
  pub fn poll(&mut self) -> bool {
    let mut applied = false;
    while let Ok(delivery) = self.deliveries.try_recv() {
      self.apply(delivery);
      applied = true;
    }
    applied
  }

  /// Wait for the next outcome and apply it. Returns `false` straight away
  /// when nothing is outstanding.
  pub async fn wait(&mut self) -> bool {
    if self.poll() {
      return true;
    }
    if self.outstanding() == 0 {
      return false;
    }
    match self.deliveries.recv().await {
      Some(delivery) => {
        self.apply(delivery);
        self.poll();
        true
      }
      None => false,
    }
  }

  /// Wait until no request is outstanding, including loads started by
  /// invalidations along the way.
  pub async fn settle(&mut self) {
    while self.wait().await {}
  }

  /// Evict entries nobody has read for `keep_unused_for`.
  pub fn collect_garbage(&mut self) -> usize {
    let Some(cutoff) = chrono::Duration::from_std(self.options.keep_unused_for)
      .ok()
      .and_then(|keep| Utc::now().checked_sub_signed(keep))
    else {
      return 0;
    };
    let evicted = self.executor.collect_garbage(cutoff);
    if evicted > 0 {
      debug!(evicted, "Collected unused cache entries");
    }
    evicted
  }

  /// Requests started and not yet applied.
  pub fn outstanding(&self) -> usize {
    self.executor.in_flight() + self.mutations.pending()
  }

  pub fn in_flight(&self) -> usize {
    self.executor.in_flight()
  }

  pub fn network_calls(&self) -> u64 {
    self.executor.network_calls()
  }

  /// Drop all cached state. Outcomes still in flight are discarded.
  pub fn clear(&mut self) {
    info!(entries = self.executor.store().len(), "Clearing query cache");
    self.executor.clear();
  }

  fn apply(&mut self, delivery: Delivery) {
    match delivery {
      Delivery::Completed(Completion {
        origin: Origin::Load { key, load },
        outcome,
      }) => self.executor.complete(key, load, outcome),
      Delivery::Completed(Completion {
        origin: Origin::Mutation { id },
        outcome,
      }) => self.mutations.complete(id, outcome, &mut self.executor),
      Delivery::Released { key, epoch } => self.executor.unsubscribe(&key, epoch),
    }
  }
}

/// Reusable handle for one mutation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationTrigger {
  endpoint: &'static str,
}

impl MutationTrigger {
  pub fn endpoint(&self) -> &'static str {
    self.endpoint
  }

  pub fn trigger<A>(&self, client: &mut QueryClient, args: &A) -> Result<MutationTicket, QueryError>
  where
    A: Serialize + ?Sized,
  {
    client.mutate(self.endpoint, args)
  }
}

fn to_args<A: Serialize + ?Sized>(endpoint_id: &str, args: &A) -> Result<Value, QueryError> {
  serde_json::to_value(args).map_err(|e| QueryError::validation(endpoint_id, e.to_string()))
}

fn source_for(transport: &Arc<dyn Transport>, endpoint: &Endpoint, args: Value) -> QuerySource {
  let transport = Arc::clone(transport);
  let target = endpoint.clone();
  let source = QuerySource::new(move || transport.send(&target, &args))
    .provides(endpoint.provides.declared().clone());
  match endpoint.provides.deriver() {
    Some(derive) => source.tags_from_result(derive),
    None => source,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{tag_set, EntryStatus, StoreEventKind};
  use crate::ledger::{
    self, Account, Movement, ACCOUNTS_LIST, MOVEMENTS_GET, MOVEMENTS_LIST, MOVEMENTS_UPDATE,
  };
  use crate::testing::ScriptedTransport;
  use serde_json::json;
  use std::cell::RefCell;
  use std::rc::Rc;

  fn client(transport: &Arc<ScriptedTransport>) -> QueryClient {
    QueryClient::new(ledger::registry(), transport.clone(), ClientOptions::default())
  }

  #[tokio::test]
  async fn test_use_query_loads_and_decodes() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([{ "id": 1, "name": "Checking", "balance": "10.50" }]));
    let mut client = client(&transport);

    let accounts = client.use_query("accounts.list", &()).unwrap();
    assert!(client.state(&accounts).is_loading());

    client.settle().await;
    let state = client.read::<Vec<Account>>(&accounts);
    assert!(state.is_success());
    assert_eq!(state.data().map(|a| a[0].name.as_str()), Some("Checking"));
    client.release(accounts);
  }

  #[tokio::test]
  async fn test_validation_error_never_touches_cache() {
    let transport = ScriptedTransport::new();
    let mut client = client(&transport);

    let err = client
      .use_query(MOVEMENTS_LIST, &json!({ "page": "zero", "per_page": 20 }))
      .unwrap_err();
    assert!(matches!(err, QueryError::Validation { .. }));
    assert!(client.store().is_empty());
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_wrong_kind_is_rejected() {
    let transport = ScriptedTransport::new();
    let mut client = client(&transport);
    assert!(matches!(
      client.use_query("accounts.delete", &json!({ "id": 1 })),
      Err(QueryError::WrongEndpointKind { .. })
    ));
    assert!(matches!(
      client.use_mutation("accounts.list"),
      Err(QueryError::WrongEndpointKind { .. })
    ));
  }

  #[tokio::test]
  async fn test_identical_reads_coalesce() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([]));
    let gate = transport.hold("accounts.list");
    let mut client = client(&transport);

    let a = client.use_query("accounts.list", &()).unwrap();
    let b = client.use_query("accounts.list", &Value::Null).unwrap();
    assert_eq!(a.key(), b.key());
    assert_eq!(client.in_flight(), 1);

    gate.open();
    client.settle().await;
    assert_eq!(transport.calls(), 1);
    assert!(client.state(&b).is_success());
    client.release(a);
    client.release(b);
  }

  #[tokio::test]
  async fn test_mutation_invalidates_then_refetches_subscribers() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([{ "id": 1, "name": "Checking", "balance": "1" }]));
    transport.respond("accounts.delete", Value::Null);
    let mut client = client(&transport);

    let accounts = client.use_query("accounts.list", &()).unwrap();
    client.settle().await;
    assert_eq!(transport.calls_to("accounts.list"), 1);

    transport.respond("accounts.list", json!([]));
    let trigger = client.use_mutation("accounts.delete").unwrap();
    let ticket = trigger.trigger(&mut client, &json!({ "id": 1 })).unwrap();
    assert_eq!(client.resolve(ticket).await, Ok(Value::Null));

    // The ticket resolves after invalidation, so the refetch is under way
    let state = client.state(&accounts);
    assert!(state.is_loading());
    assert!(state.data().is_some());

    client.settle().await;
    assert_eq!(transport.calls_to("accounts.list"), 2);
    assert_eq!(client.state(&accounts).data, Some(&json!([])));
    client.release(accounts);
  }

  #[tokio::test]
  async fn test_failed_mutation_leaves_cache_untouched() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([]));
    transport.fail("accounts.delete", QueryError::api(404, "Account not found"));
    let mut client = client(&transport);

    let accounts = client.use_query("accounts.list", &()).unwrap();
    client.settle().await;

    let ticket = client.mutate("accounts.delete", &json!({ "id": 9 })).unwrap();
    assert_eq!(
      client.resolve(ticket).await,
      Err(QueryError::api(404, "Account not found"))
    );
    assert!(client.state(&accounts).is_success());
    assert_eq!(client.in_flight(), 0);
    assert_eq!(transport.calls_to("accounts.list"), 1);
    client.release(accounts);
  }

  #[tokio::test]
  async fn test_per_item_tags_are_invalidatable() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([{ "id": 3, "name": "Savings", "balance": 0 }]));
    let mut client = client(&transport);

    let accounts = client.use_query("accounts.list", &()).unwrap();
    client.settle().await;

    let outcome = client.invalidate(&tag_set(["accounts:3"]));
    assert_eq!(outcome.refetch, vec![accounts.key().clone()]);
    client.settle().await;
    assert_eq!(transport.calls_to("accounts.list"), 2);
    client.release(accounts);
  }

  #[tokio::test]
  async fn test_listeners_see_store_changes() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([]));
    let mut client = client(&transport);
    let key = CacheKey::new("accounts.list", &Value::Null);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    client.listen(&key, move |event| sink.borrow_mut().push(event.kind));

    let accounts = client.use_query("accounts.list", &()).unwrap();
    client.settle().await;
    assert_eq!(
      *seen.borrow(),
      vec![StoreEventKind::Loading, StoreEventKind::Resolved]
    );
    client.release(accounts);
  }

  #[tokio::test]
  async fn test_dropped_handle_is_released_on_poll() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([]));
    let mut client = client(&transport);

    let accounts = client.use_query("accounts.list", &()).unwrap();
    client.settle().await;
    let key = accounts.key().clone();
    drop(accounts);

    assert_eq!(client.entry(&key).unwrap().subscriber_count(), 1);
    client.poll();
    assert_eq!(client.entry(&key).unwrap().subscriber_count(), 0);
    assert_eq!(client.entry(&key).unwrap().status(), EntryStatus::Success);
  }

  #[tokio::test]
  async fn test_garbage_collection_uses_retention() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([]));
    let mut client = QueryClient::new(
      ledger::registry(),
      transport.clone(),
      ClientOptions {
        keep_unused_for: Duration::ZERO,
        ..ClientOptions::default()
      },
    );

    let accounts = client.use_query("accounts.list", &()).unwrap();
    client.settle().await;
    assert_eq!(client.collect_garbage(), 0);

    client.release(accounts);
    assert_eq!(client.collect_garbage(), 1);
    assert!(client.store().is_empty());
  }

  #[tokio::test]
  async fn test_errors_reach_every_subscriber() {
    let transport = ScriptedTransport::new();
    transport.fail("accounts.list", QueryError::transport("connection refused"));
    let mut client = client(&transport);

    let a = client.use_query("accounts.list", &()).unwrap();
    let b = client.use_query("accounts.list", &()).unwrap();
    client.settle().await;

    for sub in [&a, &b] {
      assert_eq!(
        client.state(sub).error(),
        Some(&QueryError::transport("connection refused"))
      );
    }
    client.release(a);
    client.release(b);
  }

  #[tokio::test]
  async fn test_invalidation_during_load_refetches_once_it_lands() {
    let transport = ScriptedTransport::new();
    transport.respond(ACCOUNTS_LIST, json!([{ "id": 1, "name": "Checking", "balance": "1" }]));
    let gate = transport.hold(ACCOUNTS_LIST);
    let mut client = client(&transport);

    let accounts = client.use_query(ACCOUNTS_LIST, &()).unwrap();
    transport.respond(ACCOUNTS_LIST, json!([]));
    let outcome = client.invalidate(&tag_set([ledger::ACCOUNTS]));
    assert_eq!(outcome.deferred, vec![accounts.key().clone()]);
    assert!(outcome.refetch.is_empty());
    assert_eq!(client.in_flight(), 1);

    gate.open();
    client.settle().await;
    assert_eq!(transport.calls_to(ACCOUNTS_LIST), 2);
    let state = client.state(&accounts);
    assert!(state.is_success());
    assert_eq!(state.data, Some(&json!([])));
    client.release(accounts);
  }

  #[tokio::test]
  async fn test_invalidating_unread_load_drops_its_result() {
    let transport = ScriptedTransport::new();
    transport.respond(ACCOUNTS_LIST, json!([]));
    let gate = transport.hold(ACCOUNTS_LIST);
    let mut client = client(&transport);

    let accounts = client.use_query(ACCOUNTS_LIST, &()).unwrap();
    let key = accounts.key().clone();
    client.release(accounts);
    assert!(client.entry(&key).is_some_and(|entry| entry.is_in_flight()));

    let outcome = client.invalidate(&tag_set([ledger::ACCOUNTS]));
    assert_eq!(outcome.evicted, vec![key.clone()]);
    assert!(client.entry(&key).is_none());

    gate.open();
    client.settle().await;
    assert!(client.entry(&key).is_none());
    assert_eq!(client.in_flight(), 0);
    assert_eq!(transport.calls_to(ACCOUNTS_LIST), 1);
  }

  #[tokio::test]
  async fn test_handle_dropped_after_clear_leaves_new_reader_alone() {
    let transport = ScriptedTransport::new();
    transport.respond(ACCOUNTS_LIST, json!([]));
    let mut client = client(&transport);

    let old = client.use_query(ACCOUNTS_LIST, &()).unwrap();
    client.settle().await;
    client.clear();

    let current = client.use_query(ACCOUNTS_LIST, &()).unwrap();
    client.settle().await;
    drop(old);
    client.poll();

    let entry = client.entry(current.key()).unwrap();
    assert_eq!(entry.subscriber_count(), 1);
    assert_eq!(entry.status(), EntryStatus::Success);
    client.release(current);
    assert_eq!(transport.calls_to(ACCOUNTS_LIST), 2);
  }

  #[tokio::test]
  async fn test_renaming_a_movement_reloads_it() {
    let transport = ScriptedTransport::new();
    transport.respond(
      MOVEMENTS_GET,
      json!({ "id": 7, "name": "Groceries", "amount_default_currency": "-42.10" }),
    );
    transport.respond_with(MOVEMENTS_UPDATE, |args| Ok(args.clone()));
    let mut client = client(&transport);

    let movement = client.use_query(MOVEMENTS_GET, &json!({ "id": 7 })).unwrap();
    client.settle().await;
    let name = |client: &QueryClient| client.read::<Movement>(&movement).data.map(|m| m.name);
    assert_eq!(name(&client).as_deref(), Some("Groceries"));

    assert!(matches!(
      client.mutate(MOVEMENTS_UPDATE, &json!({ "id": 7 })),
      Err(QueryError::Validation { .. })
    ));

    transport.respond(
      MOVEMENTS_GET,
      json!({ "id": 7, "name": "Rent", "amount_default_currency": "-42.10" }),
    );
    let ticket = client
      .mutate(MOVEMENTS_UPDATE, &json!({ "id": 7, "name": "Rent", "category_id": 3 }))
      .unwrap();
    assert!(client.resolve(ticket).await.is_ok());
    client.settle().await;

    assert_eq!(transport.calls_to(MOVEMENTS_UPDATE), 1);
    assert_eq!(transport.requests(MOVEMENTS_UPDATE)[0]["name"], json!("Rent"));
    assert_eq!(transport.calls_to(MOVEMENTS_GET), 2);
    assert_eq!(name(&client).as_deref(), Some("Rent"));
    client.release(movement);
  }
}

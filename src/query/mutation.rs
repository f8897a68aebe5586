use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::executor::QueryExecutor;
use super::{spawn_request, DeliverySender, Origin, Request};
use crate::cache::TagSet;
use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(pub(crate) u64);

struct PendingMutation {
  endpoint: String,
  invalidates: TagSet,
  reply: oneshot::Sender<Result<Value, QueryError>>,
}

/// Performs writes and invalidates tags on success.
///
/// Mutations are not optimistic: nothing in the cache changes until the
/// server has accepted the write, and a failed write changes nothing.
pub struct MutationDispatcher {
  deliveries: DeliverySender,
  pending: HashMap<MutationId, PendingMutation>,
  next_id: u64,
}

impl MutationDispatcher {
  pub(crate) fn new(deliveries: DeliverySender) -> Self {
    Self {
      deliveries,
      pending: HashMap::new(),
      next_id: 0,
    }
  }

  /// Start a write. The returned ticket is fulfilled once the outcome has
  /// been applied, i.e. after the invalidation on success.
  pub fn dispatch(
    &mut self,
    endpoint: impl Into<String>,
    invalidates: TagSet,
    request: Request,
  ) -> MutationTicket {
    self.next_id += 1;
    let id = MutationId(self.next_id);
    let endpoint = endpoint.into();
    let (reply, rx) = oneshot::channel();

    debug!(endpoint = %endpoint, mutation = id.0, "Dispatching mutation");
    self.pending.insert(
      id,
      PendingMutation {
        endpoint,
        invalidates,
        reply,
      },
    );
    spawn_request(&self.deliveries, Origin::Mutation { id }, request);

    MutationTicket { id, rx }
  }

  /// Apply the outcome of mutation `id`.
  pub(crate) fn complete(
    &mut self,
    id: MutationId,
    outcome: Result<Value, QueryError>,
    executor: &mut QueryExecutor,
  ) {
    let Some(pending) = self.pending.remove(&id) else {
      warn!(mutation = id.0, "Completion for unknown mutation");
      return;
    };

    match &outcome {
      Ok(_) => {
        info!(endpoint = %pending.endpoint, mutation = id.0, "Mutation succeeded");
        if !pending.invalidates.is_empty() {
          executor.invalidate(&pending.invalidates);
        }
      }
      Err(error) => {
        warn!(endpoint = %pending.endpoint, mutation = id.0, %error, "Mutation failed");
      }
    }

    // The caller may have dropped its ticket
    let _ = pending.reply.send(outcome);
  }

  /// Writes started and not yet applied.
  pub fn pending(&self) -> usize {
    self.pending.len()
  }
}

/// The caller's side of a dispatched mutation.
///
/// Awaiting it only makes progress while the owner of the client keeps
/// applying deliveries, so event loops usually check
/// [`MutationTicket::try_result`] on each tick instead.
#[derive(Debug)]
pub struct MutationTicket {
  id: MutationId,
  rx: oneshot::Receiver<Result<Value, QueryError>>,
}

impl MutationTicket {
  pub fn id(&self) -> MutationId {
    self.id
  }

  /// The outcome, if it has been applied yet.
  pub fn try_result(&mut self) -> Option<Result<Value, QueryError>> {
    match self.rx.try_recv() {
      Ok(outcome) => Some(outcome),
      Err(oneshot::error::TryRecvError::Empty) => None,
      Err(oneshot::error::TryRecvError::Closed) => Some(Err(QueryError::Cancelled)),
    }
  }
}

impl Future for MutationTicket {
  type Output = Result<Value, QueryError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.rx)
      .poll(cx)
      .map(|received| received.unwrap_or(Err(QueryError::Cancelled)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{tag_set, CacheKey, EntryStatus};
  use crate::query::{delivery_channel, Delivery, QuerySource, QuerySubscription};
  use futures::FutureExt;
  use serde_json::json;

  async fn next_mutation(
    rx: &mut crate::query::DeliveryReceiver,
  ) -> (MutationId, Result<Value, QueryError>) {
    loop {
      match rx.recv().await {
        Some(Delivery::Completed(completion)) => {
          if let Origin::Mutation { id } = completion.origin {
            return (id, completion.outcome);
          }
        }
        Some(Delivery::Released { .. }) => {}
        None => panic!("delivery channel closed"),
      }
    }
  }

  async fn cached_movements(
    executor: &mut QueryExecutor,
    rx: &mut crate::query::DeliveryReceiver,
  ) -> (CacheKey, QuerySubscription) {
    let key = CacheKey::new("movements.list", &json!({ "page": 0 }));
    let sub = executor.run(
      key.clone(),
      QuerySource::new(|| async { Ok(json!([1, 2])) }.boxed()).provides(tag_set(["movements"])),
    );
    while executor.in_flight() > 0 {
      if let Some(Delivery::Completed(completion)) = rx.recv().await {
        if let Origin::Load { key, load } = completion.origin {
          executor.complete(key, load, completion.outcome);
        }
      }
    }
    (key, sub)
  }

  #[tokio::test]
  async fn test_success_invalidates_before_reply() {
    let (tx, mut rx) = delivery_channel();
    let mut executor = QueryExecutor::new(tx.clone());
    let mut dispatcher = MutationDispatcher::new(tx);
    let (key, _sub) = cached_movements(&mut executor, &mut rx).await;

    let mut ticket = dispatcher.dispatch(
      "movements.delete",
      tag_set(["movements"]),
      async { Ok(Value::Null) }.boxed(),
    );
    assert!(ticket.try_result().is_none());

    let (id, outcome) = next_mutation(&mut rx).await;
    assert_eq!(id, ticket.id());
    dispatcher.complete(id, outcome, &mut executor);

    assert_eq!(executor.store().get(&key).unwrap().status(), EntryStatus::Loading);
    assert_eq!(ticket.try_result(), Some(Ok(Value::Null)));
    assert_eq!(dispatcher.pending(), 0);
  }

  #[tokio::test]
  async fn test_failure_leaves_cache_untouched() {
    let (tx, mut rx) = delivery_channel();
    let mut executor = QueryExecutor::new(tx.clone());
    let mut dispatcher = MutationDispatcher::new(tx);
    let (key, _sub) = cached_movements(&mut executor, &mut rx).await;
    let revision = executor.store().get(&key).unwrap().revision();

    let ticket = dispatcher.dispatch(
      "movements.delete",
      tag_set(["movements"]),
      async { Err(QueryError::api(409, "movement is reconciled")) }.boxed(),
    );
    let (id, outcome) = next_mutation(&mut rx).await;
    dispatcher.complete(id, outcome, &mut executor);

    let entry = executor.store().get(&key).unwrap();
    assert_eq!(entry.status(), EntryStatus::Success);
    assert_eq!(entry.revision(), revision);
    assert_eq!(executor.in_flight(), 0);
    assert_eq!(ticket.await, Err(QueryError::api(409, "movement is reconciled")));
  }

  #[tokio::test]
  async fn test_dropped_dispatcher_cancels_ticket() {
    let (tx, _rx) = delivery_channel();
    let mut dispatcher = MutationDispatcher::new(tx);
    let mut ticket = dispatcher.dispatch(
      "accounts.delete",
      TagSet::new(),
      futures::future::pending().boxed(),
    );
    drop(dispatcher);
    assert_eq!(ticket.try_result(), Some(Err(QueryError::Cancelled)));
  }
}

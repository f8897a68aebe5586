//! Query execution and mutation dispatch.
//!
//! Inspired by TanStack Query / RTK Query: reads go through the
//! [`QueryExecutor`], which coalesces identical requests and writes results
//! back into the cache store; writes go through the
//! [`MutationDispatcher`], which invalidates tags on success.
//!
//! Requests run as spawned tokio tasks. Their outcomes come back over a
//! channel and are applied by whoever owns the store, so the store itself
//! is only ever touched from one task.

mod executor;
mod mutation;
mod state;

pub use executor::{Fetcher, QueryExecutor, QuerySource, QuerySubscription};
pub use mutation::{MutationDispatcher, MutationId, MutationTicket};
pub use state::QueryState;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::cache::{CacheKey, LoadId};
use crate::error::QueryError;

/// A request in flight: resolves to the raw JSON result.
pub type Request = BoxFuture<'static, Result<Value, QueryError>>;

/// Who is waiting for a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Origin {
  Load { key: CacheKey, load: LoadId },
  Mutation { id: MutationId },
}

#[derive(Debug)]
pub(crate) struct Completion {
  pub origin: Origin,
  pub outcome: Result<Value, QueryError>,
}

/// Messages for the owner of the store.
#[derive(Debug)]
pub(crate) enum Delivery {
  Completed(Completion),
  /// A subscription handle was dropped without being released. `epoch`
  /// is the executor epoch the handle was issued in.
  Released { key: CacheKey, epoch: u64 },
}

pub(crate) type DeliverySender = mpsc::UnboundedSender<Delivery>;
pub(crate) type DeliveryReceiver = mpsc::UnboundedReceiver<Delivery>;

pub(crate) fn delivery_channel() -> (DeliverySender, DeliveryReceiver) {
  mpsc::unbounded_channel()
}

/// Reports a request's outcome exactly once. If the task carrying it goes
/// away first (panic, runtime shutdown), it reports `Cancelled` instead,
/// so nobody waits forever for an answer.
struct CompletionGuard {
  tx: Option<DeliverySender>,
  origin: Option<Origin>,
}

impl CompletionGuard {
  fn finish(mut self, outcome: Result<Value, QueryError>) {
    self.send(outcome);
  }

  fn send(&mut self, outcome: Result<Value, QueryError>) {
    if let (Some(tx), Some(origin)) = (self.tx.take(), self.origin.take()) {
      // Ignore send errors - the owner may have been torn down
      let _ = tx.send(Delivery::Completed(Completion { origin, outcome }));
    }
  }
}

impl Drop for CompletionGuard {
  fn drop(&mut self) {
    self.send(Err(QueryError::Cancelled));
  }
}

/// Run `request` on the runtime and deliver its outcome tagged with `origin`.
pub(crate) fn spawn_request(tx: &DeliverySender, origin: Origin, request: Request) {
  let guard = CompletionGuard {
    tx: Some(tx.clone()),
    origin: Some(origin),
  };
  tokio::spawn(async move {
    let outcome = request.await;
    guard.finish(outcome);
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::FutureExt;
  use serde_json::json;

  #[tokio::test]
  async fn test_spawned_request_reports_outcome() {
    let (tx, mut rx) = delivery_channel();
    spawn_request(
      &tx,
      Origin::Mutation { id: MutationId(1) },
      async { Ok(json!({"ok": true})) }.boxed(),
    );

    match rx.recv().await {
      Some(Delivery::Completed(completion)) => {
        assert_eq!(completion.origin, Origin::Mutation { id: MutationId(1) });
        assert_eq!(completion.outcome, Ok(json!({"ok": true})));
      }
      other => panic!("unexpected delivery: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_panicking_request_reports_cancelled() {
    let (tx, mut rx) = delivery_channel();
    let request: Request = Box::pin(async {
      if true {
        panic!("transport blew up");
      }
      Ok(Value::Null)
    });
    spawn_request(&tx, Origin::Mutation { id: MutationId(2) }, request);

    match rx.recv().await {
      Some(Delivery::Completed(completion)) => {
        assert_eq!(completion.outcome, Err(QueryError::Cancelled));
      }
      other => panic!("unexpected delivery: {:?}", other),
    }
  }
}

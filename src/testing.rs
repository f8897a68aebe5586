//! Test doubles shared by the unit tests.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::endpoint::Endpoint;
use crate::error::QueryError;
use crate::transport::Transport;

type Responder = Arc<dyn Fn(&Value) -> Result<Value, QueryError> + Send + Sync>;
type Matcher = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Holds matching requests until opened. Dropping the gate opens it too.
pub(crate) struct Gate {
  tx: watch::Sender<bool>,
}

impl Gate {
  pub fn open(&self) {
    let _ = self.tx.send(true);
  }
}

#[derive(Default)]
struct Script {
  responders: HashMap<String, Responder>,
  gates: Vec<(String, Matcher, watch::Receiver<bool>)>,
  calls: Vec<(String, Value)>,
}

/// In-memory transport answering from per-endpoint scripts.
///
/// Responses are computed when the request is sent; a gate only delays
/// when the answer is delivered.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
  script: Mutex<Script>,
}

impl ScriptedTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  fn script(&self) -> MutexGuard<'_, Script> {
    match self.script.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  /// Answer every call to `endpoint` with `value`.
  pub fn respond(&self, endpoint: &str, value: Value) {
    self.respond_with(endpoint, move |_| Ok(value.clone()));
  }

  /// Fail every call to `endpoint` with `error`.
  pub fn fail(&self, endpoint: &str, error: QueryError) {
    self.respond_with(endpoint, move |_| Err(error.clone()));
  }

  /// Answer calls to `endpoint` from their arguments.
  pub fn respond_with<F>(&self, endpoint: &str, responder: F)
  where
    F: Fn(&Value) -> Result<Value, QueryError> + Send + Sync + 'static,
  {
    self
      .script()
      .responders
      .insert(endpoint.to_string(), Arc::new(responder));
  }

  /// Hold every call to `endpoint` sent from now on.
  pub fn hold(&self, endpoint: &str) -> Gate {
    self.hold_when(endpoint, |_| true)
  }

  /// Hold calls to `endpoint` whose arguments match.
  pub fn hold_when<F>(&self, endpoint: &str, matches: F) -> Gate
  where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
  {
    let (tx, rx) = watch::channel(false);
    self
      .script()
      .gates
      .push((endpoint.to_string(), Arc::new(matches), rx));
    Gate { tx }
  }

  pub fn calls(&self) -> usize {
    self.script().calls.len()
  }

  pub fn calls_to(&self, endpoint: &str) -> usize {
    self.script().calls.iter().filter(|(e, _)| e == endpoint).count()
  }

  /// Arguments of every call to `endpoint`, in order.
  pub fn requests(&self, endpoint: &str) -> Vec<Value> {
    self
      .script()
      .calls
      .iter()
      .filter(|(e, _)| e == endpoint)
      .map(|(_, args)| args.clone())
      .collect()
  }
}

impl Transport for ScriptedTransport {
  fn send(&self, endpoint: &Endpoint, args: &Value) -> BoxFuture<'static, Result<Value, QueryError>> {
    let mut script = self.script();
    script.calls.push((endpoint.id.to_string(), args.clone()));

    let outcome = match script.responders.get(endpoint.id) {
      Some(responder) => responder(args),
      None => Err(QueryError::api(404, format!("no script for {}", endpoint.id))),
    };
    let gates: Vec<watch::Receiver<bool>> = script
      .gates
      .iter()
      .filter(|(id, matches, _)| id == endpoint.id && matches(args))
      .map(|(_, _, rx)| rx.clone())
      .collect();

    async move {
      for mut gate in gates {
        // A dropped gate counts as open
        let _ = gate.wait_for(|open| *open).await;
      }
      tokio::task::yield_now().await;
      outcome
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::endpoint::{Method, Route};
  use serde_json::json;
  use std::time::Duration;

  #[tokio::test]
  async fn test_gate_holds_until_opened() {
    let transport = ScriptedTransport::new();
    transport.respond("accounts.list", json!([]));
    let gate = transport.hold("accounts.list");
    let endpoint = Endpoint::query("accounts.list", Route::new(Method::Get, "users/me/accounts/"));

    let request = tokio::spawn(transport.send(&endpoint, &Value::Null));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!request.is_finished());

    gate.open();
    assert_eq!(request.await.unwrap(), Ok(json!([])));
    assert_eq!(transport.calls_to("accounts.list"), 1);
  }
}

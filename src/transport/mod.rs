//! The seam between the executor and the network.

mod http;

pub use http::HttpTransport;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::endpoint::Endpoint;
use crate::error::QueryError;

/// Anything that can take validated arguments for an endpoint and
/// asynchronously produce a JSON result or an error.
///
/// The returned future must not borrow from `self`, so it can run on a
/// spawned task.
pub trait Transport: Send + Sync {
  fn send(&self, endpoint: &Endpoint, args: &Value) -> BoxFuture<'static, Result<Value, QueryError>>;
}

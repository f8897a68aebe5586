use futures::future::{self, BoxFuture};
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::Transport;
use crate::endpoint::{Endpoint, Method};
use crate::error::QueryError;

/// JSON-over-HTTP transport for a REST API rooted at one base URL.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str, timeout: Duration, token: Option<&str>) -> Result<Self, QueryError> {
    let base_url = parse_base_url(base_url)?;

    let mut headers = HeaderMap::new();
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| QueryError::transport(format!("invalid API token: {}", e)))?;
      headers.insert(AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .default_headers(headers)
      .build()
      .map_err(|e| QueryError::transport(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn request(&self, endpoint: &Endpoint, args: &Value) -> Result<reqwest::RequestBuilder, QueryError> {
    let (path, remaining) = endpoint
      .route
      .fill(args)
      .map_err(|message| QueryError::validation(endpoint.id, message))?;
    let method = endpoint.route.method;

    let url = if method.uses_query_string() {
      build_url(&self.base_url, &path, &remaining)?
    } else {
      build_url(&self.base_url, &path, &Map::new())?
    };

    let builder = match method {
      Method::Get => self.client.get(url),
      Method::Delete => self.client.delete(url),
      Method::Post => self.client.post(url).json(&Value::Object(remaining)),
      Method::Put => self.client.put(url).json(&Value::Object(remaining)),
    };
    Ok(builder)
  }
}

impl Transport for HttpTransport {
  fn send(&self, endpoint: &Endpoint, args: &Value) -> BoxFuture<'static, Result<Value, QueryError>> {
    let request = match self.request(endpoint, args) {
      Ok(request) => request,
      Err(e) => return future::ready(Err(e)).boxed(),
    };
    let id = endpoint.id;

    async move {
      let response = request
        .send()
        .await
        .map_err(|e| QueryError::transport(e.to_string()))?;
      let status = response.status();
      debug!(endpoint = id, status = status.as_u16(), "HTTP response");

      let body = response
        .text()
        .await
        .map_err(|e| QueryError::transport(e.to_string()))?;

      if !status.is_success() {
        return Err(api_error(status, &body));
      }
      if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return Ok(Value::Null);
      }
      serde_json::from_str(&body).map_err(|e| QueryError::decode(e.to_string()))
    }
    .boxed()
  }
}

/// Parse the API root, making sure relative joins land beneath it.
fn parse_base_url(raw: &str) -> Result<Url, QueryError> {
  let normalized = if raw.ends_with('/') {
    raw.to_string()
  } else {
    format!("{}/", raw)
  };
  Url::parse(&normalized).map_err(|e| QueryError::transport(format!("invalid API url {}: {}", raw, e)))
}

/// Join `path` onto `base` and append `query` as query pairs. Null values
/// are omitted and arrays become repeated pairs.
pub(crate) fn build_url(base: &Url, path: &str, query: &Map<String, Value>) -> Result<Url, QueryError> {
  let mut url = base
    .join(path.trim_start_matches('/'))
    .map_err(|e| QueryError::transport(format!("invalid path {}: {}", path, e)))?;

  let mut pairs: Vec<(&str, String)> = Vec::new();
  for (name, value) in query {
    match value {
      Value::Null => {}
      Value::Array(items) => pairs.extend(
        items
          .iter()
          .filter(|item| !item.is_null())
          .map(|item| (name.as_str(), query_value(item))),
      ),
      other => pairs.push((name.as_str(), query_value(other))),
    }
  }

  if !pairs.is_empty() {
    url.query_pairs_mut().extend_pairs(pairs);
  }
  Ok(url)
}

fn query_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Turn an error response into `QueryError::Api`, preferring the server's
/// `detail` (or `message`) field over the raw body.
pub(crate) fn api_error(status: StatusCode, body: &str) -> QueryError {
  let detail = serde_json::from_str::<Value>(body).ok().and_then(|v| {
    match v.get("detail").or_else(|| v.get("message")) {
      Some(Value::String(s)) => Some(s.clone()),
      Some(other) => Some(other.to_string()),
      None => None,
    }
  });

  let message = detail.unwrap_or_else(|| {
    let trimmed = body.trim();
    if trimmed.is_empty() {
      status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
      trimmed.to_string()
    }
  });
  QueryError::api(status.as_u16(), message)
}

//! Error types shared by the cache, executor and transports.

/// Everything that can go wrong between a caller asking for data and the
/// data arriving.
///
/// The error is `Clone` because one stored failure is handed to every
/// subscriber of the entry that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
  /// The request never reached the server or the response never came back.
  #[error("transport error: {message}")]
  Transport { message: String },

  /// The server answered with a non-success status.
  #[error("API error {status}: {message}")]
  Api { status: u16, message: String },

  /// Arguments did not match the endpoint's declared shape. Raised before
  /// anything touches the cache or the network.
  #[error("invalid arguments for {endpoint}: {message}")]
  Validation { endpoint: String, message: String },

  /// A result arrived but does not have the shape the caller asked for.
  #[error("failed to decode result: {message}")]
  Decode { message: String },

  #[error("unknown endpoint: {0}")]
  UnknownEndpoint(String),

  #[error("endpoint {endpoint} is not a {expected} endpoint")]
  WrongEndpointKind { endpoint: String, expected: &'static str },

  /// The task carrying the request went away without reporting back.
  #[error("request was cancelled")]
  Cancelled,
}

impl QueryError {
  pub fn transport(message: impl Into<String>) -> Self {
    Self::Transport {
      message: message.into(),
    }
  }

  pub fn api(status: u16, message: impl Into<String>) -> Self {
    Self::Api {
      status,
      message: message.into(),
    }
  }

  pub fn validation(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Validation {
      endpoint: endpoint.into(),
      message: message.into(),
    }
  }

  pub fn decode(message: impl Into<String>) -> Self {
    Self::Decode {
      message: message.into(),
    }
  }

  /// HTTP status code, for API errors.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Api { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Whether repeating the same request could plausibly succeed.
  ///
  /// The executor never retries by itself; this exists for callers that
  /// want their own retry policy.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Transport { .. } | Self::Cancelled => true,
      Self::Api { status, .. } => *status >= 500 || *status == 429,
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_only_for_api_errors() {
    assert_eq!(QueryError::api(404, "not found").status(), Some(404));
    assert_eq!(QueryError::transport("connection refused").status(), None);
  }

  #[test]
  fn test_retryable_classification() {
    assert!(QueryError::transport("timed out").is_retryable());
    assert!(QueryError::api(503, "unavailable").is_retryable());
    assert!(QueryError::api(429, "slow down").is_retryable());
    assert!(!QueryError::api(422, "bad input").is_retryable());
    assert!(!QueryError::validation("movements.list", "page must be an integer").is_retryable());
  }

  #[test]
  fn test_display_carries_diagnostics() {
    let err = QueryError::api(403, "Not authenticated");
    assert_eq!(err.to_string(), "API error 403: Not authenticated");
  }
}

//! Core types for intercepted requests and stored responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How a request was issued by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  /// Everything else (subresource, fetch call, ...)
  Standard,
}

/// An intercepted request, reduced to what routing needs.
///
/// Only the method, the origin-relative path and the navigation flag are
/// inspected; bodies never influence routing decisions.
#[derive(Debug, Clone)]
pub struct StoredRequest {
  pub method: String,
  pub path: String,
  pub mode: RequestMode,
}

impl StoredRequest {
  /// A plain GET request for the given path.
  pub fn get(path: &str) -> Self {
    Self {
      method: "GET".to_string(),
      path: path.to_string(),
      mode: RequestMode::Standard,
    }
  }

  /// A top-level navigation to the given path.
  pub fn navigate(path: &str) -> Self {
    Self {
      method: "GET".to_string(),
      path: path.to_string(),
      mode: RequestMode::Navigate,
    }
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// Storage key for this request. Mode is deliberately excluded so a
  /// navigation and a plain fetch of the same path share one cache entry.
  pub fn key(&self) -> RequestKey {
    RequestKey::of(&self.method, &self.path)
  }
}

/// Stable, fixed-length request identity used as the storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
  /// Derive the key from method + path.
  pub fn of(method: &str, path: &str) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(method.to_uppercase().as_bytes());
    hasher.update(b" ");
    hasher.update(path.as_bytes());
    Self(hex::encode(hasher.finalize()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

/// A response as held in a cache store: status, headers and body bytes.
///
/// Storing serializes a copy; the value handed back to the caller is never
/// consumed by the cache write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl StoredResponse {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header value with the given name, case-insensitive.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// The synthesized offline API response: a structured 503 the page can
  /// branch on instead of a raw network error.
  pub fn offline_json(message: &str) -> Self {
    let body = serde_json::json!({
      "error": message,
      "offline": true,
    });

    Self {
      status: 503,
      headers: vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Cache-Control".to_string(), "no-cache".to_string()),
      ],
      body: body.to_string().into_bytes(),
    }
  }

  /// An empty 503 for offline misses outside the API space.
  pub fn unavailable() -> Self {
    Self {
      status: 503,
      headers: vec![("Cache-Control".to_string(), "no-cache".to_string())],
      body: Vec::new(),
    }
  }
}

/// A stored response together with its storage timestamp.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub response: StoredResponse,
  pub stored_at: DateTime<Utc>,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
  /// Fresh response from the live network
  Network,
  /// Matching entry from a cache store
  Cache,
  /// The cached root document, served in place of an unreachable navigation
  OfflineFallback,
  /// Built locally because neither network nor cache had anything
  Synthesized,
}

impl std::fmt::Display for ServeSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ServeSource::Network => write!(f, "network"),
      ServeSource::Cache => write!(f, "cache"),
      ServeSource::OfflineFallback => write!(f, "offline-fallback"),
      ServeSource::Synthesized => write!(f, "synthesized"),
    }
  }
}

/// The router's answer to an intercepted request.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: StoredResponse,
  pub source: ServeSource,
}

impl Served {
  pub fn network(response: StoredResponse) -> Self {
    Self {
      response,
      source: ServeSource::Network,
    }
  }

  pub fn cached(response: StoredResponse) -> Self {
    Self {
      response,
      source: ServeSource::Cache,
    }
  }

  pub fn fallback(response: StoredResponse) -> Self {
    Self {
      response,
      source: ServeSource::OfflineFallback,
    }
  }

  pub fn synthesized(response: StoredResponse) -> Self {
    Self {
      response,
      source: ServeSource::Synthesized,
    }
  }
}

/// An order captured while offline, awaiting replay.
#[derive(Debug, Clone)]
pub struct PendingOrder {
  /// Generated id, stable across replay attempts
  pub id: String,
  /// JSON payload exactly as the page submitted it
  pub payload: Vec<u8>,
  pub queued_at: DateTime<Utc>,
}

//! Network access behind a trait so strategies and tests can swap it out.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use crate::config::RouterConfig;
use crate::store::{StoredRequest, StoredResponse};

/// The live-network side of every strategy.
///
/// `fetch` fails only on transport errors (unreachable, timeout); an HTTP
/// error status is still an `Ok` response, mirroring how the page's own
/// fetches behave. Strategies decide what an error status means.
#[async_trait]
pub trait NetworkFetch: Send + Sync {
  async fn fetch(&self, request: &StoredRequest) -> Result<StoredResponse>;

  /// POST a JSON payload, used by the order replay.
  async fn post_json(&self, path: &str, payload: &[u8]) -> Result<StoredResponse>;
}

/// reqwest-backed network client.
pub struct HttpNetwork {
  http: reqwest::Client,
  base: Url,
}

impl HttpNetwork {
  pub fn new(config: &RouterConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.network_timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    let base = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", config.origin, e))?;

    Ok(Self { http, base })
  }

  fn absolute(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid request path {}: {}", path, e))
  }
}

#[async_trait]
impl NetworkFetch for HttpNetwork {
  async fn fetch(&self, request: &StoredRequest) -> Result<StoredResponse> {
    let url = self.absolute(&request.path)?;
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let response = self
      .http
      .request(method, url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Network error fetching {}: {}", url, e))?;

    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", url, e))?;

    tracing::debug!(path = %request.path, status, bytes = body.len(), "fetched");

    Ok(StoredResponse::new(status, headers, body.to_vec()))
  }

  async fn post_json(&self, path: &str, payload: &[u8]) -> Result<StoredResponse> {
    let url = self.absolute(path)?;

    let response = self
      .http
      .post(url.clone())
      .header("Content-Type", "application/json")
      .body(payload.to_vec())
      .send()
      .await
      .map_err(|e| eyre!("Network error posting to {}: {}", url, e))?;

    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", url, e))?;

    Ok(StoredResponse::new(status, headers, body.to_vec()))
  }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
  headers
    .iter()
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.as_str().to_string(), v.to_string()))
    })
    .collect()
}

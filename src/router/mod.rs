//! Request routing: pick one strategy per intercepted request and run it.
//!
//! The dispatch table is explicit: classification tag -> strategy method.
//! Every strategy resolves to a `Served` value; network failures never cross
//! a strategy boundary as errors, they turn into cache fallbacks or
//! synthesized responses. `Err` from `handle` means a storage fault only.

mod classify;

pub use classify::{classify, RequestClass};

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::net::NetworkFetch;
use crate::store::{Served, StoreBackend, StoredRequest, StoredResponse};

/// The request classifier and strategy dispatcher.
///
/// Owns the cache stores' contents exclusively; pages only ever see the
/// responses it returns. Constructed once at process start from an explicit
/// configuration, no global state.
pub struct Router<S, N> {
  backend: Arc<S>,
  net: Arc<N>,
  config: RouterConfig,
}

impl<S: StoreBackend, N: NetworkFetch> Router<S, N> {
  pub fn new(backend: Arc<S>, net: Arc<N>, config: RouterConfig) -> Self {
    Self {
      backend,
      net,
      config,
    }
  }

  /// Handle one intercepted request, returning a response and its source.
  pub async fn handle(&self, request: &StoredRequest) -> Result<Served> {
    let class = classify(request, &self.config.routes);
    debug!(path = %request.path, %class, "routing request");

    let served = match class {
      RequestClass::Navigation => self.navigation(request).await?,
      RequestClass::StaticAsset => self.static_asset(request).await?,
      RequestClass::Api => self.api(request).await?,
      RequestClass::Default => self.passthrough(request).await?,
    };

    debug!(path = %request.path, source = %served.source, status = served.response.status, "served");
    Ok(served)
  }

  /// Navigation: network first, then cached match, then the cached root
  /// document as the offline fallback.
  async fn navigation(&self, request: &StoredRequest) -> Result<Served> {
    match self.net.fetch(request).await {
      Ok(response) => {
        self.store_best_effort(&self.config.stores.dynamic_name(), request, &response);
        Ok(Served::network(response))
      }
      Err(e) => {
        debug!(path = %request.path, error = %e, "navigation fetch failed, falling back");

        if let Some(entry) = self.backend.get_any(&request.key())? {
          return Ok(Served::cached(entry.response));
        }

        let root = StoredRequest::navigate(&self.config.root_document);
        match self.backend.get_any(&root.key())? {
          Some(entry) => Ok(Served::fallback(entry.response)),
          None => Ok(Served::synthesized(StoredResponse::unavailable())),
        }
      }
    }
  }

  /// Static assets: cache first; a hit never touches the network.
  async fn static_asset(&self, request: &StoredRequest) -> Result<Served> {
    if let Some(entry) = self.backend.get_any(&request.key())? {
      return Ok(Served::cached(entry.response));
    }

    match self.net.fetch(request).await {
      Ok(response) => {
        self.store_best_effort(&self.config.stores.static_name(), request, &response);
        Ok(Served::network(response))
      }
      Err(e) => {
        debug!(path = %request.path, error = %e, "static fetch failed with no cached copy");
        Ok(Served::synthesized(StoredResponse::unavailable()))
      }
    }
  }

  /// API: network first with a status gate on caching, cached match on
  /// failure, structured offline JSON as the last resort.
  async fn api(&self, request: &StoredRequest) -> Result<Served> {
    match self.net.fetch(request).await {
      Ok(response) => {
        // Only 200s are cached; error responses must not mask a later retry
        if response.status == 200 {
          self.store_best_effort(&self.config.stores.dynamic_name(), request, &response);
        }
        Ok(Served::network(response))
      }
      Err(e) => {
        debug!(path = %request.path, error = %e, "api fetch failed, falling back");

        match self.backend.get_any(&request.key())? {
          Some(entry) => Ok(Served::cached(entry.response)),
          None => Ok(Served::synthesized(StoredResponse::offline_json(
            &self.config.offline_message,
          ))),
        }
      }
    }
  }

  /// Everything else: network first, never cached, cached match as the only
  /// fallback.
  async fn passthrough(&self, request: &StoredRequest) -> Result<Served> {
    match self.net.fetch(request).await {
      Ok(response) => Ok(Served::network(response)),
      Err(e) => {
        debug!(path = %request.path, error = %e, "passthrough fetch failed");

        match self.backend.get_any(&request.key())? {
          Some(entry) => Ok(Served::cached(entry.response)),
          None => Ok(Served::synthesized(StoredResponse::unavailable())),
        }
      }
    }
  }

  /// Write a copy of the response into a store. Best-effort: a failed write
  /// is logged and the response already chosen is unaffected.
  fn store_best_effort(&self, store: &str, request: &StoredRequest, response: &StoredResponse) {
    if let Err(e) = self.backend.put(store, &request.key(), response) {
      warn!(path = %request.path, store, error = %e, "cache write failed");
    }
  }
}

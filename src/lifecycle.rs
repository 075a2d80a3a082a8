//! Worker lifecycle: install (atomic manifest) and activate (purge stale
//! store generations).

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RouterConfig;
use crate::net::NetworkFetch;
use crate::store::{RequestKey, StoreBackend, StoredRequest, StoredResponse};

/// Lifecycle states. Transitions only move forward; a failed install stays
/// in `Installing` and the attempt surfaces as an error to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  Installed,
  Activating,
  Active,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Active => write!(f, "active"),
    }
  }
}

/// Brings the cache stores to a consistent state across version upgrades.
pub struct Lifecycle<S> {
  backend: Arc<S>,
  config: RouterConfig,
  state: WorkerState,
}

impl<S: StoreBackend> Lifecycle<S> {
  pub fn new(backend: Arc<S>, config: RouterConfig) -> Self {
    Self {
      backend,
      config,
      state: WorkerState::Installing,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Fetch every manifest entry and commit them to the static store as one
  /// batch. All-or-nothing: any failed or non-success fetch aborts the
  /// install and nothing is committed.
  ///
  /// Re-installing an unchanged manifest against an already-populated store
  /// is an observable no-op (same key set, entries upserted in place).
  pub async fn install<N: NetworkFetch>(&mut self, net: &N) -> Result<usize> {
    let store = self.config.stores.static_name();
    info!(store = %store, entries = self.config.manifest.len(), "installing");

    let mut fetched: Vec<(RequestKey, StoredResponse)> =
      Vec::with_capacity(self.config.manifest.len());

    for path in &self.config.manifest {
      let request = StoredRequest::get(path);

      let response = net
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Install failed fetching manifest entry {}: {}", path, e))?;

      if !response.is_success() {
        return Err(eyre!(
          "Install failed: manifest entry {} returned status {}",
          path,
          response.status
        ));
      }

      debug!(path = %path, bytes = response.body.len(), "manifest entry fetched");
      fetched.push((request.key(), response));
    }

    self.backend.put_many(&store, &fetched)?;
    self.state = WorkerState::Installed;

    info!(store = %store, entries = fetched.len(), "install complete");
    Ok(fetched.len())
  }

  /// Delete every store generation this application owns that is neither the
  /// current static nor the current dynamic store, then take control.
  pub fn activate(&mut self) -> Result<Vec<String>> {
    self.state = WorkerState::Activating;

    let mut purged = Vec::new();
    for name in self.backend.store_names()? {
      if self.config.stores.owns(&name) && !self.config.stores.is_current(&name) {
        info!(store = %name, "deleting stale store generation");
        self.backend.delete_store(&name)?;
        purged.push(name);
      }
    }

    self.state = WorkerState::Active;
    info!(purged = purged.len(), "activation complete");
    Ok(purged)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::testing::FakeNetwork;
  use crate::store::SqliteBackend;

  fn asset(body: &str) -> StoredResponse {
    StoredResponse::new(200, Vec::new(), body.as_bytes().to_vec())
  }

  fn config() -> RouterConfig {
    RouterConfig {
      manifest: vec![
        "/".to_string(),
        "/static/css/styles.css".to_string(),
        "/static/js/main.js".to_string(),
      ],
      ..RouterConfig::default()
    }
  }

  fn online_net(config: &RouterConfig) -> FakeNetwork {
    let net = FakeNetwork::online();
    for path in &config.manifest {
      net.route(path, asset(path));
    }
    net
  }

  #[tokio::test]
  async fn test_install_populates_every_manifest_entry() {
    let config = config();
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let net = online_net(&config);
    let mut lifecycle = Lifecycle::new(Arc::clone(&backend), config.clone());

    assert_eq!(lifecycle.state(), WorkerState::Installing);
    let count = lifecycle.install(&net).await.unwrap();

    assert_eq!(count, 3);
    assert_eq!(lifecycle.state(), WorkerState::Installed);

    let store = config.stores.static_name();
    for path in &config.manifest {
      let key = StoredRequest::get(path).key();
      assert!(backend.get(&store, &key).unwrap().is_some(), "missing {path}");
    }
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let config = config();
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());

    // one manifest entry has no route and will fail
    let net = FakeNetwork::online();
    net.route("/", asset("home"));
    net.route("/static/css/styles.css", asset("css"));

    let mut lifecycle = Lifecycle::new(Arc::clone(&backend), config.clone());
    let result = lifecycle.install(&net).await;

    assert!(result.is_err());
    assert_eq!(lifecycle.state(), WorkerState::Installing);
    assert_eq!(backend.entry_count(&config.stores.static_name()).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_install_rejects_error_statuses() {
    let config = config();
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());

    let net = online_net(&config);
    net.route("/static/js/main.js", StoredResponse::new(404, Vec::new(), Vec::new()));

    let mut lifecycle = Lifecycle::new(Arc::clone(&backend), config.clone());
    assert!(lifecycle.install(&net).await.is_err());
    assert_eq!(backend.entry_count(&config.stores.static_name()).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_reinstall_is_idempotent() {
    let config = config();
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let net = online_net(&config);

    let mut lifecycle = Lifecycle::new(Arc::clone(&backend), config.clone());
    lifecycle.install(&net).await.unwrap();
    lifecycle.install(&net).await.unwrap();

    assert_eq!(
      backend.entry_count(&config.stores.static_name()).unwrap(),
      config.manifest.len() as u64
    );
  }

  #[tokio::test]
  async fn test_activate_purges_stale_generations_only() {
    let config = config();
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let key = StoredRequest::get("/").key();
    let prefix = &config.stores.prefix;

    // current generations, a stale one, and a store owned by someone else
    backend.put(&config.stores.static_name(), &key, &asset("a")).unwrap();
    backend.put(&config.stores.dynamic_name(), &key, &asset("b")).unwrap();
    backend.put(&format!("{prefix}-static-v0.9.0"), &key, &asset("old")).unwrap();
    backend.put(&format!("{prefix}-dynamic-v0.9.0"), &key, &asset("old")).unwrap();
    backend.put("otherapp-static-v1.0.0", &key, &asset("foreign")).unwrap();

    let mut lifecycle = Lifecycle::new(Arc::clone(&backend), config.clone());
    let purged = lifecycle.activate().unwrap();

    assert_eq!(lifecycle.state(), WorkerState::Active);
    assert_eq!(
      purged,
      vec![
        format!("{prefix}-dynamic-v0.9.0"),
        format!("{prefix}-static-v0.9.0"),
      ]
    );

    let names = backend.store_names().unwrap();
    assert!(names.contains(&config.stores.static_name()));
    assert!(names.contains(&config.stores.dynamic_name()));
    assert!(names.contains(&"otherapp-static-v1.0.0".to_string()));
    assert_eq!(names.len(), 3);
  }
}

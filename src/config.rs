use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration for the cache router.
///
/// Every knob the router needs is injected through this struct: the store
/// naming scheme, the install-time manifest, the URL routing rules, and the
/// origin the live fetches go to. There are no module-level globals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
  /// Origin the live network fetches are issued against
  pub origin: String,
  pub stores: StoreConfig,
  /// URL paths guaranteed present in the static store after install
  pub manifest: Vec<String>,
  pub routes: RouteRules,
  /// Body of the `error` field in the synthesized offline API response
  pub offline_message: String,
  /// Path of the document served as the navigation fallback when offline
  pub root_document: String,
  /// Endpoint queued orders are replayed against
  pub orders_endpoint: String,
  /// Background-sync tag that triggers order replay; other tags are ignored
  pub sync_tag: String,
  /// Timeout applied to every live fetch, in seconds
  pub network_timeout_secs: u64,
}

impl Default for RouterConfig {
  fn default() -> Self {
    Self {
      origin: "http://127.0.0.1:8000".to_string(),
      stores: StoreConfig::default(),
      manifest: vec![
        "/".to_string(),
        "/static/css/styles.css".to_string(),
        "/static/css/bootstrap.min.css".to_string(),
        "/static/js/main.js".to_string(),
        "/static/js/cart.js".to_string(),
        "/static/images/logo.png".to_string(),
        "/manifest.json".to_string(),
      ],
      routes: RouteRules::default(),
      offline_message: "You are offline. Please check your internet connection.".to_string(),
      root_document: "/".to_string(),
      orders_endpoint: "/api/orders/".to_string(),
      sync_tag: "background-sync-orders".to_string(),
      network_timeout_secs: 20,
    }
  }
}

/// Naming scheme for the cache stores.
///
/// A store name is `{prefix}-{kind}-{version}`. Bumping `version` on deploy
/// is what makes activation purge the previous generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub prefix: String,
  pub version: String,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      prefix: "tableside".to_string(),
      version: "v1.0.0".to_string(),
    }
  }
}

impl StoreConfig {
  /// Name of the current static store generation.
  pub fn static_name(&self) -> String {
    format!("{}-static-{}", self.prefix, self.version)
  }

  /// Name of the current dynamic store generation.
  pub fn dynamic_name(&self) -> String {
    format!("{}-dynamic-{}", self.prefix, self.version)
  }

  /// Whether a store name belongs to this application at all.
  pub fn owns(&self, name: &str) -> bool {
    name.starts_with(&format!("{}-", self.prefix))
  }

  /// Whether a store name is one of the current generations.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name() || name == self.dynamic_name()
  }
}

/// Request classification rules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteRules {
  /// Path prefix identifying static assets
  pub static_prefix: String,
  /// Path prefix identifying API calls
  pub api_prefix: String,
  /// Keywords anywhere in the path that also mark a request as API
  pub api_keywords: Vec<String>,
}

impl Default for RouteRules {
  fn default() -> Self {
    Self {
      static_prefix: "/static/".to_string(),
      api_prefix: "/api/".to_string(),
      api_keywords: vec!["menu".to_string(), "orders".to_string()],
    }
  }
}

impl RouterConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tableside.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tableside/config.yaml
  ///
  /// Falls back to the built-in deployment defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tableside.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tableside").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: RouterConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_store_names_carry_prefix_and_version() {
    let stores = StoreConfig {
      prefix: "dalooneh".to_string(),
      version: "v1.0.0".to_string(),
    };

    assert_eq!(stores.static_name(), "dalooneh-static-v1.0.0");
    assert_eq!(stores.dynamic_name(), "dalooneh-dynamic-v1.0.0");
    assert!(stores.is_current("dalooneh-static-v1.0.0"));
    assert!(!stores.is_current("dalooneh-static-v0.9.0"));
    assert!(stores.owns("dalooneh-static-v0.9.0"));
    assert!(!stores.owns("someone-else-static-v1.0.0"));
  }

  #[test]
  fn test_defaults_include_root_in_manifest() {
    let config = RouterConfig::default();
    assert!(config.manifest.contains(&config.root_document));
    assert_eq!(config.routes.api_keywords, vec!["menu", "orders"]);
  }

  #[test]
  fn test_parse_partial_yaml_keeps_defaults() {
    let yaml = r#"
origin: "https://dalooneh.example"
stores:
  prefix: dalooneh
  version: v2.0.0
"#;
    let config: RouterConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.origin, "https://dalooneh.example");
    assert_eq!(config.stores.static_name(), "dalooneh-static-v2.0.0");
    // untouched sections fall back to defaults
    assert_eq!(config.routes.static_prefix, "/static/");
    assert_eq!(config.sync_tag, "background-sync-orders");
  }
}

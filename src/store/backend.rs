//! Store backend traits and the SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::Mutex;

use super::types::{PendingOrder, RequestKey, StoredEntry, StoredResponse};

/// Backend for the named cache stores.
///
/// A store is a keyed map from request identity to a stored response. Writes
/// to the same key are last-write-wins; `put_many` is atomic so the manifest
/// either lands whole or not at all.
pub trait StoreBackend: Send + Sync {
  /// Upsert one entry into a store.
  fn put(&self, store: &str, key: &RequestKey, response: &StoredResponse) -> Result<()>;

  /// Upsert a batch of entries into a store in one transaction.
  fn put_many(&self, store: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()>;

  /// Look up an entry in a specific store.
  fn get(&self, store: &str, key: &RequestKey) -> Result<Option<StoredEntry>>;

  /// Look up an entry in any store, the way the page-facing match works.
  fn get_any(&self, key: &RequestKey) -> Result<Option<StoredEntry>>;

  /// Names of all stores that currently hold at least one entry.
  fn store_names(&self) -> Result<Vec<String>>;

  /// Drop a store and everything in it.
  fn delete_store(&self, store: &str) -> Result<()>;

  /// Number of entries in a store.
  fn entry_count(&self, store: &str) -> Result<u64>;
}

/// Backend for the durable offline order queue.
pub trait OrderQueue: Send + Sync {
  fn enqueue_order(&self, order: &PendingOrder) -> Result<()>;

  /// All queued orders, oldest first.
  fn pending_orders(&self) -> Result<Vec<PendingOrder>>;

  fn remove_order(&self, id: &str) -> Result<()>;

  fn queue_depth(&self) -> Result<u64>;
}

/// SQLite-backed storage for the cache stores and the order queue.
///
/// One database file holds both; store generations are rows sharing a
/// `store_name`, so purging a generation is a single DELETE.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

impl SqliteBackend {
  /// Open the backend at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open store database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory backend. Used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let backend = Self {
      conn: Mutex::new(conn),
    };
    backend.run_migrations()?;
    Ok(backend)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("tableside").join("stores.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the cache stores and the order queue.
const STORE_SCHEMA: &str = r#"
-- Named cache stores (one row per store_name + request_key)
CREATE TABLE IF NOT EXISTS cache_entries (
    store_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_name, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key
    ON cache_entries(request_key);

-- Orders captured while offline, awaiting replay
CREATE TABLE IF NOT EXISTS order_queue (
    order_id TEXT PRIMARY KEY,
    payload BLOB NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl StoreBackend for SqliteBackend {
  fn put(&self, store: &str, key: &RequestKey, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (store_name, request_key, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![store, key.as_str(), response.status, headers, response.body],
      )
      .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    Ok(())
  }

  fn put_many(&self, store: &str, entries: &[(RequestKey, StoredResponse)]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, response) in entries {
      let headers = serde_json::to_string(&response.headers)
        .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

      let inserted = conn.execute(
        "INSERT OR REPLACE INTO cache_entries (store_name, request_key, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![store, key.as_str(), response.status, headers, response.body],
      );

      if let Err(e) = inserted {
        let _ = conn.execute("ROLLBACK", []);
        return Err(eyre!("Failed to store entry: {}", e));
      }
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get(&self, store: &str, key: &RequestKey) -> Result<Option<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, stored_at FROM cache_entries
         WHERE store_name = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![store, key.as_str()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    row.map(entry_from_row).transpose()
  }

  fn get_any(&self, key: &RequestKey) -> Result<Option<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, stored_at FROM cache_entries
         WHERE request_key = ? ORDER BY store_name LIMIT 1",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![key.as_str()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    row.map(entry_from_row).transpose()
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT store_name FROM cache_entries ORDER BY store_name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to query store names: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM cache_entries WHERE store_name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    Ok(())
  }

  fn entry_count(&self, store: &str) -> Result<u64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: u64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE store_name = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries: {}", e))?;

    Ok(count)
  }
}

impl OrderQueue for SqliteBackend {
  fn enqueue_order(&self, order: &PendingOrder) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO order_queue (order_id, payload, queued_at)
         VALUES (?, ?, datetime('now'))",
        params![order.id, order.payload],
      )
      .map_err(|e| eyre!("Failed to enqueue order: {}", e))?;

    Ok(())
  }

  fn pending_orders(&self) -> Result<Vec<PendingOrder>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT order_id, payload, queued_at FROM order_queue ORDER BY queued_at, order_id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, Vec<u8>, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .map_err(|e| eyre!("Failed to query order queue: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut orders = Vec::with_capacity(rows.len());
    for (id, payload, queued_at_str) in rows {
      orders.push(PendingOrder {
        id,
        payload,
        queued_at: parse_datetime(&queued_at_str)?,
      });
    }

    Ok(orders)
  }

  fn remove_order(&self, id: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM order_queue WHERE order_id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove order {}: {}", id, e))?;

    Ok(())
  }

  fn queue_depth(&self) -> Result<u64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: u64 = conn
      .query_row("SELECT COUNT(*) FROM order_queue", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count queued orders: {}", e))?;

    Ok(count)
  }
}

fn entry_from_row((status, headers, body, stored_at): (u16, String, Vec<u8>, String)) -> Result<StoredEntry> {
  let headers: Vec<(String, String)> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to parse stored headers: {}", e))?;

  Ok(StoredEntry {
    response: StoredResponse::new(status, headers, body),
    stored_at: parse_datetime(&stored_at)?,
  })
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::types::StoredRequest;

  fn html(body: &str) -> StoredResponse {
    StoredResponse::new(
      200,
      vec![("Content-Type".to_string(), "text/html".to_string())],
      body.as_bytes().to_vec(),
    )
  }

  #[test]
  fn test_put_get_roundtrip() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let key = StoredRequest::get("/static/css/styles.css").key();
    let response = html("body { }");

    backend.put("app-static-v1", &key, &response).unwrap();

    let entry = backend.get("app-static-v1", &key).unwrap().unwrap();
    assert_eq!(entry.response, response);

    // wrong store misses, any-store match hits
    assert!(backend.get("app-dynamic-v1", &key).unwrap().is_none());
    assert!(backend.get_any(&key).unwrap().is_some());
  }

  #[test]
  fn test_same_key_is_last_write_wins() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let key = StoredRequest::get("/menu/").key();

    backend.put("app-dynamic-v1", &key, &html("old")).unwrap();
    backend.put("app-dynamic-v1", &key, &html("new")).unwrap();

    let entry = backend.get("app-dynamic-v1", &key).unwrap().unwrap();
    assert_eq!(entry.response.body, b"new");
    assert_eq!(backend.entry_count("app-dynamic-v1").unwrap(), 1);
  }

  #[test]
  fn test_store_names_and_delete_store() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let key = StoredRequest::get("/").key();

    backend.put("app-static-v1", &key, &html("a")).unwrap();
    backend.put("app-dynamic-v1", &key, &html("b")).unwrap();

    assert_eq!(
      backend.store_names().unwrap(),
      vec!["app-dynamic-v1".to_string(), "app-static-v1".to_string()]
    );

    backend.delete_store("app-dynamic-v1").unwrap();
    assert_eq!(backend.store_names().unwrap(), vec!["app-static-v1".to_string()]);
    assert_eq!(backend.entry_count("app-dynamic-v1").unwrap(), 0);
  }

  #[test]
  fn test_put_many_is_atomic_batch() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    let entries: Vec<_> = ["/", "/static/js/main.js", "/manifest.json"]
      .iter()
      .map(|path| (StoredRequest::get(path).key(), html(path)))
      .collect();

    backend.put_many("app-static-v1", &entries).unwrap();
    assert_eq!(backend.entry_count("app-static-v1").unwrap(), 3);

    for (key, response) in &entries {
      let entry = backend.get("app-static-v1", key).unwrap().unwrap();
      assert_eq!(&entry.response, response);
    }
  }

  #[test]
  fn test_order_queue_lifecycle() {
    let backend = SqliteBackend::open_in_memory().unwrap();

    let order = PendingOrder {
      id: "abc123".to_string(),
      payload: br#"{"table": 4, "items": [1, 2]}"#.to_vec(),
      queued_at: Utc::now(),
    };

    backend.enqueue_order(&order).unwrap();
    assert_eq!(backend.queue_depth().unwrap(), 1);

    let pending = backend.pending_orders().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "abc123");
    assert_eq!(pending[0].payload, order.payload);

    backend.remove_order("abc123").unwrap();
    assert_eq!(backend.queue_depth().unwrap(), 0);
    assert!(backend.pending_orders().unwrap().is_empty());
  }
}

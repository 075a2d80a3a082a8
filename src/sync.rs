//! Durable offline order queue and its background-sync replay.
//!
//! Orders submitted while offline are queued here and replayed against the
//! orders endpoint when a sync trigger with the right tag arrives.
//! Delivery is at-least-once; deduplication is the server's responsibility.

use chrono::Utc;
use color_eyre::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::net::NetworkFetch;
use crate::store::{OrderQueue, PendingOrder};

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
  /// Orders delivered and removed from the queue
  pub synced: usize,
  /// Orders still queued for the next trigger
  pub remaining: usize,
}

/// The pending order queue over a durable backend.
pub struct SyncQueue<Q> {
  backend: Arc<Q>,
  config: RouterConfig,
}

impl<Q: OrderQueue> SyncQueue<Q> {
  pub fn new(backend: Arc<Q>, config: RouterConfig) -> Self {
    Self { backend, config }
  }

  /// Queue an order payload captured while offline. Returns the generated
  /// order id.
  pub fn enqueue(&self, payload: &[u8]) -> Result<String> {
    let queued_at = Utc::now();
    let order = PendingOrder {
      id: order_id(payload, queued_at),
      payload: payload.to_vec(),
      queued_at,
    };

    self.backend.enqueue_order(&order)?;
    info!(id = %order.id, bytes = order.payload.len(), "order queued for sync");
    Ok(order.id)
  }

  pub fn pending(&self) -> Result<Vec<PendingOrder>> {
    self.backend.pending_orders()
  }

  pub fn depth(&self) -> Result<u64> {
    self.backend.queue_depth()
  }

  /// Handle a background-sync trigger. Only the configured order-sync tag is
  /// acted upon; any other tag is ignored.
  pub async fn on_sync<N: NetworkFetch>(&self, tag: &str, net: &N) -> Result<Option<ReplayReport>> {
    if tag != self.config.sync_tag {
      debug!(tag, "ignoring sync trigger with foreign tag");
      return Ok(None);
    }

    self.replay(net).await.map(Some)
  }

  /// Replay every queued order. A delivered order is removed; a failed one
  /// stays queued for the next trigger and does not stop the batch.
  pub async fn replay<N: NetworkFetch>(&self, net: &N) -> Result<ReplayReport> {
    let pending = self.backend.pending_orders()?;
    let mut report = ReplayReport::default();

    for order in pending {
      match net.post_json(&self.config.orders_endpoint, &order.payload).await {
        Ok(response) if response.is_success() => {
          self.backend.remove_order(&order.id)?;
          info!(id = %order.id, "order synced");
          report.synced += 1;
        }
        Ok(response) => {
          warn!(id = %order.id, status = response.status, "order replay rejected, keeping queued");
          report.remaining += 1;
        }
        Err(e) => {
          warn!(id = %order.id, error = %e, "order replay failed, keeping queued");
          report.remaining += 1;
        }
      }
    }

    Ok(report)
  }
}

/// Generate a stable order id from the payload and the enqueue instant.
fn order_id(payload: &[u8], queued_at: chrono::DateTime<Utc>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(payload);
  hasher.update(
    queued_at
      .timestamp_nanos_opt()
      .unwrap_or_default()
      .to_le_bytes(),
  );
  hex::encode(hasher.finalize())
}

//! Push notification payloads and click routing.
//!
//! The push subsystem has no branching logic beyond building a fixed-shape
//! notification and deciding where a click lands.

use serde::Serialize;

const DEFAULT_TITLE: &str = "Tableside";
const DEFAULT_BODY: &str = "New order received!";
const ICON: &str = "/static/images/icons/icon-192x192.png";
const BADGE: &str = "/static/images/icons/icon-72x72.png";
const ACTION_ICON: &str = "/static/images/icons/icon-96x96.png";
const ORDERS_URL: &str = "/orders/";
const ROOT_URL: &str = "/";

/// One action button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

/// A rendered notification, ready for the host to display.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub require_interaction: bool,
  pub tag: String,
  pub actions: Vec<NotificationAction>,
}

impl Notification {
  /// Build the fixed-shape order notification from an optional push body.
  pub fn from_push(data: Option<&str>) -> Self {
    Self {
      title: DEFAULT_TITLE.to_string(),
      body: data.unwrap_or(DEFAULT_BODY).to_string(),
      icon: ICON.to_string(),
      badge: BADGE.to_string(),
      vibrate: vec![200, 100, 200],
      require_interaction: true,
      tag: "tableside-notification".to_string(),
      actions: vec![
        NotificationAction {
          action: "explore".to_string(),
          title: "View Order".to_string(),
          icon: ACTION_ICON.to_string(),
        },
        NotificationAction {
          action: "close".to_string(),
          title: "Close".to_string(),
          icon: ACTION_ICON.to_string(),
        },
      ],
    }
  }
}

/// Where a notification click navigates. `None` means just dismiss.
pub fn click_target(action: &str) -> Option<&'static str> {
  match action {
    "explore" => Some(ORDERS_URL),
    "close" => None,
    _ => Some(ROOT_URL),
  }
}

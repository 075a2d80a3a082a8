//! Request classification.

use crate::config::RouteRules;
use crate::store::StoredRequest;

/// The four request classes the router distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  Navigation,
  StaticAsset,
  Api,
  Default,
}

impl std::fmt::Display for RequestClass {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RequestClass::Navigation => write!(f, "navigation"),
      RequestClass::StaticAsset => write!(f, "static"),
      RequestClass::Api => write!(f, "api"),
      RequestClass::Default => write!(f, "default"),
    }
  }
}

/// Classify a request. First match wins, in this order: navigation flag,
/// static prefix, API prefix or keyword, default.
pub fn classify(request: &StoredRequest, rules: &RouteRules) -> RequestClass {
  if request.is_navigation() {
    return RequestClass::Navigation;
  }

  if request.path.starts_with(&rules.static_prefix) {
    return RequestClass::StaticAsset;
  }

  if request.path.starts_with(&rules.api_prefix)
    || rules.api_keywords.iter().any(|kw| request.path.contains(kw))
  {
    return RequestClass::Api;
  }

  RequestClass::Default
}

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use oas3_graphql_support::Transport;

use crate::error::TranslateError;

/// Collaborator that rewrites a Swagger 2.0 document into OpenAPI 3.x.
///
/// The upgrade itself is out of scope for this library; hosts that want to
/// accept 2.0 documents plug a converter in through
/// [`Options::builder`](Options::builder). Translating a 2.0 document
/// without one is an input error.
pub trait SpecUpgrader: Send + Sync {
  fn upgrade(&self, document: &serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// Per-run translation options.
///
/// ```
/// use oas3_graphql::Options;
///
/// let options = Options::builder()
///   .headers([("X-Origin".to_string(), "graphql".to_string())].into_iter().collect())
///   .viewer(false)
///   .build();
/// assert!(!options.viewer);
/// ```
#[derive(bon::Builder)]
pub struct Options {
  /// Literal headers merged into every outbound call.
  #[builder(default)]
  pub headers: IndexMap<String, String>,
  /// Literal query parameters merged into every outbound call.
  #[builder(default)]
  pub qs: IndexMap<String, String>,
  /// Disabling viewer synthesis forces every operation into the plain root
  /// buckets regardless of its declared security.
  #[builder(default = true)]
  pub viewer: bool,
  /// Outbound HTTP collaborator; defaults to the support crate's reqwest
  /// transport when the `reqwest` feature is enabled.
  pub transport: Option<Arc<dyn Transport>>,
  /// Swagger 2.0 upgrade collaborator.
  pub upgrader: Option<Arc<dyn SpecUpgrader>>,
}

impl Default for Options {
  fn default() -> Self {
    Self::builder().build()
  }
}

impl fmt::Debug for Options {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Options")
      .field("headers", &self.headers)
      .field("qs", &self.qs)
      .field("viewer", &self.viewer)
      .field("transport", &self.transport.as_ref().map(|_| "..."))
      .field("upgrader", &self.upgrader.as_ref().map(|_| "..."))
      .finish()
  }
}

impl Options {
  pub(crate) fn transport(&self) -> Result<Arc<dyn Transport>, TranslateError> {
    if let Some(transport) = &self.transport {
      return Ok(transport.clone());
    }

    #[cfg(feature = "reqwest")]
    {
      Ok(Arc::new(oas3_graphql_support::ReqwestTransport::new()))
    }
    #[cfg(not(feature = "reqwest"))]
    {
      Err(TranslateError::Input(
        "no transport configured and the `reqwest` feature is disabled".to_string(),
      ))
    }
  }
}

//! Runtime support for schemas produced by `oas3-graphql`.
//!
//! The translator synthesizes one resolver per REST operation; everything
//! those resolvers need at query time lives here so the translation crate
//! itself stays build-time only. That covers the [`Transport`] collaborator
//! trait the resolvers delegate their outbound calls to, the
//! [`CallError`] taxonomy for per-field execution failures, and the
//! encoding helpers used while assembling request URLs.

mod transport;

pub use http::{Method, StatusCode};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use transport::{CallError, CallRequest, CallResponse, Transport};

/// Characters passed through untouched when encoding a path segment.
pub const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Characters passed through untouched when encoding a query component.
pub const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

#[inline]
#[must_use]
pub fn encode_path_segment(segment: &str) -> String {
  utf8_percent_encode(segment, PATH_ENCODE_SET).to_string()
}

#[inline]
#[must_use]
pub fn encode_query_component(component: &str) -> String {
  utf8_percent_encode(component, QUERY_ENCODE_SET).to_string()
}

/// Renders a JSON argument value in its query-string form.
///
/// Scalars render bare (no JSON quoting); `null` renders empty; composite
/// values fall back to their compact JSON encoding.
#[must_use]
pub fn query_value(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::Null => String::new(),
    serde_json::Value::Bool(flag) => flag.to_string(),
    serde_json::Value::Number(number) => number.to_string(),
    serde_json::Value::String(text) => text.clone(),
    composite => composite.to_string(),
  }
}

/// Builds the `Authorization` header value for HTTP Basic credentials.
#[must_use]
pub fn basic_credentials(username: &str, password: &str) -> String {
  use base64::Engine as _;

  let pair = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
  format!("Basic {pair}")
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  #[test]
  fn test_encode_path_segment() {
    assert_eq!(super::encode_path_segment("hello world"), "hello%20world");
    assert_eq!(super::encode_path_segment("a/b"), "a%2Fb");
    assert_eq!(super::encode_path_segment("with-dash_underscore.dot~tilde"), "with-dash_underscore.dot~tilde");
  }

  #[test]
  fn test_encode_query_component() {
    assert_eq!(super::encode_query_component("a+b"), "a%2Bb");
    assert_eq!(super::encode_query_component("test@example.com"), "test%40example.com");
    assert_eq!(super::encode_query_component("simple"), "simple");
  }

  #[test]
  fn test_query_value_scalars() {
    assert_eq!(super::query_value(&json!("rex")), "rex");
    assert_eq!(super::query_value(&json!(42)), "42");
    assert_eq!(super::query_value(&json!(true)), "true");
    assert_eq!(super::query_value(&json!(null)), "");
  }

  #[test]
  fn test_query_value_composite_falls_back_to_json() {
    assert_eq!(super::query_value(&json!({"a": 1})), r#"{"a":1}"#);
    assert_eq!(super::query_value(&json!([1, 2])), "[1,2]");
  }

  #[test]
  fn test_basic_credentials() {
    // "user:pass" in base64
    assert_eq!(super::basic_credentials("user", "pass"), "Basic dXNlcjpwYXNz");
  }
}

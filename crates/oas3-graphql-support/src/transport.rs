use futures::future::BoxFuture;
use http::{Method, StatusCode};
use thiserror::Error;

/// One fully assembled outbound REST call.
///
/// The URL already contains the substituted path and the encoded query
/// string; headers carry any credentials the resolver applied.
#[derive(Debug, Clone)]
pub struct CallRequest {
  pub method: Method,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<serde_json::Value>,
}

/// The raw upstream answer to a [`CallRequest`].
#[derive(Debug, Clone)]
pub struct CallResponse {
  pub status: StatusCode,
  pub body: Vec<u8>,
}

/// Failure of a single proxied call.
///
/// These errors are raised inside one field's resolver during query
/// execution and surface as that field's GraphQL error; they never abort
/// sibling fields of the same query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
  #[error("request to {url} failed: {message}")]
  Transport { url: String, message: String },
  #[error("upstream returned {status}: {message}")]
  Status { status: StatusCode, message: String },
  #[error("missing credentials, expected one of: {wanted}")]
  MissingCredentials { wanted: String },
  #[error("path parameter `{name}` was not supplied")]
  MissingParameter { name: String },
  #[error("failed to decode upstream response: {0}")]
  Decode(String),
}

/// Outbound HTTP collaborator used by every synthesized resolver.
///
/// Implementations must be safe to share across concurrently resolving
/// fields; a transport is handed out once per translation run and cloned
/// into each resolver as an `Arc`. Dropping the returned future must abort
/// the in-flight call.
pub trait Transport: Send + Sync + 'static {
  fn call<'a>(&'a self, request: CallRequest) -> BoxFuture<'a, Result<CallResponse, CallError>>;
}

/// Default [`Transport`] backed by a shared [`reqwest::Client`].
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestTransport {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Wraps a preconfigured client, e.g. one carrying proxy or TLS settings.
  #[must_use]
  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
  fn call<'a>(&'a self, request: CallRequest) -> BoxFuture<'a, Result<CallResponse, CallError>> {
    Box::pin(async move {
      let transport_error = |message: String| CallError::Transport {
        url: request.url.clone(),
        message,
      };

      let mut builder = self.client.request(request.method.clone(), &request.url);
      for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if let Some(body) = &request.body {
        builder = builder.json(body);
      }

      let response = builder.send().await.map_err(|error| transport_error(error.to_string()))?;
      let status = response.status();
      let body = response
        .bytes()
        .await
        .map_err(|error| transport_error(error.to_string()))?
        .to_vec();

      Ok(CallResponse { status, body })
    })
  }
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
  use http::{Method, StatusCode};
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
  };

  use super::{CallRequest, ReqwestTransport, Transport};

  #[tokio::test]
  async fn test_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/pets"))
      .and(header("X-API-Key", "secret"))
      .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"name": "Rex"}])))
      .mount(&server)
      .await;

    let transport = ReqwestTransport::new();
    let response = transport
      .call(CallRequest {
        method: Method::GET,
        url: format!("{}/pets", server.uri()),
        headers: vec![("X-API-Key".to_string(), "secret".to_string())],
        body: None,
      })
      .await
      .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(parsed[0]["name"], "Rex");
  }

  #[tokio::test]
  async fn test_posts_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/pets"))
      .and(body_json(serde_json::json!({"name": "Rex"})))
      .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 7})))
      .mount(&server)
      .await;

    let transport = ReqwestTransport::new();
    let response = transport
      .call(CallRequest {
        method: Method::POST,
        url: format!("{}/pets", server.uri()),
        headers: vec![],
        body: Some(serde_json::json!({"name": "Rex"})),
      })
      .await
      .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
  }

  #[tokio::test]
  async fn test_connection_failure_is_transport_error() {
    let transport = ReqwestTransport::new();
    let result = transport
      .call(CallRequest {
        method: Method::GET,
        // Nothing listens on port 1; the connection is refused immediately.
        url: "http://127.0.0.1:1/pets".to_string(),
        headers: vec![],
        body: None,
      })
      .await;

    assert!(matches!(result, Err(super::CallError::Transport { .. })));
  }
}

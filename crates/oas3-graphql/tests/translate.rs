//! End-to-end translation tests: the produced schemas are executed against
//! a stub transport so both the shape of the type system and the behavior
//! of the synthesized resolvers are covered.

use std::{
  collections::BTreeMap,
  sync::{Arc, Mutex},
};

use futures::future::BoxFuture;
use http::StatusCode;
use oas3_graphql::{
  Options, Schema, TranslateError, translate,
  support::{CallError, CallRequest, CallResponse, Transport},
};
use serde_json::{Value, json};

const BASE: &str = "http://pets.test/v1";

/// In-memory transport: canned responses keyed by method and path,
/// recording every request it sees.
#[derive(Default)]
struct StubTransport {
  routes: BTreeMap<(String, String), (u16, Value)>,
  requests: Mutex<Vec<CallRequest>>,
}

impl StubTransport {
  fn new() -> Self {
    Self::default()
  }

  fn route(mut self, method: &str, path: &str, status: u16, body: Value) -> Self {
    self.routes.insert((method.to_string(), path.to_string()), (status, body));
    self
  }

  fn requests(&self) -> Vec<CallRequest> {
    self.requests.lock().unwrap().clone()
  }
}

impl Transport for StubTransport {
  fn call<'a>(&'a self, request: CallRequest) -> BoxFuture<'a, Result<CallResponse, CallError>> {
    Box::pin(async move {
      self.requests.lock().unwrap().push(request.clone());
      let path = request
        .url
        .split('?')
        .next()
        .unwrap_or_default()
        .strip_prefix(BASE)
        .unwrap_or_default()
        .to_string();
      match self.routes.get(&(request.method.to_string(), path)) {
        Some((status, body)) => Ok(CallResponse {
          status: StatusCode::from_u16(*status).unwrap(),
          body: serde_json::to_vec(body).unwrap(),
        }),
        None => Ok(CallResponse {
          status: StatusCode::NOT_FOUND,
          body: b"{\"message\":\"no such route\"}".to_vec(),
        }),
      }
    })
  }
}

fn translate_with(document: &Value, transport: Arc<StubTransport>) -> (Schema, oas3_graphql::TranslationReport) {
  let options = Options::builder().transport(transport).build();
  translate(document, options).expect("translation should succeed")
}

async fn field_names(schema: &Schema, type_name: &str) -> Vec<String> {
  let query = format!("{{ __type(name: \"{type_name}\") {{ fields {{ name }} }} }}");
  let response = schema.execute(query.as_str()).await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);
  let data = response.data.into_json().unwrap();
  data["__type"]["fields"]
    .as_array()
    .expect("type should exist")
    .iter()
    .map(|field| field["name"].as_str().unwrap().to_string())
    .collect()
}

async fn execute(schema: &Schema, query: &str) -> async_graphql::Response {
  schema.execute(query).await
}

fn petstore() -> Value {
  json!({
    "openapi": "3.1.0",
    "info": {"title": "Pet Store", "version": "1.0.0"},
    "servers": [{"url": "http://pets.test/v1"}],
    "paths": {
      "/pets": {
        "get": {
          "operationId": "listPets",
          "parameters": [{"name": "limit", "in": "query", "schema": {"type": "integer"}}],
          "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {
            "$ref": "#/components/schemas/Pet"
          }}}}}
        },
        "post": {
          "operationId": "createPet",
          "requestBody": {"required": true, "content": {"application/json": {"schema": {
            "$ref": "#/components/schemas/NewPet"
          }}}},
          "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {
            "$ref": "#/components/schemas/Pet"
          }}}}}
        }
      }
    },
    "components": {"schemas": {
      "Pet": {"type": "object", "properties": {
        "id": {"type": "integer"},
        "name": {"type": "string"},
        "pet-tag": {"type": "string"}
      }},
      "NewPet": {"type": "object", "required": ["name"], "properties": {
        "name": {"type": "string"},
        "pet-tag": {"type": "string"}
      }}
    }}
  })
}

#[tokio::test]
async fn test_scenario_plain_petstore_roots() {
  let transport = Arc::new(StubTransport::new());
  let (schema, report) = translate_with(&petstore(), transport);

  assert_eq!(field_names(&schema, "Query").await, vec!["pet"]);
  assert_eq!(field_names(&schema, "Mutation").await, vec!["pet"]);
  assert_eq!(report.operations_translated, 2);

  let sdl = schema.sdl();
  assert!(sdl.contains("NewPetInput"), "{sdl}");
}

#[tokio::test]
async fn test_query_resolver_proxies_get() {
  let transport = Arc::new(StubTransport::new().route(
    "GET",
    "/pets",
    200,
    json!({"id": 1, "name": "Rex", "pet-tag": "good-boy"}),
  ));
  let (schema, _) = translate_with(&petstore(), transport.clone());

  let response = execute(&schema, "{ pet(limit: 3) { id name petTag } }").await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);
  assert_eq!(
    response.data.into_json().unwrap(),
    json!({"pet": {"id": 1, "name": "Rex", "petTag": "good-boy"}})
  );

  let requests = transport.requests();
  assert_eq!(requests.len(), 1);
  assert!(requests[0].url.contains("limit=3"), "{}", requests[0].url);
}

#[tokio::test]
async fn test_mutation_resolver_desanitizes_body() {
  let transport = Arc::new(StubTransport::new().route("POST", "/pets", 200, json!({"id": 7, "name": "Lou"})));
  let (schema, _) = translate_with(&petstore(), transport.clone());

  let response = execute(&schema, r#"mutation { pet(input: {name: "Lou", petTag: "new"}) { id } }"#).await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);
  assert_eq!(response.data.into_json().unwrap(), json!({"pet": {"id": 7}}));

  let requests = transport.requests();
  assert_eq!(requests.len(), 1);
  // The body travels under the raw upstream property names.
  assert_eq!(requests[0].body, Some(json!({"name": "Lou", "pet-tag": "new"})));
}

#[tokio::test]
async fn test_translation_is_deterministic() {
  let first = translate_with(&petstore(), Arc::new(StubTransport::new())).0.sdl();
  let second = translate_with(&petstore(), Arc::new(StubTransport::new())).0.sdl();
  assert_eq!(first, second);
}

fn secured_petstore() -> Value {
  let mut document = petstore();
  document["paths"]["/pets"]["get"]["security"] = json!([{"ApiKeyAuth": []}]);
  document["components"]["securitySchemes"] = json!({
    "ApiKeyAuth": {"type": "apiKey", "name": "X-API-Key", "in": "header"}
  });
  document
}

#[tokio::test]
async fn test_scenario_secured_get_moves_under_viewers() {
  let transport = Arc::new(StubTransport::new());
  let (schema, _) = translate_with(&secured_petstore(), transport);

  let query_fields = field_names(&schema, "Query").await;
  assert!(!query_fields.contains(&"pet".to_string()), "{query_fields:?}");
  assert!(query_fields.contains(&"viewerApiKey".to_string()), "{query_fields:?}");
  assert!(query_fields.contains(&"viewerAnyAuth".to_string()), "{query_fields:?}");

  assert_eq!(field_names(&schema, "ViewerApiKey").await, vec!["pet"]);
  assert_eq!(field_names(&schema, "ViewerAnyAuth").await, vec!["pet"]);
  // The unsecured POST stays on the mutation root.
  assert_eq!(field_names(&schema, "Mutation").await, vec!["pet"]);
}

#[tokio::test]
async fn test_viewer_applies_api_key_credentials() {
  let transport = Arc::new(StubTransport::new().route("GET", "/pets", 200, json!({"id": 1, "name": "Rex"})));
  let (schema, _) = translate_with(&secured_petstore(), transport.clone());

  let response = execute(&schema, r#"{ viewerApiKey(apiKey: "secret") { pet { name } } }"#).await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);
  assert_eq!(
    response.data.into_json().unwrap(),
    json!({"viewerApiKey": {"pet": {"name": "Rex"}}})
  );

  let requests = transport.requests();
  assert_eq!(requests.len(), 1);
  assert!(
    requests[0]
      .headers
      .iter()
      .any(|(name, value)| name == "X-API-Key" && value == "secret"),
    "{:?}",
    requests[0].headers
  );
}

#[tokio::test]
async fn test_any_auth_viewer_accepts_subset_of_credentials() {
  let transport = Arc::new(StubTransport::new().route("GET", "/pets", 200, json!({"id": 1, "name": "Rex"})));
  let (schema, _) = translate_with(&secured_petstore(), transport.clone());

  let response = execute(&schema, r#"{ viewerAnyAuth(apiKey: "secret") { pet { name } } }"#).await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);

  let requests = transport.requests();
  assert!(
    requests[0]
      .headers
      .iter()
      .any(|(name, value)| name == "X-API-Key" && value == "secret")
  );
}

#[tokio::test]
async fn test_viewer_disabled_routes_to_plain_root() {
  let transport = Arc::new(StubTransport::new().route("GET", "/pets", 200, json!({"id": 1, "name": "Rex"})));
  let options = Options::builder().transport(transport.clone()).viewer(false).build();
  let (schema, _) = translate(&secured_petstore(), options).unwrap();

  let query_fields = field_names(&schema, "Query").await;
  assert_eq!(query_fields, vec!["pet"]);

  let response = execute(&schema, "{ pet { name } }").await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);
  // No credentials were collected, so none are applied.
  assert!(transport.requests()[0].headers.is_empty());
}

#[tokio::test]
async fn test_empty_query_root_gets_placeholder() {
  let document = json!({
    "openapi": "3.1.0",
    "info": {"title": "Write Only", "version": "1.0.0"},
    "servers": [{"url": "http://pets.test/v1"}],
    "paths": {"/pets": {"post": {
      "operationId": "createPet",
      "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {
        "$ref": "#/components/schemas/Pet"
      }}}}}
    }}},
    "components": {"schemas": {"Pet": {"type": "object", "properties": {"id": {"type": "integer"}}}}}
  });

  let (schema, _) = translate_with(&document, Arc::new(StubTransport::new()));
  assert_eq!(field_names(&schema, "Query").await, vec!["placeholder"]);

  let response = execute(&schema, "{ placeholder }").await;
  assert!(response.errors.is_empty());
  assert_eq!(response.data.into_json().unwrap(), json!({"placeholder": true}));
}

/// `/pets` (no links) sorts before `/pets/{petId}` (links), so the shared
/// `Pet` type would be cached bare under naive iteration order; the
/// two-pass worklist must yield the link-augmented variant anyway.
fn linked_petstore() -> Value {
  json!({
    "openapi": "3.1.0",
    "info": {"title": "Linked Pets", "version": "1.0.0"},
    "servers": [{"url": "http://pets.test/v1"}],
    "paths": {
      "/owners/{ownerId}": {"get": {
        "operationId": "getOwner",
        "parameters": [{"name": "ownerId", "in": "path", "required": true, "schema": {"type": "string"}}],
        "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {
          "$ref": "#/components/schemas/Owner"
        }}}}}
      }},
      "/pets": {"get": {
        "operationId": "listPets",
        "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {
          "$ref": "#/components/schemas/Pet"
        }}}}}
      }},
      "/pets/{petId}": {"get": {
        "operationId": "getPet",
        "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}}],
        "responses": {"200": {
          "description": "ok",
          "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}},
          "links": {"owner": {"operationId": "getOwner", "parameters": {"ownerId": "$response.body#/ownerId"}}}
        }}
      }}
    },
    "components": {"schemas": {
      "Pet": {"type": "object", "properties": {"name": {"type": "string"}, "ownerId": {"type": "string"}}},
      "Owner": {"type": "object", "properties": {"name": {"type": "string"}}}
    }}
  })
}

#[tokio::test]
async fn test_shared_response_type_carries_link_fields() {
  let (schema, _) = translate_with(&linked_petstore(), Arc::new(StubTransport::new()));
  let pet_fields = field_names(&schema, "Pet").await;
  assert!(pet_fields.contains(&"owner".to_string()), "{pet_fields:?}");
}

#[tokio::test]
async fn test_link_resolver_chains_to_target_operation() {
  let transport = Arc::new(
    StubTransport::new()
      .route("GET", "/pets/1", 200, json!({"name": "Rex", "ownerId": "9"}))
      .route("GET", "/owners/9", 200, json!({"name": "Ann"})),
  );
  let (schema, _) = translate_with(&linked_petstore(), transport.clone());

  // The link-bearing operation was processed first, so it claimed `pet`.
  let response = execute(&schema, r#"{ pet(petId: "1") { name owner { name } } }"#).await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);
  assert_eq!(
    response.data.into_json().unwrap(),
    json!({"pet": {"name": "Rex", "owner": {"name": "Ann"}}})
  );

  let urls: Vec<String> = transport.requests().iter().map(|request| request.url.clone()).collect();
  assert_eq!(urls, vec![format!("{BASE}/pets/1"), format!("{BASE}/owners/9")]);
}

#[tokio::test]
async fn test_any_auth_union_and_collision_suffixes() {
  let document = json!({
    "openapi": "3.1.0",
    "info": {"title": "Multi Auth", "version": "1.0.0"},
    "servers": [{"url": "http://pets.test/v1"}],
    "paths": {
      "/a": {"get": {
        "operationId": "getA",
        "security": [{"KeyOne": []}],
        "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {
          "$ref": "#/components/schemas/A"
        }}}}}
      }},
      "/b": {"get": {
        "operationId": "getB",
        "security": [{"KeyTwo": []}],
        "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {
          "$ref": "#/components/schemas/B"
        }}}}}
      }},
      "/c": {"get": {
        "operationId": "getC",
        "security": [{"KeyOne": []}, {"KeyTwo": []}],
        "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {
          "$ref": "#/components/schemas/C"
        }}}}}
      }}
    },
    "components": {
      "schemas": {
        "A": {"type": "object", "properties": {"a": {"type": "string"}}},
        "B": {"type": "object", "properties": {"b": {"type": "string"}}},
        "C": {"type": "object", "properties": {"c": {"type": "string"}}}
      },
      "securitySchemes": {
        "KeyOne": {"type": "apiKey", "name": "X-Key-One", "in": "header"},
        "KeyTwo": {"type": "apiKey", "name": "X-Key-Two", "in": "header"}
      }
    }
  });

  let (schema, _) = translate_with(&document, Arc::new(StubTransport::new()));

  // Two protocols of the same kind: deterministic numeric suffixing.
  let query_fields = field_names(&schema, "Query").await;
  assert!(query_fields.contains(&"viewerApiKey".to_string()), "{query_fields:?}");
  assert!(query_fields.contains(&"viewerApiKey2".to_string()), "{query_fields:?}");
  assert!(query_fields.contains(&"viewerAnyAuth".to_string()), "{query_fields:?}");

  // The any-auth viewer's field set is the deduplicated union.
  let mut union_fields = field_names(&schema, "ViewerAnyAuth").await;
  union_fields.sort();
  assert_eq!(union_fields, vec!["a", "b", "c"]);

  let one = field_names(&schema, "ViewerApiKey").await;
  let two = field_names(&schema, "ViewerApiKey2").await;
  assert_eq!(one, vec!["a", "c"]);
  assert_eq!(two, vec!["b", "c"]);
}

#[tokio::test]
async fn test_failed_call_is_local_to_one_field() {
  let transport = Arc::new(
    StubTransport::new()
      .route("GET", "/pets/1", 200, json!({"name": "Rex", "ownerId": "9"}))
      .route("GET", "/owners/9", 500, json!({"message": "boom"})),
  );
  let (schema, _) = translate_with(&linked_petstore(), transport);

  let response = execute(&schema, r#"{ pet(petId: "1") { name owner { name } } }"#).await;
  // The parent field resolved; only the failed link field errored.
  assert_eq!(response.errors.len(), 1);
  assert!(response.errors[0].message.contains("500"), "{}", response.errors[0].message);
  let data = response.data.into_json().unwrap();
  assert_eq!(data["pet"]["name"], json!("Rex"));
  assert_eq!(data["pet"]["owner"], json!(null));
}

#[tokio::test]
async fn test_bearer_viewer_sends_authorization_header() {
  let mut document = petstore();
  document["paths"]["/pets"]["get"]["security"] = json!([{"BearerAuth": []}]);
  document["components"]["securitySchemes"] = json!({"BearerAuth": {"type": "http", "scheme": "bearer"}});

  let transport = Arc::new(StubTransport::new().route("GET", "/pets", 200, json!({"id": 1, "name": "Rex"})));
  let (schema, _) = translate_with(&document, transport.clone());

  let response = execute(&schema, r#"{ viewerBearerAuth(token: "t0ken") { pet { name } } }"#).await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);
  assert!(
    transport.requests()[0]
      .headers
      .iter()
      .any(|(name, value)| name == "Authorization" && value == "Bearer t0ken")
  );
}

#[tokio::test]
async fn test_global_headers_and_qs_options_are_merged() {
  let transport = Arc::new(StubTransport::new().route("GET", "/pets", 200, json!({"id": 1})));
  let options = Options::builder()
    .transport(transport.clone())
    .headers([("X-Origin".to_string(), "graphql".to_string())].into_iter().collect())
    .qs([("tenant".to_string(), "acme".to_string())].into_iter().collect())
    .build();
  let (schema, _) = translate(&petstore(), options).unwrap();

  let response = execute(&schema, "{ pet { id } }").await;
  assert!(response.errors.is_empty(), "{:?}", response.errors);

  let request = &transport.requests()[0];
  assert!(request.headers.iter().any(|(name, value)| name == "X-Origin" && value == "graphql"));
  assert!(request.url.contains("tenant=acme"), "{}", request.url);
}

#[test]
fn test_invalid_inputs_fail_with_input_errors() {
  let options = Options::default;

  let not_an_object = translate(&json!("nope"), options()).unwrap_err();
  assert!(matches!(not_an_object, TranslateError::Input(_)));

  let unsupported = translate(&json!({"openapi": "4.0.0", "info": {}}), options()).unwrap_err();
  assert!(matches!(unsupported, TranslateError::Input(_)));

  let versionless = translate(&json!({"paths": {}}), options()).unwrap_err();
  assert!(matches!(versionless, TranslateError::Input(_)));

  let swagger_without_upgrader = translate(&json!({"swagger": "2.0", "paths": {}}), options()).unwrap_err();
  assert!(matches!(swagger_without_upgrader, TranslateError::Input(_)));
}

#[test]
fn test_malformed_v3_document_fails_validation() {
  let error = translate(&json!({"openapi": "3.1.0", "info": "not-an-info"}), Options::default()).unwrap_err();
  assert!(matches!(error, TranslateError::Validation(_)));
}

struct FixedUpgrader(Value);

impl oas3_graphql::SpecUpgrader for FixedUpgrader {
  fn upgrade(&self, _document: &Value) -> anyhow::Result<Value> {
    Ok(self.0.clone())
  }
}

struct FailingUpgrader;

impl oas3_graphql::SpecUpgrader for FailingUpgrader {
  fn upgrade(&self, _document: &Value) -> anyhow::Result<Value> {
    anyhow::bail!("definitions section is malformed")
  }
}

#[tokio::test]
async fn test_swagger_document_goes_through_upgrader() {
  let swagger = json!({"swagger": "2.0", "info": {"title": "t", "version": "1"}, "paths": {}});
  let options = Options::builder()
    .transport(Arc::new(StubTransport::new()))
    .upgrader(Arc::new(FixedUpgrader(petstore())))
    .build();

  let (schema, _) = translate(&swagger, options).unwrap();
  assert_eq!(field_names(&schema, "Query").await, vec!["pet"]);
}

#[test]
fn test_failed_upgrade_is_a_conversion_error() {
  let swagger = json!({"swagger": "2.0", "paths": {}});
  let options = Options::builder().upgrader(Arc::new(FailingUpgrader)).build();
  let error = translate(&swagger, options).unwrap_err();
  assert!(matches!(error, TranslateError::Conversion(_)));
}

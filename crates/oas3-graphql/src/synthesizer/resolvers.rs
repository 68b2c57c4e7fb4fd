//! Call plans: the immutable per-operation snapshots behind every
//! synthesized resolver.
//!
//! A resolver owns nothing but an `Arc<CallPlan>`; the only mutable state
//! at execution time is the request-scoped [`Payload`] flowing down the
//! resolved tree, so any two fields of any two requests can resolve
//! concurrently.

use std::{collections::BTreeMap, sync::Arc};

use async_graphql::{Value as GqlValue, dynamic::FieldValue};
use http::Method;
use itertools::Itertools;
use oas3_graphql_support::{
  CallError, CallRequest, Transport, basic_credentials, encode_path_segment, encode_query_component, query_value,
};
use serde_json::Value as Json;

use crate::preprocessor::ir::{
  ApiKeyLocation, CredentialKind, ParameterDef, ParameterLocation, SecurityDef, SecurityTable, TypeShape, TypeTable,
};

/// Request-scoped credential store, keyed by scheme-qualified parameter
/// (see [`SecurityDef::store_key`]).
pub(crate) type CredentialStore = BTreeMap<String, String>;

/// The value a resolver hands to its children: the upstream JSON plus the
/// credentials collected by an enclosing viewer.
///
/// Payloads are owned by one query execution and never shared across
/// requests; propagating the store by value is what keeps link chains
/// beneath a viewer authenticated.
#[derive(Debug, Clone, Default)]
pub(crate) struct Payload {
  pub value: Json,
  pub credentials: CredentialStore,
}

#[derive(Debug, Clone)]
pub(crate) struct BodyPlan {
  /// GraphQL argument carrying the request body.
  pub arg_name: String,
  /// Request type whose shape drives desanitization.
  pub type_name: String,
}

/// Immutable snapshot of one operation's call metadata.
pub(crate) struct CallPlan {
  pub method: Method,
  pub base_url: String,
  pub path: String,
  pub parameters: Vec<ParameterDef>,
  pub body: Option<BodyPlan>,
  pub security: Vec<Vec<String>>,
  /// Whether this field was routed beneath a viewer; only then are
  /// credentials read from the request-scoped store.
  pub authenticated: bool,
  pub headers: Vec<(String, String)>,
  pub qs: Vec<(String, String)>,
  pub types: Arc<TypeTable>,
  pub schemes: Arc<SecurityTable>,
  pub transport: Arc<dyn Transport>,
}

impl CallPlan {
  /// Performs the proxied call: substitutes arguments by declared
  /// location, applies credentials, delegates to the transport, and
  /// decodes the success body. Failures are local to the resolving field.
  pub(crate) async fn execute(
    &self,
    args: &BTreeMap<String, Json>,
    credentials: &CredentialStore,
  ) -> Result<Json, CallError> {
    let mut path = self.path.clone();
    let mut query: Vec<(String, String)> = self.qs.clone();
    let mut headers: Vec<(String, String)> = self.headers.clone();

    for parameter in &self.parameters {
      let Some(value) = args.get(&parameter.sane_name) else {
        continue;
      };
      if value.is_null() {
        continue;
      }
      match parameter.location {
        ParameterLocation::Path => {
          let slot = format!("{{{}}}", parameter.raw_name);
          path = path.replace(&slot, &encode_path_segment(&query_value(value)));
        }
        ParameterLocation::Query => match value {
          Json::Array(items) => {
            query.extend(items.iter().map(|item| (parameter.raw_name.clone(), query_value(item))));
          }
          single => query.push((parameter.raw_name.clone(), query_value(single))),
        },
        ParameterLocation::Header => headers.push((parameter.raw_name.clone(), query_value(value))),
      }
    }

    if let Some(open) = path.find('{') {
      let close = path[open..].find('}').map_or(path.len(), |offset| open + offset);
      return Err(CallError::MissingParameter {
        name: path[open + 1..close].to_string(),
      });
    }

    let body = match &self.body {
      Some(plan) => args
        .get(&plan.arg_name)
        .filter(|value| !value.is_null())
        .map(|value| desanitize_named(&self.types, &plan.type_name, value)),
      None => None,
    };

    self.apply_security(&mut headers, &mut query, credentials)?;

    let mut url = format!("{}{}", self.base_url, path);
    if !query.is_empty() {
      let encoded = query
        .iter()
        .map(|(name, value)| format!("{}={}", encode_query_component(name), encode_query_component(value)))
        .join("&");
      url.push('?');
      url.push_str(&encoded);
    }

    let response = self
      .transport
      .call(CallRequest {
        method: self.method.clone(),
        url,
        headers,
        body,
      })
      .await?;

    if !response.status.is_success() {
      let message: String = String::from_utf8_lossy(&response.body).trim().chars().take(200).collect();
      return Err(CallError::Status {
        status: response.status,
        message,
      });
    }

    if response.body.is_empty() {
      return Ok(Json::Null);
    }
    serde_json::from_slice(&response.body).map_err(|error| CallError::Decode(error.to_string()))
  }

  /// Applies the first security alternative whose credentials are all
  /// present in the request-scoped store.
  fn apply_security(
    &self,
    headers: &mut Vec<(String, String)>,
    query: &mut Vec<(String, String)>,
    credentials: &CredentialStore,
  ) -> Result<(), CallError> {
    if !self.authenticated || self.security.is_empty() {
      return Ok(());
    }

    'alternatives: for alternative in &self.security {
      let mut definitions = Vec::new();
      for scheme_name in alternative {
        let Some(definition) = self.schemes.get(scheme_name) else {
          continue 'alternatives;
        };
        if !definition.supported() {
          continue 'alternatives;
        }
        for parameter in definition.credential_parameters() {
          if !credentials.contains_key(&definition.store_key(parameter)) {
            continue 'alternatives;
          }
        }
        definitions.push(definition);
      }
      for definition in definitions {
        apply_credentials(definition, credentials, headers, query);
      }
      return Ok(());
    }

    let wanted = self.security.iter().flatten().unique().join(", ");
    Err(CallError::MissingCredentials { wanted })
  }
}

fn apply_credentials(
  definition: &SecurityDef,
  credentials: &CredentialStore,
  headers: &mut Vec<(String, String)>,
  query: &mut Vec<(String, String)>,
) {
  let read = |parameter: &str| credentials.get(&definition.store_key(parameter)).cloned().unwrap_or_default();

  match &definition.kind {
    CredentialKind::ApiKey { param, location } => {
      let value = read("apiKey");
      match location {
        ApiKeyLocation::Header => headers.push((param.clone(), value)),
        ApiKeyLocation::Query => query.push((param.clone(), value)),
      }
    }
    CredentialKind::Basic => {
      headers.push((
        "Authorization".to_string(),
        basic_credentials(&read("username"), &read("password")),
      ));
    }
    CredentialKind::Bearer => {
      headers.push(("Authorization".to_string(), format!("Bearer {}", read("token"))));
    }
    CredentialKind::Unsupported => {}
  }
}

/// Maps a sanitized GraphQL input value back to the raw JSON the upstream
/// expects, walking the request type's shape.
pub(crate) fn desanitize_named(types: &TypeTable, type_name: &str, value: &Json) -> Json {
  match types.get(type_name) {
    Some(def) => desanitize(types, &def.shape, value),
    None => value.clone(),
  }
}

fn desanitize(types: &TypeTable, shape: &TypeShape, value: &Json) -> Json {
  match (shape, value) {
    (TypeShape::Object { properties }, Json::Object(fields)) => {
      let mut out = serde_json::Map::new();
      for (sane, property) in properties {
        if let Some(field_value) = fields.get(sane)
          && !field_value.is_null()
        {
          out.insert(property.raw_name.clone(), desanitize(types, &property.shape, field_value));
        }
      }
      Json::Object(out)
    }
    (TypeShape::Array(items), Json::Array(values)) => {
      Json::Array(values.iter().map(|item| desanitize(types, items, item)).collect())
    }
    (TypeShape::Reference(name), _) => desanitize_named(types, name, value),
    _ => value.clone(),
  }
}

/// Converts an upstream JSON value into the engine's field value. Objects
/// are wrapped as payloads so projection and link resolvers below keep
/// both the value and the request's credentials in scope; `list_depth`
/// and `json_leaf` describe the field's declared type.
pub(crate) fn field_value(
  value: Json,
  credentials: &CredentialStore,
  list_depth: u8,
  json_leaf: bool,
) -> Option<FieldValue<'static>> {
  if list_depth > 0 {
    return match value {
      Json::Array(items) => Some(FieldValue::list(
        items
          .into_iter()
          .map(|item| element_value(item, credentials, list_depth - 1, json_leaf)),
      )),
      _ => None,
    };
  }

  if json_leaf {
    return match value {
      Json::Null => None,
      other => GqlValue::from_json(other).ok().map(FieldValue::value),
    };
  }

  match value {
    Json::Null => None,
    value @ Json::Object(_) => Some(FieldValue::owned_any(Payload {
      value,
      credentials: credentials.clone(),
    })),
    scalar => GqlValue::from_json(scalar).ok().map(FieldValue::value),
  }
}

fn element_value(value: Json, credentials: &CredentialStore, list_depth: u8, json_leaf: bool) -> FieldValue<'static> {
  field_value(value, credentials, list_depth, json_leaf).unwrap_or(FieldValue::NULL)
}

#[cfg(test)]
mod tests {
  use indexmap::IndexMap;
  use serde_json::json;

  use super::desanitize_named;
  use crate::preprocessor::ir::{PropertyDef, ScalarKind, TypeDef, TypeShape, TypeTable};

  fn table() -> TypeTable {
    let mut properties = IndexMap::new();
    properties.insert(
      "petName".to_string(),
      PropertyDef {
        raw_name: "pet-name".to_string(),
        required: true,
        shape: TypeShape::Scalar(ScalarKind::String),
      },
    );
    properties.insert(
      "friends".to_string(),
      PropertyDef {
        raw_name: "friends".to_string(),
        required: false,
        shape: TypeShape::Array(Box::new(TypeShape::Reference("NewPet".to_string()))),
      },
    );

    let mut types = TypeTable::new();
    types.insert(
      "NewPet".to_string(),
      TypeDef {
        name: "NewPet".to_string(),
        raw_name: "new-pet".to_string(),
        shape: TypeShape::Object { properties },
      },
    );
    types
  }

  #[test]
  fn test_desanitize_restores_raw_property_names() {
    let types = table();
    let input = json!({"petName": "Rex", "friends": [{"petName": "Lou"}]});
    let restored = desanitize_named(&types, "NewPet", &input);
    assert_eq!(restored, json!({"pet-name": "Rex", "friends": [{"pet-name": "Lou"}]}));
  }

  #[test]
  fn test_desanitize_drops_null_fields() {
    let types = table();
    let input = json!({"petName": null});
    assert_eq!(desanitize_named(&types, "NewPet", &input), json!({}));
  }

  #[test]
  fn test_desanitize_unknown_type_passes_through() {
    let types = table();
    let input = json!({"anything": 1});
    assert_eq!(desanitize_named(&types, "Ghost", &input), input);
  }
}

//! The intermediate representation the rest of the pipeline consumes.
//!
//! Everything here is produced once by preprocessing and never mutated;
//! the type and security tables are shared into resolvers as `Arc`
//! snapshots, so they double as the runtime lookup tables for request-body
//! desanitization and credential application.

use std::{collections::BTreeMap, sync::Arc};

use http::Method;
use indexmap::IndexMap;

use super::runtime_expression::RuntimeExpression;

pub(crate) type TypeTable = BTreeMap<String, TypeDef>;
pub(crate) type SecurityTable = BTreeMap<String, SecurityDef>;

#[derive(Debug)]
pub(crate) struct Ir {
  pub operations: Vec<Operation>,
  pub types: Arc<TypeTable>,
  pub security: Arc<SecurityTable>,
  pub base_url: String,
}

/// One REST operation, normalized.
#[derive(Debug, Clone)]
pub(crate) struct Operation {
  /// Stable snake_case identifier, unique within the run.
  pub id: String,
  /// The `operationId` as written in the specification, used to resolve
  /// link targets.
  pub raw_operation_id: Option<String>,
  pub method: Method,
  /// Path template with `{placeholder}` segments, e.g. `/pets/{petId}`.
  pub path: String,
  /// Sane name of the success-response type.
  pub res_type: String,
  /// Sane name of the request-body type, if the operation takes one.
  pub req_type: Option<String>,
  pub req_required: bool,
  pub parameters: Vec<ParameterDef>,
  /// Alternative sets of security-scheme names; satisfying any one set
  /// authorizes the call.
  pub security: Vec<Vec<String>>,
  pub links: Vec<LinkDef>,
}

#[derive(Debug, Clone)]
pub(crate) struct ParameterDef {
  pub raw_name: String,
  /// Sanitized argument name, unique among the operation's parameters.
  pub sane_name: String,
  pub location: ParameterLocation,
  pub required: bool,
  pub shape: TypeShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParameterLocation {
  Path,
  Query,
  Header,
}

/// A declared relationship from one operation's response to another
/// operation, exposed as a nested field on the response type.
#[derive(Debug, Clone)]
pub(crate) struct LinkDef {
  pub name: String,
  /// Raw `operationId` of the target.
  pub target_operation: String,
  /// Target parameter name → expression over the parent result.
  pub parameters: IndexMap<String, RuntimeExpression>,
}

/// A named structural schema.
#[derive(Debug, Clone)]
pub(crate) struct TypeDef {
  /// Sane, globally unique type name.
  pub name: String,
  /// The specification name (or synthesized derivation path) it came from.
  pub raw_name: String,
  pub shape: TypeShape,
}

#[derive(Debug, Clone)]
pub(crate) enum TypeShape {
  /// Keyed by sane field name; the property def keeps the raw name so the
  /// same table drives response projection and request desanitization.
  Object { properties: IndexMap<String, PropertyDef> },
  Array(Box<TypeShape>),
  Scalar(ScalarKind),
  /// Reference to another [`TypeDef`] by sane name.
  Reference(String),
  /// Free-form value, exposed through the `JSON` scalar.
  Json,
}

#[derive(Debug, Clone)]
pub(crate) struct PropertyDef {
  pub raw_name: String,
  pub required: bool,
  pub shape: TypeShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarKind {
  String,
  Int,
  Float,
  Boolean,
}

impl ScalarKind {
  pub(crate) fn graphql_name(self) -> &'static str {
    match self {
      Self::String => "String",
      Self::Int => "Int",
      Self::Float => "Float",
      Self::Boolean => "Boolean",
    }
  }
}

/// One security scheme from the specification's components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SecurityDef {
  /// The scheme's key in the specification, also the bucket key during
  /// field routing.
  pub name: String,
  pub kind: CredentialKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CredentialKind {
  ApiKey { param: String, location: ApiKeyLocation },
  Basic,
  Bearer,
  /// OAuth2, OpenID Connect, mutual TLS, cookies, and anything newer:
  /// recorded so references resolve, but never given a viewer.
  Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiKeyLocation {
  Header,
  Query,
}

impl SecurityDef {
  pub(crate) fn supported(&self) -> bool {
    !matches!(self.kind, CredentialKind::Unsupported)
  }

  /// The credential parameters a viewer for this scheme exposes.
  pub(crate) fn credential_parameters(&self) -> &'static [&'static str] {
    match self.kind {
      CredentialKind::ApiKey { .. } => &["apiKey"],
      CredentialKind::Basic => &["username", "password"],
      CredentialKind::Bearer => &["token"],
      CredentialKind::Unsupported => &[],
    }
  }

  /// Viewer-type naming component, e.g. `ApiKey` in `ViewerApiKey`.
  pub(crate) fn kind_label(&self) -> &'static str {
    match self.kind {
      CredentialKind::ApiKey { .. } => "ApiKey",
      CredentialKind::Basic => "BasicAuth",
      CredentialKind::Bearer => "BearerAuth",
      CredentialKind::Unsupported => "Unsupported",
    }
  }

  /// Key under which one credential parameter lives in the request-scoped
  /// store. Scheme-qualified so two schemes of the same kind stay apart.
  pub(crate) fn store_key(&self, parameter: &str) -> String {
    format!("{}.{parameter}", self.name)
  }
}

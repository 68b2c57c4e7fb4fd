use thiserror::Error;

/// What kind of specification construct a missing reference pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DefinitionKind {
  #[strum(to_string = "type")]
  Type,
  #[strum(to_string = "security scheme")]
  SecurityScheme,
}

/// Build-time failure of one translation run.
///
/// Every variant is fatal to the whole translation: the call returns this
/// error and no schema. Failures of individual proxied calls at query
/// execution time are a different animal, see
/// [`CallError`](oas3_graphql_support::CallError).
#[derive(Debug, Error)]
pub enum TranslateError {
  /// The supplied document is not a specification object, or declares a
  /// version this library does not translate.
  #[error("invalid input: {0}")]
  Input(String),

  /// The document claims OpenAPI 3.x but does not deserialize as one.
  #[error("specification failed validation: {0}")]
  Validation(String),

  /// The delegated Swagger 2.0 upgrade collaborator failed.
  #[error("swagger upgrade failed: {0}")]
  Conversion(String),

  /// An operation referenced a type or security scheme absent from the
  /// specification.
  #[error("missing definition: {kind} `{name}` is not defined in the specification")]
  MissingDefinition { kind: DefinitionKind, name: String },

  /// The assembled schema violated a structural rule of the target type
  /// system.
  #[error("schema assembly failed: {0}")]
  Build(String),
}

//! Translate an OpenAPI 3.x description into an executable GraphQL schema.
//!
//! The produced [`Schema`] carries a resolver per REST operation: at query
//! time each resolved field proxies one call to the described API through
//! the configured [transport](oas3_graphql_support::Transport). Operations
//! declaring security are consolidated beneath synthesized viewer fields
//! that collect credentials as arguments; response links become nested
//! fields that chain calls off the parent's resolved value.
//!
//! ## Usage
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! let text = std::fs::read_to_string("openapi.json")?;
//! let document: serde_json::Value = serde_json::from_str(&text)?;
//!
//! let (schema, report) = oas3_graphql::translate(&document, oas3_graphql::Options::default())?;
//!
//! println!(
//!   "translated {} operations with {} warnings",
//!   report.operations_translated,
//!   report.warnings.len()
//! );
//! println!("{}", schema.sdl());
//! # Ok(())
//! # }
//! ```
//!
//! Translation yields exactly one outcome: a complete schema plus a
//! [`TranslationReport`], or one [`TranslateError`]. Failures of
//! individual proxied calls during query execution are local to the one
//! field that made them; sibling fields still resolve.

mod error;
mod naming;
mod options;
mod preprocessor;
mod report;
mod synthesizer;

pub use async_graphql::dynamic::Schema;
pub use error::{DefinitionKind, TranslateError};
pub use oas3_graphql_support as support;
pub use options::{Options, SpecUpgrader};
pub use report::{TranslationReport, TranslationWarning};
use tracing::debug;

use crate::{
  naming::{NameRegistry, Namespace},
  synthesizer::{assembler, fields::FieldLoader, viewer},
};

/// Names the target type system claims for itself; nothing from the
/// specification may shadow them.
const RESERVED_TYPE_NAMES: &[&str] = &[
  "Query",
  "Mutation",
  "Subscription",
  "JSON",
  "String",
  "Int",
  "Float",
  "Boolean",
  "ID",
];

/// One translation run over one specification.
pub struct Translator {
  spec: oas3::Spec,
  options: Options,
}

impl Translator {
  /// Wraps an already validated OpenAPI 3.x specification.
  pub fn new(spec: oas3::Spec, options: Options) -> Self {
    Self { spec, options }
  }

  /// Validates a parsed document and prepares it for translation.
  ///
  /// OpenAPI 3.x documents are deserialized directly; Swagger 2.0
  /// documents are delegated to the [`SpecUpgrader`] collaborator
  /// configured in the options.
  ///
  /// # Errors
  ///
  /// [`TranslateError::Input`] if the value is not a specification object
  /// or declares an unsupported version, [`TranslateError::Conversion`] if
  /// the delegated upgrade fails, [`TranslateError::Validation`] if the
  /// document does not deserialize as OpenAPI 3.x.
  pub fn from_document(document: &serde_json::Value, options: Options) -> Result<Self, TranslateError> {
    let Some(fields) = document.as_object() else {
      return Err(TranslateError::Input("document is not a specification object".to_string()));
    };

    if let Some(version) = fields.get("swagger").and_then(serde_json::Value::as_str) {
      if version != "2.0" {
        return Err(TranslateError::Input(format!("unsupported swagger version `{version}`")));
      }
      let Some(upgrader) = options.upgrader.clone() else {
        return Err(TranslateError::Input(
          "translating a Swagger 2.0 document requires an upgrade collaborator".to_string(),
        ));
      };
      let upgraded = upgrader
        .upgrade(document)
        .map_err(|error| TranslateError::Conversion(error.to_string()))?;
      let spec = deserialize_v3(&upgraded)?;
      return Ok(Self::new(spec, options));
    }

    match fields.get("openapi").and_then(serde_json::Value::as_str) {
      Some(version) if version.starts_with("3.") => Ok(Self::new(deserialize_v3(document)?, options)),
      Some(version) => Err(TranslateError::Input(format!("unsupported openapi version `{version}`"))),
      None => Err(TranslateError::Input(
        "document declares neither `openapi` nor `swagger`".to_string(),
      )),
    }
  }

  /// Runs the pipeline: preprocess into the IR, synthesize types and
  /// resolvers while routing fields (link-bearing operations first),
  /// consolidate authenticated fields into viewers, and assemble the
  /// schema.
  ///
  /// # Errors
  ///
  /// Any [`TranslateError`] is fatal to the whole translation; no partial
  /// schema is returned.
  pub fn translate(self) -> Result<(Schema, TranslationReport), TranslateError> {
    let mut report = TranslationReport::default();
    let mut registry = NameRegistry::new();
    for name in RESERVED_TYPE_NAMES {
      registry.reserve(Namespace::Types, name);
    }

    let ir = preprocessor::preprocess(&self.spec, &mut registry, &mut report)?;
    let transport = self.options.transport()?;

    let loader = FieldLoader::new(&ir, &mut registry, &self.options, transport, &mut report);
    let (mut buckets, cache) = loader.route()?;
    let viewers = viewer::synthesize(&mut buckets, &ir, &mut registry, &mut report);

    report.types_built = cache.built_count() + viewers.len();
    debug!(
      operations = report.operations_translated,
      types = report.types_built,
      warnings = report.warnings.len(),
      "translation finished"
    );

    let schema = assembler::assemble(buckets, cache, viewers)?;
    Ok((schema, report))
  }
}

/// One-call convenience over [`Translator`].
///
/// # Errors
///
/// See [`Translator::from_document`] and [`Translator::translate`].
pub fn translate(
  document: &serde_json::Value,
  options: Options,
) -> Result<(Schema, TranslationReport), TranslateError> {
  Translator::from_document(document, options)?.translate()
}

fn deserialize_v3(document: &serde_json::Value) -> Result<oas3::Spec, TranslateError> {
  serde_path_to_error::deserialize(document.clone()).map_err(|error| TranslateError::Validation(error.to_string()))
}

use strum::Display;

/// Statistics and non-fatal findings from one translation run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranslationReport {
  /// Operations that became root or viewer fields.
  pub operations_translated: usize,
  /// Operations dropped from the schema (see the warnings for why).
  pub operations_skipped: usize,
  /// GraphQL object and input object types constructed.
  pub types_built: usize,
  /// Viewer types synthesized across both directions.
  pub viewers_built: usize,
  pub warnings: Vec<TranslationWarning>,
}

impl TranslationReport {
  pub(crate) fn record_operation(&mut self) {
    self.operations_translated += 1;
  }

  pub(crate) fn record_skipped_operation(&mut self, warning: TranslationWarning) {
    self.operations_skipped += 1;
    self.warnings.push(warning);
  }

  pub(crate) fn record_viewer(&mut self) {
    self.viewers_built += 1;
  }

  pub(crate) fn record_warning(&mut self, warning: TranslationWarning) {
    self.warnings.push(warning);
  }
}

/// A degradation the translation tolerated instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum TranslationWarning {
  #[strum(to_string = "Operation '{operation}' has no success response schema and was skipped")]
  MissingResponseSchema { operation: String },
  #[strum(to_string = "Security scheme '{scheme}' uses an unsupported credential kind and produces no viewer")]
  UnsupportedSecurityScheme { scheme: String },
  #[strum(to_string = "Link '{link}' targets unknown operation '{target}' and was skipped")]
  UnresolvedLinkTarget { link: String, target: String },
  #[strum(to_string = "Link '{link}' binds unknown parameter '{parameter}' of its target operation")]
  UnknownLinkParameter { link: String, parameter: String },
  #[strum(to_string = "Link '{link}' parameter '{parameter}' uses an unsupported runtime expression")]
  UnsupportedLinkParameter { link: String, parameter: String },
  #[strum(to_string = "Parameter '{parameter}' of operation '{operation}' is ignored (cookie parameters are not proxied)")]
  IgnoredCookieParameter { operation: String, parameter: String },
  #[strum(to_string = "Schema '{schema}' uses oneOf/anyOf composition and degrades to the JSON scalar")]
  UnsupportedComposition { schema: String },
}

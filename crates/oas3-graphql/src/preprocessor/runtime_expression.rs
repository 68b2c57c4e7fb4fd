//! OpenAPI link runtime expressions, reduced to the forms a link resolver
//! can evaluate against its parent's resolved value.

/// A parsed link-parameter expression.
///
/// `$request.*` forms cannot be evaluated here: by the time a link resolver
/// runs, only the parent's response value is in scope. They parse as
/// [`Unsupported`](RuntimeExpression::Unsupported) and the loader drops the
/// binding with a warning, which turns the parameter back into an explicit
/// argument on the link field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RuntimeExpression {
  /// A constant value, passed through as a string.
  Literal(String),
  /// `$response.body#/json/pointer` (empty pointer for the whole body).
  ResponseBodyPointer(String),
  Unsupported(String),
}

pub(crate) fn parse(input: &str) -> RuntimeExpression {
  if !input.starts_with('$') {
    return RuntimeExpression::Literal(input.to_string());
  }

  if let Some(rest) = input.strip_prefix("$response.body") {
    let pointer = rest.strip_prefix('#').unwrap_or("");
    return RuntimeExpression::ResponseBodyPointer(pointer.to_string());
  }

  RuntimeExpression::Unsupported(input.to_string())
}

impl RuntimeExpression {
  /// Evaluates the expression against the parent's resolved value.
  pub(crate) fn evaluate(&self, source: &serde_json::Value) -> Option<serde_json::Value> {
    match self {
      Self::Literal(value) => Some(serde_json::Value::String(value.clone())),
      Self::ResponseBodyPointer(pointer) if pointer.is_empty() => Some(source.clone()),
      Self::ResponseBodyPointer(pointer) => source.pointer(pointer).cloned(),
      Self::Unsupported(_) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::{RuntimeExpression, parse};

  #[test]
  fn test_response_body_path() {
    assert_eq!(
      parse("$response.body#/id"),
      RuntimeExpression::ResponseBodyPointer("/id".to_string())
    );
  }

  #[test]
  fn test_response_body_nested_path() {
    assert_eq!(
      parse("$response.body#/data/items/0/id"),
      RuntimeExpression::ResponseBodyPointer("/data/items/0/id".to_string())
    );
  }

  #[test]
  fn test_response_body_whole() {
    assert_eq!(parse("$response.body"), RuntimeExpression::ResponseBodyPointer(String::new()));
  }

  #[test]
  fn test_literal() {
    assert_eq!(parse("fixed-value"), RuntimeExpression::Literal("fixed-value".to_string()));
  }

  #[test]
  fn test_unsupported_expressions() {
    assert!(matches!(parse("$request.query.filter"), RuntimeExpression::Unsupported(_)));
    assert!(matches!(parse("$request.path.id"), RuntimeExpression::Unsupported(_)));
    assert!(matches!(parse("$url"), RuntimeExpression::Unsupported(_)));
    assert!(matches!(parse("$statusCode"), RuntimeExpression::Unsupported(_)));
  }

  #[test]
  fn test_evaluate_pointer() {
    let source = json!({"owner": {"id": 7}, "a/b": 1});
    let expr = parse("$response.body#/owner/id");
    assert_eq!(expr.evaluate(&source), Some(json!(7)));
    // JSON pointer escape sequences resolve through the pointer grammar.
    let escaped = parse("$response.body#/a~1b");
    assert_eq!(escaped.evaluate(&source), Some(json!(1)));
  }

  #[test]
  fn test_evaluate_whole_body_and_misses() {
    let source = json!({"id": 1});
    assert_eq!(parse("$response.body").evaluate(&source), Some(source.clone()));
    assert_eq!(parse("$response.body#/missing").evaluate(&source), None);
    assert_eq!(parse("$request.body").evaluate(&source), None);
    assert_eq!(parse("literal").evaluate(&source), Some(json!("literal")));
  }
}

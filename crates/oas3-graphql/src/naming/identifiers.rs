use std::{collections::BTreeSet, sync::LazyLock};

use any_ascii::any_ascii;
use inflections::Inflect;
use regex::Regex;

// Compile static regexes only once for sanitization.
static INVALID_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").unwrap());
static MULTI_UNDERSCORE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Base sanitization shared by every naming rule: transliterates to ASCII,
/// replaces characters outside the GraphQL name alphabet with underscores,
/// collapses runs of underscores, and trims leading/trailing underscores.
///
/// Trimming the underscores also guarantees no produced name can start with
/// `__`, which GraphQL reserves for introspection.
pub(crate) fn sanitize(input: &str) -> String {
  if input.is_empty() {
    return String::new();
  }

  let ascii = any_ascii(input);
  let replaced = INVALID_CHARS_RE.replace_all(&ascii, "_");
  let collapsed = MULTI_UNDERSCORE_RE.replace_all(&replaced, "_");

  collapsed.trim_matches('_').to_string()
}

/// Converts a raw specification name into a GraphQL type name (`PascalCase`).
///
/// A leading digit is prefixed with `T` since GraphQL names must start with
/// a letter or underscore; an empty result becomes `Unnamed`.
pub(crate) fn to_type_name(name: &str) -> String {
  let mut ident = sanitize(name).to_pascal_case();

  if ident.is_empty() {
    return "Unnamed".to_string();
  }

  if ident.starts_with(|c: char| c.is_ascii_digit()) {
    ident.insert(0, 'T');
  }

  ident
}

/// Converts a raw specification name into a GraphQL field or argument name
/// (`camelCase`). A leading digit is prefixed with `_`; an empty result
/// becomes `field`.
pub(crate) fn to_field_name(name: &str) -> String {
  let mut ident = sanitize(name).to_camel_case();

  if ident.is_empty() {
    return "field".to_string();
  }

  if ident.starts_with(|c: char| c.is_ascii_digit()) {
    ident.insert(0, '_');
  }

  ident
}

/// Derives a stable snake_case identifier for one operation: the declared
/// `operationId` when present, otherwise the method plus path template.
pub(crate) fn stable_operation_id(method: &str, path: &str, operation_id: Option<&str>) -> String {
  let base = operation_id
    .map(ToString::to_string)
    .unwrap_or_else(|| format!("{method} {path}"));

  let ident = sanitize(&base).to_snake_case();
  if ident.is_empty() { "operation".to_string() } else { ident }
}

/// Disambiguates `base` against `used` with an incrementing numeric suffix:
/// `base`, `base2`, `base3`, and so on.
pub(crate) fn ensure_unique(base: &str, used: &BTreeSet<String>) -> String {
  if !used.contains(base) {
    return base.to_string();
  }
  let mut i = 2;
  loop {
    let next = format!("{base}{i}");
    if !used.contains(&next) {
      return next;
    }
    i += 1;
  }
}

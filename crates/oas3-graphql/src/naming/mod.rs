//! The sane-name registry: every GraphQL-visible name the translation
//! produces is claimed here exactly once, against the raw specification
//! name it was derived from.

pub(crate) mod identifiers;

use std::collections::BTreeMap;

use indexmap::IndexMap;

/// The distinct naming scopes of one translation run.
///
/// Type names share one flat GraphQL namespace; root field names only need
/// to be unique within their own root, so the query and mutation directions
/// get independent scopes (the same REST resource may legitimately name a
/// field on both roots).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Namespace {
  Types,
  QueryFields,
  MutationFields,
}

#[derive(Debug, Default)]
struct Scope {
  raw_to_sane: IndexMap<String, String>,
  sane_to_raw: BTreeMap<String, String>,
}

/// Bidirectional mapping between sanitized, GraphQL-legal identifiers and
/// the raw specification names they came from.
///
/// One registry is threaded by reference through the whole pipeline. A raw
/// key maps to exactly one sane name for the lifetime of the run; two raw
/// keys whose candidates sanitize identically are disambiguated with an
/// incrementing numeric suffix, never silently overwritten.
#[derive(Debug, Default)]
pub(crate) struct NameRegistry {
  types: Scope,
  query_fields: Scope,
  mutation_fields: Scope,
}

impl NameRegistry {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  fn scope_mut(&mut self, namespace: Namespace) -> &mut Scope {
    match namespace {
      Namespace::Types => &mut self.types,
      Namespace::QueryFields => &mut self.query_fields,
      Namespace::MutationFields => &mut self.mutation_fields,
    }
  }

  /// Returns the sane name recorded for `raw_key`, claiming `candidate`
  /// (suffixed if taken) on first sight.
  pub(crate) fn resolve(&mut self, namespace: Namespace, raw_key: &str, candidate: &str) -> String {
    let scope = self.scope_mut(namespace);
    if let Some(existing) = scope.raw_to_sane.get(raw_key) {
      return existing.clone();
    }

    let mut sane = candidate.to_string();
    if scope.sane_to_raw.contains_key(&sane) {
      let mut i = 2;
      sane = loop {
        let next = format!("{candidate}{i}");
        if !scope.sane_to_raw.contains_key(&next) {
          break next;
        }
        i += 1;
      };
    }

    scope.raw_to_sane.insert(raw_key.to_string(), sane.clone());
    scope.sane_to_raw.insert(sane.clone(), raw_key.to_string());
    sane
  }

  /// Marks a name as taken without tying it to a specification construct,
  /// e.g. the built-in scalar names and the root type names.
  pub(crate) fn reserve(&mut self, namespace: Namespace, sane: &str) {
    let scope = self.scope_mut(namespace);
    scope
      .sane_to_raw
      .entry(sane.to_string())
      .or_insert_with(|| format!("#reserved:{sane}"));
  }
}

#[cfg(test)]
mod tests {
  use super::{NameRegistry, Namespace};

  #[test]
  fn test_resolve_is_stable_per_raw_key() {
    let mut registry = NameRegistry::new();
    let first = registry.resolve(Namespace::Types, "Pet", "Pet");
    let second = registry.resolve(Namespace::Types, "Pet", "Pet");
    assert_eq!(first, "Pet");
    assert_eq!(first, second);
  }

  #[test]
  fn test_colliding_candidates_get_numeric_suffixes() {
    let mut registry = NameRegistry::new();
    assert_eq!(registry.resolve(Namespace::Types, "pet", "Pet"), "Pet");
    assert_eq!(registry.resolve(Namespace::Types, "PET", "Pet"), "Pet2");
    assert_eq!(registry.resolve(Namespace::Types, "Pet!", "Pet"), "Pet3");
    // Raw keys stay pinned to the name they were given.
    assert_eq!(registry.resolve(Namespace::Types, "PET", "Pet"), "Pet2");
  }

  #[test]
  fn test_namespaces_are_independent() {
    let mut registry = NameRegistry::new();
    assert_eq!(registry.resolve(Namespace::QueryFields, "op:get_pets", "pet"), "pet");
    assert_eq!(registry.resolve(Namespace::MutationFields, "op:create_pet", "pet"), "pet");
  }

  #[test]
  fn test_reserved_names_cannot_be_claimed() {
    let mut registry = NameRegistry::new();
    registry.reserve(Namespace::Types, "JSON");
    assert_eq!(registry.resolve(Namespace::Types, "JSON", "JSON"), "JSON2");
  }

  #[test]
  fn test_input_suffix_claims_are_disambiguated() {
    let mut registry = NameRegistry::new();
    // A genuine schema named PetInput takes the name first; the input
    // variant of Pet is pushed to the next suffix.
    assert_eq!(registry.resolve(Namespace::Types, "PetInput", "PetInput"), "PetInput");
    assert_eq!(registry.resolve(Namespace::Types, "Pet#input", "PetInput"), "PetInput2");
  }
}

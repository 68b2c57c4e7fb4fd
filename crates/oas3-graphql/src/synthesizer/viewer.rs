//! Consolidation of authenticated fields into viewer entry points.
//!
//! For each direction, every protocol with at least one routed field gets
//! a viewer object wrapping exactly that protocol's fields and exposing
//! its credential parameters as arguments; one any-auth viewer per
//! direction unions everything. Viewer resolvers only collect credentials
//! into the request-scoped store; the nested operation resolvers decide
//! what they need and fail locally when it is missing.

use std::{collections::BTreeSet, sync::Arc};

use async_graphql::dynamic::{Object, TypeRef};
use indexmap::IndexMap;
use tracing::debug;

use super::fields::{ArgSpec, CredentialArg, Direction, FieldBuckets, FieldKind, FieldSpec};
use crate::{
  naming::{NameRegistry, Namespace, identifiers},
  preprocessor::ir::Ir,
  report::TranslationReport,
};

/// Builds every viewer type and appends each one as a field on its root
/// bucket; returns the viewer objects for registration.
pub(crate) fn synthesize(
  buckets: &mut FieldBuckets,
  ir: &Ir,
  registry: &mut NameRegistry,
  report: &mut TranslationReport,
) -> Vec<Object> {
  let mut objects = Vec::new();

  for direction in [Direction::Query, Direction::Mutation] {
    let auth = match direction {
      Direction::Query => std::mem::take(&mut buckets.auth_query),
      Direction::Mutation => std::mem::take(&mut buckets.auth_mutation),
    };
    if auth.is_empty() {
      continue;
    }

    let prefix = direction.viewer_prefix();
    let mut union_fields: IndexMap<String, FieldSpec> = IndexMap::new();
    let mut union_args: Vec<CredentialArg> = Vec::new();
    let mut union_arg_names: BTreeSet<String> = BTreeSet::new();

    for (protocol, specs) in &auth {
      let Some(definition) = ir.security.get(protocol) else {
        continue;
      };

      let raw_key = format!("viewer:{prefix}:{protocol}");
      let type_name = registry.resolve(Namespace::Types, &raw_key, &format!("{prefix}{}", definition.kind_label()));
      let field_name = registry.resolve(direction.namespace(), &raw_key, &identifiers::to_field_name(&type_name));

      let mut object = Object::new(&type_name);
      for spec in specs {
        object = object.field(spec.materialize());
      }
      objects.push(object);

      let credentials: Vec<CredentialArg> = definition
        .credential_parameters()
        .iter()
        .map(|parameter| CredentialArg {
          name: (*parameter).to_string(),
          store_key: definition.store_key(parameter),
          required: true,
        })
        .collect();

      let args = credentials
        .iter()
        .map(|credential| ArgSpec {
          name: credential.name.clone(),
          type_ref: TypeRef::NonNull(Box::new(TypeRef::named(TypeRef::STRING))),
        })
        .collect();

      let field = FieldSpec {
        name: field_name.clone(),
        type_ref: TypeRef::named(type_name.clone()),
        args,
        kind: FieldKind::Viewer {
          credentials: Arc::new(credentials.clone()),
        },
        list_depth: 0,
        json_leaf: false,
      };
      plain_bucket_mut(buckets, direction).insert(field_name, field);
      report.record_viewer();
      debug!(protocol = %protocol, viewer = %type_name, "viewer type synthesized");

      for spec in specs {
        union_fields.entry(spec.name.clone()).or_insert_with(|| spec.clone());
      }
      for credential in credentials {
        let mut name = credential.name.clone();
        if union_arg_names.contains(&name) {
          // Same-named credentials from two protocols: qualify with the
          // protocol name, then numeric suffixes as the last resort.
          name = identifiers::ensure_unique(
            &identifiers::to_field_name(&format!("{protocol} {name}")),
            &union_arg_names,
          );
        }
        union_arg_names.insert(name.clone());
        union_args.push(CredentialArg {
          name,
          store_key: credential.store_key,
          required: false,
        });
      }
    }

    if union_fields.is_empty() {
      continue;
    }

    let raw_key = format!("viewer:{prefix}:anyAuth");
    let type_name = registry.resolve(Namespace::Types, &raw_key, &format!("{prefix}AnyAuth"));
    let field_name = registry.resolve(direction.namespace(), &raw_key, &identifiers::to_field_name(&type_name));

    let mut object = Object::new(&type_name);
    for spec in union_fields.values() {
      object = object.field(spec.materialize());
    }
    objects.push(object);

    // Any subset of the union's credentials may be supplied; nested
    // resolvers read only what they need.
    let args = union_args
      .iter()
      .map(|credential| ArgSpec {
        name: credential.name.clone(),
        type_ref: TypeRef::named(TypeRef::STRING),
      })
      .collect();

    let field = FieldSpec {
      name: field_name.clone(),
      type_ref: TypeRef::named(type_name.clone()),
      args,
      kind: FieldKind::Viewer {
        credentials: Arc::new(union_args),
      },
      list_depth: 0,
      json_leaf: false,
    };
    plain_bucket_mut(buckets, direction).insert(field_name, field);
    report.record_viewer();
  }

  objects
}

fn plain_bucket_mut(buckets: &mut FieldBuckets, direction: Direction) -> &mut IndexMap<String, FieldSpec> {
  match direction {
    Direction::Query => &mut buckets.query,
    Direction::Mutation => &mut buckets.mutation,
  }
}

//! Final assembly of the root types and the schema artifact.

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, Object, Scalar, Schema, TypeRef};

use super::{
  fields::FieldBuckets,
  type_cache::{JSON_SCALAR, TypeCache},
};
use crate::error::TranslateError;

/// Builds the Query root (with a placeholder field if the bucket is
/// empty, since a root type must expose at least one field), the Mutation
/// root only when it has fields, registers every constructed type, and
/// finishes the schema. Structural violations surface as build errors.
pub(crate) fn assemble(
  buckets: FieldBuckets,
  cache: TypeCache<'_>,
  viewers: Vec<Object>,
) -> Result<Schema, TranslateError> {
  let mut query = Object::new("Query");
  if buckets.query.is_empty() {
    query = query.field(Field::new("placeholder", TypeRef::named(TypeRef::BOOLEAN), |_| {
      FieldFuture::new(async move { Ok(Some(FieldValue::value(true))) })
    }));
  } else {
    for spec in buckets.query.values() {
      query = query.field(spec.materialize());
    }
  }

  let has_mutation = !buckets.mutation.is_empty();
  let mut builder = Schema::build("Query", has_mutation.then_some("Mutation"), None::<&str>);

  if has_mutation {
    let mut mutation = Object::new("Mutation");
    for spec in buckets.mutation.values() {
      mutation = mutation.field(spec.materialize());
    }
    builder = builder.register(mutation);
  }

  builder = builder.register(Scalar::new(JSON_SCALAR));
  let (objects, inputs) = cache.into_parts();
  for (_, object) in objects {
    builder = builder.register(object);
  }
  for (_, input) in inputs {
    builder = builder.register(input);
  }
  for viewer in viewers {
    builder = builder.register(viewer);
  }

  builder
    .register(query)
    .finish()
    .map_err(|error| TranslateError::Build(error.to_string()))
}

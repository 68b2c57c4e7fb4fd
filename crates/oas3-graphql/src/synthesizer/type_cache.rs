//! Memoized construction of graph types from IR type definitions.

use std::collections::{BTreeMap, BTreeSet};

use async_graphql::dynamic::{Field, FieldFuture, InputObject, InputValue, Object, TypeRef};
use indexmap::IndexMap;

use super::{
  fields::FieldSpec,
  resolvers::{self, Payload},
};
use crate::{
  error::{DefinitionKind, TranslateError},
  naming::{NameRegistry, Namespace},
  preprocessor::ir::{Ir, TypeShape},
};

/// Name of the registered free-form scalar.
pub(crate) const JSON_SCALAR: &str = "JSON";

/// Link fields to append to a response type, keyed by type name. The
/// first link-bearing operation to claim a type wins; the loader builds
/// this map before any type is constructed so every consumer of a shared
/// type sees the link-augmented variant.
pub(crate) type LinkFieldMap = IndexMap<String, Vec<FieldSpec>>;

enum AliasTarget {
  Object(String),
  Shape(TypeShape),
}

/// Get-or-construct caches for output object types and their input
/// variants.
///
/// A name is marked before its fields are built, so recursive and
/// self-referential schemas terminate and a name is never constructed
/// twice; later requests see the cached instance regardless of the link
/// set they would have supplied.
pub(crate) struct TypeCache<'a> {
  ir: &'a Ir,
  objects: IndexMap<String, Object>,
  inputs: IndexMap<String, InputObject>,
  started: BTreeSet<String>,
  input_names: BTreeMap<String, String>,
}

impl<'a> TypeCache<'a> {
  pub(crate) fn new(ir: &'a Ir) -> Self {
    Self {
      ir,
      objects: IndexMap::new(),
      inputs: IndexMap::new(),
      started: BTreeSet::new(),
      input_names: BTreeMap::new(),
    }
  }

  pub(crate) fn built_count(&self) -> usize {
    self.objects.len() + self.inputs.len()
  }

  pub(crate) fn into_parts(self) -> (IndexMap<String, Object>, IndexMap<String, InputObject>) {
    (self.objects, self.inputs)
  }

  /// Builds the output object for `name` unless already built, appending
  /// the link fields registered for it.
  pub(crate) fn ensure_object(&mut self, name: &str, links: &LinkFieldMap) -> Result<(), TranslateError> {
    if self.started.contains(name) {
      return Ok(());
    }
    self.started.insert(name.to_string());

    let ir = self.ir;
    let def = ir.types.get(name).ok_or_else(|| missing_type(name))?;
    let TypeShape::Object { properties } = &def.shape else {
      // Array/scalar aliases never materialize as objects; type
      // references flatten through them instead.
      return Ok(());
    };

    let mut object = Object::new(name);
    for (sane, property) in properties {
      let type_ref = self.output_type_ref(&property.shape, links)?;
      let list_depth = self.list_depth(&property.shape);
      let json_leaf = self.json_leaf(&property.shape);
      object = object.field(projection_field(sane, type_ref, property.raw_name.clone(), list_depth, json_leaf));
    }
    if let Some(link_fields) = links.get(name) {
      for spec in link_fields {
        object = object.field(spec.materialize());
      }
    }

    self.objects.insert(name.to_string(), object);
    Ok(())
  }

  /// Type reference for an output position, constructing referenced
  /// object types on the way.
  pub(crate) fn output_type_ref(&mut self, shape: &TypeShape, links: &LinkFieldMap) -> Result<TypeRef, TranslateError> {
    match shape {
      TypeShape::Scalar(kind) => Ok(TypeRef::named(kind.graphql_name())),
      TypeShape::Json | TypeShape::Object { .. } => Ok(TypeRef::named(JSON_SCALAR)),
      TypeShape::Array(items) => Ok(TypeRef::List(Box::new(self.output_type_ref(items, links)?))),
      TypeShape::Reference(name) => match self.resolve_alias(name)? {
        AliasTarget::Object(object_name) => {
          self.ensure_object(&object_name, links)?;
          Ok(TypeRef::named(object_name))
        }
        AliasTarget::Shape(inner) => self.output_type_ref(&inner, links),
      },
    }
  }

  /// Like [`Self::output_type_ref`] but never constructs anything; used
  /// for link fields, whose target types are built when the target
  /// operation itself is processed.
  pub(crate) fn peek_output_type_ref(&self, shape: &TypeShape) -> Result<TypeRef, TranslateError> {
    match shape {
      TypeShape::Scalar(kind) => Ok(TypeRef::named(kind.graphql_name())),
      TypeShape::Json | TypeShape::Object { .. } => Ok(TypeRef::named(JSON_SCALAR)),
      TypeShape::Array(items) => Ok(TypeRef::List(Box::new(self.peek_output_type_ref(items)?))),
      TypeShape::Reference(name) => match self.resolve_alias(name)? {
        AliasTarget::Object(object_name) => Ok(TypeRef::named(object_name)),
        AliasTarget::Shape(inner) => self.peek_output_type_ref(&inner),
      },
    }
  }

  /// Type reference for an input position. Object references construct
  /// their input variant in the input cache, under the reserved `Input`
  /// suffix claimed through the registry.
  pub(crate) fn input_type_ref(
    &mut self,
    shape: &TypeShape,
    registry: &mut NameRegistry,
  ) -> Result<TypeRef, TranslateError> {
    match shape {
      TypeShape::Scalar(kind) => Ok(TypeRef::named(kind.graphql_name())),
      TypeShape::Json | TypeShape::Object { .. } => Ok(TypeRef::named(JSON_SCALAR)),
      TypeShape::Array(items) => Ok(TypeRef::List(Box::new(self.input_type_ref(items, registry)?))),
      TypeShape::Reference(name) => match self.resolve_alias(name)? {
        AliasTarget::Object(object_name) => {
          let input_name = self.ensure_input(&object_name, registry)?;
          Ok(TypeRef::named(input_name))
        }
        AliasTarget::Shape(inner) => self.input_type_ref(&inner, registry),
      },
    }
  }

  fn ensure_input(&mut self, name: &str, registry: &mut NameRegistry) -> Result<String, TranslateError> {
    if let Some(existing) = self.input_names.get(name) {
      return Ok(existing.clone());
    }

    let ir = self.ir;
    let def = ir.types.get(name).ok_or_else(|| missing_type(name))?;
    let input_name = registry.resolve(
      Namespace::Types,
      &format!("{}#input", def.raw_name),
      &format!("{}Input", def.name),
    );
    // Record the mapping before building fields so recursive schemas
    // terminate.
    self.input_names.insert(name.to_string(), input_name.clone());

    let TypeShape::Object { properties } = &def.shape else {
      return Ok(input_name);
    };

    let mut input = InputObject::new(&input_name);
    for (sane, property) in properties {
      let mut type_ref = self.input_type_ref(&property.shape, registry)?;
      if property.required {
        type_ref = TypeRef::NonNull(Box::new(type_ref));
      }
      input = input.field(InputValue::new(sane.clone(), type_ref));
    }

    self.inputs.insert(input_name.clone(), input);
    Ok(input_name)
  }

  /// Follows reference chains until an object type or a terminal
  /// non-reference shape; pure alias cycles degrade to free-form.
  fn resolve_alias(&self, name: &str) -> Result<AliasTarget, TranslateError> {
    let ir = self.ir;
    let mut seen = BTreeSet::new();
    let mut current = name.to_string();
    loop {
      if !seen.insert(current.clone()) {
        return Ok(AliasTarget::Shape(TypeShape::Json));
      }
      let def = ir.types.get(&current).ok_or_else(|| missing_type(&current))?;
      match &def.shape {
        TypeShape::Object { .. } => return Ok(AliasTarget::Object(current)),
        TypeShape::Reference(next) => current = next.clone(),
        other => return Ok(AliasTarget::Shape(other.clone())),
      }
    }
  }

  /// How many list levels the field's declared type wraps around its
  /// element type.
  pub(crate) fn list_depth(&self, shape: &TypeShape) -> u8 {
    match shape {
      TypeShape::Array(items) => 1 + self.list_depth(items),
      TypeShape::Reference(name) => match self.resolve_alias(name) {
        Ok(AliasTarget::Shape(inner)) => self.list_depth(&inner),
        _ => 0,
      },
      _ => 0,
    }
  }

  /// Whether the field's element type is the free-form scalar, which must
  /// resolve as a plain value rather than a payload.
  pub(crate) fn json_leaf(&self, shape: &TypeShape) -> bool {
    match shape {
      TypeShape::Json | TypeShape::Object { .. } => true,
      TypeShape::Array(items) => self.json_leaf(items),
      TypeShape::Reference(name) => match self.resolve_alias(name) {
        Ok(AliasTarget::Shape(inner)) => self.json_leaf(&inner),
        _ => false,
      },
      _ => false,
    }
  }
}

/// A plain output field reading one property of the parent payload by its
/// raw upstream name.
fn projection_field(name: &str, type_ref: TypeRef, raw_name: String, list_depth: u8, json_leaf: bool) -> Field {
  Field::new(name, type_ref, move |ctx| {
    let raw_name = raw_name.clone();
    FieldFuture::new(async move {
      let Some(payload) = ctx.parent_value.downcast_ref::<Payload>() else {
        return Ok(None);
      };
      let value = payload.value.get(&raw_name).cloned().unwrap_or(serde_json::Value::Null);
      Ok(resolvers::field_value(value, &payload.credentials, list_depth, json_leaf))
    })
  })
}

fn missing_type(name: &str) -> TranslateError {
  TranslateError::MissingDefinition {
    kind: DefinitionKind::Type,
    name: name.to_string(),
  }
}

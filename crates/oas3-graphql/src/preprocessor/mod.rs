//! Normalizes a validated OpenAPI specification into the intermediate
//! representation the synthesizers consume.
//!
//! Preprocessing claims every type name up front (components first, then
//! inline sub-schemas as they are hoisted), so the rest of the pipeline
//! only ever deals in sane, globally unique names.

pub(crate) mod ir;
pub(crate) mod runtime_expression;
mod security;

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{Arc, LazyLock},
};

use indexmap::IndexMap;
use oas3::{
  Spec,
  spec::{
    Link, MediaType, ObjectOrReference, ObjectSchema, Operation as SpecOperation, Parameter, ParameterIn, Response,
    Schema, SchemaType, SchemaTypeSet,
  },
};
use regex::Regex;
use tracing::debug;

use self::ir::{
  Ir, LinkDef, Operation, ParameterDef, ParameterLocation, PropertyDef, ScalarKind, SecurityTable, TypeDef, TypeShape,
  TypeTable,
};
use crate::{
  error::{DefinitionKind, TranslateError},
  naming::{NameRegistry, Namespace, identifiers},
  report::{TranslationReport, TranslationWarning},
};

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";
const LINK_REF_PREFIX: &str = "#/components/links/";

static PATH_TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").unwrap());

pub(crate) fn preprocess(
  spec: &Spec,
  registry: &mut NameRegistry,
  report: &mut TranslationReport,
) -> Result<Ir, TranslateError> {
  let base_url = base_url(spec)?;
  let security = security::extract(spec, report);

  let mut preprocessor = Preprocessor {
    spec,
    registry,
    report,
    types: TypeTable::new(),
  };
  preprocessor.hoist_component_schemas()?;
  let operations = preprocessor.collect_operations(&security)?;

  debug!(
    operations = operations.len(),
    types = preprocessor.types.len(),
    schemes = security.len(),
    "specification preprocessed"
  );

  Ok(Ir {
    operations,
    types: Arc::new(preprocessor.types),
    security: Arc::new(security),
    base_url,
  })
}

fn base_url(spec: &Spec) -> Result<String, TranslateError> {
  spec
    .servers
    .first()
    .map(|server| server.url.trim_end_matches('/').to_string())
    .ok_or_else(|| TranslateError::Validation("specification declares no servers".to_string()))
}

struct Preprocessor<'a> {
  spec: &'a Spec,
  registry: &'a mut NameRegistry,
  report: &'a mut TranslationReport,
  types: TypeTable,
}

impl Preprocessor<'_> {
  fn hoist_component_schemas(&mut self) -> Result<(), TranslateError> {
    let spec = self.spec;
    let Some(components) = &spec.components else {
      return Ok(());
    };

    // Claim every component name before building any shape, so reference
    // traversal order cannot influence which raw name wins a collision.
    for raw in components.schemas.keys() {
      self.registry.resolve(Namespace::Types, raw, &identifiers::to_type_name(raw));
    }

    for (raw, schema_ref) in &components.schemas {
      let sane = self.registry.resolve(Namespace::Types, raw, &identifiers::to_type_name(raw));
      let schema = schema_ref
        .resolve(spec)
        .map_err(|error| TranslateError::Validation(format!("schema `{raw}` failed to resolve: {error}")))?;
      let shape = self.shape_of(&schema, &sane)?;
      self.types.insert(
        sane.clone(),
        TypeDef {
          name: sane,
          raw_name: raw.clone(),
          shape,
        },
      );
    }

    Ok(())
  }

  fn collect_operations(&mut self, security: &SecurityTable) -> Result<Vec<Operation>, TranslateError> {
    let spec = self.spec;
    let mut used_ids = BTreeSet::new();
    let mut operations = Vec::new();

    for (path, method, operation) in spec.operations() {
      let base_id = identifiers::stable_operation_id(method.as_str(), &path, operation.operation_id.as_deref());
      let id = identifiers::ensure_unique(&base_id, &used_ids);
      used_ids.insert(id.clone());

      let response = self.success_response(&operation);
      let res_type = match &response {
        Some(found) => self.response_type(found, &id)?,
        None => None,
      };
      let Some(res_type) = res_type else {
        self
          .report
          .record_skipped_operation(TranslationWarning::MissingResponseSchema { operation: id });
        continue;
      };

      let links = response.as_ref().map(|found| self.extract_links(found)).unwrap_or_default();
      let (req_type, req_required) = self.request_type(&operation, &id)?;
      let parameters = self.collect_parameters(&path, &operation, &id)?;
      let security_alts = self.operation_security(&operation, security)?;

      operations.push(Operation {
        id,
        raw_operation_id: operation.operation_id.clone(),
        method: method.clone(),
        path,
        res_type,
        req_type,
        req_required,
        parameters,
        security: security_alts,
        links,
      });
    }

    Ok(operations)
  }

  /// First 2xx response in status order, falling back to `default`.
  fn success_response(&self, operation: &SpecOperation) -> Option<Response> {
    let responses = operation.responses.as_ref()?;
    let key = responses
      .keys()
      .find(|status| status.starts_with('2'))
      .or_else(|| responses.keys().find(|status| status.as_str() == "default"))?;
    responses.get(key)?.resolve(self.spec).ok()
  }

  fn response_type(&mut self, response: &Response, id: &str) -> Result<Option<String>, TranslateError> {
    let Some(schema_ref) = json_schema(&response.content) else {
      return Ok(None);
    };
    let context = format!("{}Response", identifiers::to_type_name(id));
    let shape = self.shape_of_ref(&schema_ref, &context)?;
    Ok(Some(self.type_name_for(shape, &context)))
  }

  fn request_type(&mut self, operation: &SpecOperation, id: &str) -> Result<(Option<String>, bool), TranslateError> {
    let Some(body_ref) = &operation.request_body else {
      return Ok((None, false));
    };
    let Ok(body) = body_ref.resolve(self.spec) else {
      return Ok((None, false));
    };
    let Some(schema_ref) = json_schema(&body.content) else {
      return Ok((None, false));
    };
    let context = format!("{}Request", identifiers::to_type_name(id));
    let shape = self.shape_of_ref(&schema_ref, &context)?;
    let name = self.type_name_for(shape, &context);
    Ok((Some(name), body.required.unwrap_or(false)))
  }

  /// Wraps an anonymous shape in a named definition so operations always
  /// reference types by name.
  fn type_name_for(&mut self, shape: TypeShape, context: &str) -> String {
    match shape {
      TypeShape::Reference(name) => name,
      other => {
        let sane = self
          .registry
          .resolve(Namespace::Types, &format!("#synth:{context}"), &identifiers::to_type_name(context));
        self.types.entry(sane.clone()).or_insert_with(|| TypeDef {
          name: sane.clone(),
          raw_name: context.to_string(),
          shape: other,
        });
        sane
      }
    }
  }

  fn collect_parameters(
    &mut self,
    path: &str,
    operation: &SpecOperation,
    id: &str,
  ) -> Result<Vec<ParameterDef>, TranslateError> {
    let spec = self.spec;

    // Operation-level parameters override path-item parameters of the
    // same name and location.
    let mut raw_params: Vec<Parameter> = Vec::new();
    if let Some(path_item) = spec.paths.as_ref().and_then(|paths| paths.get(path)) {
      raw_params.extend(path_item.parameters.iter().filter_map(|r| r.resolve(spec).ok()));
    }
    for param in operation.parameters.iter().filter_map(|r| r.resolve(spec).ok()) {
      raw_params.retain(|existing| existing.location != param.location || existing.name != param.name);
      raw_params.push(param);
    }

    let mut used = BTreeSet::new();
    let mut parameters = Vec::new();
    for param in &raw_params {
      let location = match param.location {
        ParameterIn::Path => ParameterLocation::Path,
        ParameterIn::Query => ParameterLocation::Query,
        ParameterIn::Header => ParameterLocation::Header,
        ParameterIn::Cookie => {
          self.report.record_warning(TranslationWarning::IgnoredCookieParameter {
            operation: id.to_string(),
            parameter: param.name.clone(),
          });
          continue;
        }
      };

      let shape = match &param.schema {
        Some(schema_ref) => self.shape_of_ref(
          schema_ref,
          &format!("{}{}", identifiers::to_type_name(id), identifiers::to_type_name(&param.name)),
        )?,
        None => TypeShape::Scalar(ScalarKind::String),
      };

      let sane = identifiers::ensure_unique(&identifiers::to_field_name(&param.name), &used);
      used.insert(sane.clone());
      parameters.push(ParameterDef {
        raw_name: param.name.clone(),
        sane_name: sane,
        location,
        required: param.required.unwrap_or(location == ParameterLocation::Path),
        shape,
      });
    }

    // Path placeholders the specification forgot to declare become
    // required string parameters, so every template slot stays fillable.
    for placeholder in template_parameters(path) {
      if parameters
        .iter()
        .any(|p| p.location == ParameterLocation::Path && p.raw_name == placeholder)
      {
        continue;
      }
      let sane = identifiers::ensure_unique(&identifiers::to_field_name(&placeholder), &used);
      used.insert(sane.clone());
      parameters.push(ParameterDef {
        raw_name: placeholder,
        sane_name: sane,
        location: ParameterLocation::Path,
        required: true,
        shape: TypeShape::Scalar(ScalarKind::String),
      });
    }

    Ok(parameters)
  }

  fn operation_security(
    &self,
    operation: &SpecOperation,
    table: &SecurityTable,
  ) -> Result<Vec<Vec<String>>, TranslateError> {
    let requirements = if operation.security.is_empty() {
      &self.spec.security
    } else {
      &operation.security
    };
    if requirements.is_empty() {
      return Ok(Vec::new());
    }

    let mut alternatives = Vec::new();
    for requirement in requirements {
      // An empty requirement object means anonymous access suffices.
      if requirement.0.is_empty() {
        return Ok(Vec::new());
      }
      let names: Vec<String> = requirement.0.keys().cloned().collect();
      for name in &names {
        if !table.contains_key(name) {
          return Err(TranslateError::MissingDefinition {
            kind: DefinitionKind::SecurityScheme,
            name: name.clone(),
          });
        }
      }
      alternatives.push(names);
    }
    Ok(alternatives)
  }

  fn extract_links(&self, response: &Response) -> Vec<LinkDef> {
    let mut links = Vec::new();
    for (name, link_ref) in &response.links {
      let Some(link) = self.resolve_link_ref(link_ref) else {
        continue;
      };
      let Link::Id {
        operation_id,
        parameters,
        ..
      } = link
      else {
        continue;
      };

      let mut bindings = IndexMap::new();
      for (param_name, expression) in parameters {
        bindings.insert(param_name.clone(), runtime_expression::parse(expression));
      }

      links.push(LinkDef {
        name: name.clone(),
        target_operation: operation_id.clone(),
        parameters: bindings,
      });
    }
    links
  }

  fn resolve_link_ref<'l>(&'l self, link_ref: &'l ObjectOrReference<Link>) -> Option<&'l Link> {
    match link_ref {
      ObjectOrReference::Object(link) => Some(link),
      ObjectOrReference::Ref { ref_path, .. } => {
        let name = ref_path.strip_prefix(LINK_REF_PREFIX)?;
        self
          .spec
          .components
          .as_ref()?
          .links
          .get(name)
          .and_then(|nested| match nested {
            ObjectOrReference::Object(link) => Some(link),
            ObjectOrReference::Ref { .. } => None,
          })
      }
    }
  }

  fn shape_of(&mut self, schema: &ObjectSchema, context: &str) -> Result<TypeShape, TranslateError> {
    let merged;
    let schema = if schema.all_of.is_empty() {
      schema
    } else {
      merged = self.merge_all_of(schema)?;
      &merged
    };

    if !schema.one_of.is_empty() || !schema.any_of.is_empty() {
      self
        .report
        .record_warning(TranslationWarning::UnsupportedComposition { schema: context.to_string() });
      return Ok(TypeShape::Json);
    }

    match primary_type(schema) {
      Some(SchemaType::Object) | None if !schema.properties.is_empty() => self.object_shape(schema, context),
      Some(SchemaType::Object) => Ok(TypeShape::Json),
      Some(SchemaType::Array) => {
        let item_shape = match schema.items.as_deref() {
          Some(Schema::Object(items_ref)) => self.shape_of_ref(items_ref, &format!("{context}Item"))?,
          _ => TypeShape::Json,
        };
        Ok(TypeShape::Array(Box::new(item_shape)))
      }
      Some(SchemaType::String) => Ok(TypeShape::Scalar(ScalarKind::String)),
      Some(SchemaType::Integer) => Ok(TypeShape::Scalar(ScalarKind::Int)),
      Some(SchemaType::Number) => Ok(TypeShape::Scalar(ScalarKind::Float)),
      Some(SchemaType::Boolean) => Ok(TypeShape::Scalar(ScalarKind::Boolean)),
      Some(SchemaType::Null) | None => Ok(TypeShape::Json),
    }
  }

  fn object_shape(&mut self, schema: &ObjectSchema, context: &str) -> Result<TypeShape, TranslateError> {
    let mut properties = IndexMap::new();
    let mut used = BTreeSet::new();

    for (raw_prop, prop_ref) in &schema.properties {
      let shape = self.shape_of_ref(prop_ref, &format!("{context}{}", identifiers::to_type_name(raw_prop)))?;
      let sane = identifiers::ensure_unique(&identifiers::to_field_name(raw_prop), &used);
      used.insert(sane.clone());
      properties.insert(
        sane,
        PropertyDef {
          raw_name: raw_prop.clone(),
          required: schema.required.contains(raw_prop),
          shape,
        },
      );
    }

    Ok(TypeShape::Object { properties })
  }

  fn shape_of_ref(
    &mut self,
    schema_ref: &ObjectOrReference<ObjectSchema>,
    context: &str,
  ) -> Result<TypeShape, TranslateError> {
    match schema_ref {
      ObjectOrReference::Ref { ref_path, .. } => {
        let Some(raw) = ref_path.strip_prefix(SCHEMA_REF_PREFIX) else {
          return Err(TranslateError::Validation(format!("unsupported reference `{ref_path}`")));
        };
        let declared = self
          .spec
          .components
          .as_ref()
          .is_some_and(|components| components.schemas.contains_key(raw));
        if !declared {
          return Err(TranslateError::MissingDefinition {
            kind: DefinitionKind::Type,
            name: raw.to_string(),
          });
        }
        Ok(TypeShape::Reference(self.registry.resolve(
          Namespace::Types,
          raw,
          &identifiers::to_type_name(raw),
        )))
      }
      ObjectOrReference::Object(inline) => {
        let shape = self.shape_of(inline, context)?;
        match shape {
          // Hoist inline objects under a name derived from the enclosing
          // path, keeping the flat graph namespace unique.
          TypeShape::Object { .. } => {
            let sane = self.registry.resolve(
              Namespace::Types,
              &format!("#inline:{context}"),
              &identifiers::to_type_name(context),
            );
            self.types.entry(sane.clone()).or_insert_with(|| TypeDef {
              name: sane.clone(),
              raw_name: context.to_string(),
              shape,
            });
            Ok(TypeShape::Reference(sane))
          }
          other => Ok(other),
        }
      }
    }
  }

  fn merge_all_of(&mut self, schema: &ObjectSchema) -> Result<ObjectSchema, TranslateError> {
    let mut merged = schema.clone();
    merged.all_of = Vec::new();

    for part_ref in &schema.all_of {
      let part = match part_ref {
        ObjectOrReference::Object(inline) if inline.all_of.is_empty() => inline.clone(),
        ObjectOrReference::Object(inline) => self.merge_all_of(inline)?,
        ObjectOrReference::Ref { .. } => {
          let resolved = part_ref
            .resolve(self.spec)
            .map_err(|error| TranslateError::Validation(format!("allOf reference failed to resolve: {error}")))?;
          if resolved.all_of.is_empty() {
            resolved
          } else {
            self.merge_all_of(&resolved)?
          }
        }
      };

      // The declaring schema's own properties win over inherited ones.
      for (name, prop) in &part.properties {
        merged.properties.entry(name.clone()).or_insert_with(|| prop.clone());
      }
      for required in &part.required {
        if !merged.required.contains(required) {
          merged.required.push(required.clone());
        }
      }
      if merged.schema_type.is_none() {
        merged.schema_type.clone_from(&part.schema_type);
      }
    }

    Ok(merged)
  }
}

fn primary_type(schema: &ObjectSchema) -> Option<SchemaType> {
  match &schema.schema_type {
    Some(SchemaTypeSet::Single(single)) => Some(single.clone()),
    Some(SchemaTypeSet::Multiple(types)) => types.iter().find(|t| !matches!(t, SchemaType::Null)).cloned(),
    None => None,
  }
}

fn json_schema(content: &BTreeMap<String, MediaType>) -> Option<ObjectOrReference<ObjectSchema>> {
  let media = content
    .get("application/json")
    .or_else(|| content.iter().find(|(key, _)| key.contains("json")).map(|(_, value)| value))?;
  media.schema.clone()
}

fn template_parameters(path: &str) -> Vec<String> {
  PATH_TEMPLATE_RE
    .captures_iter(path)
    .map(|capture| capture[1].to_string())
    .collect()
}

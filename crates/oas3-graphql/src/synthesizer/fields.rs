//! Field construction and routing: composes a memoized type, a call plan,
//! and an argument list into one field, then routes it into the right
//! root or authenticated bucket.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, TypeRef};
use http::Method;
use indexmap::IndexMap;
use oas3_graphql_support::Transport;
use tracing::{debug, warn};

use super::{
  resolvers::{self, BodyPlan, CallPlan, CredentialStore, Payload},
  type_cache::{LinkFieldMap, TypeCache},
};
use crate::{
  error::TranslateError,
  naming::{NameRegistry, Namespace, identifiers},
  options::Options,
  preprocessor::{
    ir::{Ir, Operation, TypeShape},
    runtime_expression::RuntimeExpression,
  },
  report::{TranslationReport, TranslationWarning},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
  Query,
  Mutation,
}

impl Direction {
  pub(crate) fn namespace(self) -> Namespace {
    match self {
      Self::Query => Namespace::QueryFields,
      Self::Mutation => Namespace::MutationFields,
    }
  }

  pub(crate) fn viewer_prefix(self) -> &'static str {
    match self {
      Self::Query => "Viewer",
      Self::Mutation => "MutationViewer",
    }
  }
}

#[derive(Clone)]
pub(crate) struct ArgSpec {
  pub name: String,
  pub type_ref: TypeRef,
}

/// One implicit argument of a link field, fed from the parent's resolved
/// value instead of the query document.
#[derive(Clone)]
pub(crate) struct LinkBinding {
  pub parameter: String,
  pub expression: RuntimeExpression,
}

#[derive(Clone)]
pub(crate) struct CredentialArg {
  pub name: String,
  pub store_key: String,
  pub required: bool,
}

#[derive(Clone)]
pub(crate) enum FieldKind {
  Operation { plan: Arc<CallPlan> },
  Link { plan: Arc<CallPlan>, bindings: Arc<Vec<LinkBinding>> },
  Viewer { credentials: Arc<Vec<CredentialArg>> },
}

/// Everything needed to materialize one executable field.
///
/// Specs are cheap to clone (the call plan is shared), which is what lets
/// one operation register under several protocol buckets and again in the
/// any-auth union without rebuilding its type or plan.
#[derive(Clone)]
pub(crate) struct FieldSpec {
  pub name: String,
  pub type_ref: TypeRef,
  pub args: Vec<ArgSpec>,
  pub kind: FieldKind,
  pub list_depth: u8,
  pub json_leaf: bool,
}

impl FieldSpec {
  pub(crate) fn materialize(&self) -> Field {
    let mut field = match &self.kind {
      FieldKind::Operation { plan } => operation_field(self, plan.clone(), None),
      FieldKind::Link { plan, bindings } => operation_field(self, plan.clone(), Some(bindings.clone())),
      FieldKind::Viewer { credentials } => viewer_field(self, credentials.clone()),
    };
    for arg in &self.args {
      field = field.argument(InputValue::new(arg.name.clone(), arg.type_ref.clone()));
    }
    field
  }
}

fn operation_field(spec: &FieldSpec, plan: Arc<CallPlan>, bindings: Option<Arc<Vec<LinkBinding>>>) -> Field {
  let list_depth = spec.list_depth;
  let json_leaf = spec.json_leaf;
  let arg_names: Arc<Vec<String>> = Arc::new(spec.args.iter().map(|arg| arg.name.clone()).collect());

  Field::new(spec.name.clone(), spec.type_ref.clone(), move |ctx| {
    let plan = plan.clone();
    let bindings = bindings.clone();
    let arg_names = arg_names.clone();
    FieldFuture::new(async move {
      let parent = ctx.parent_value.downcast_ref::<Payload>();
      let credentials = parent.map(|payload| payload.credentials.clone()).unwrap_or_default();

      let mut args: BTreeMap<String, serde_json::Value> = BTreeMap::new();
      for name in arg_names.iter() {
        if let Some(accessor) = ctx.args.get(name.as_str()) {
          args.insert(name.clone(), accessor.deserialize()?);
        }
      }
      if let (Some(bindings), Some(parent)) = (&bindings, parent) {
        for binding in bindings.iter() {
          if let Some(value) = binding.expression.evaluate(&parent.value) {
            args.insert(binding.parameter.clone(), value);
          }
        }
      }

      let value = plan
        .execute(&args, &credentials)
        .await
        .map_err(|error| async_graphql::Error::new(error.to_string()))?;
      Ok(resolvers::field_value(value, &credentials, list_depth, json_leaf))
    })
  })
}

fn viewer_field(spec: &FieldSpec, credentials: Arc<Vec<CredentialArg>>) -> Field {
  Field::new(spec.name.clone(), spec.type_ref.clone(), move |ctx| {
    let credentials = credentials.clone();
    FieldFuture::new(async move {
      let mut store: CredentialStore = ctx
        .parent_value
        .downcast_ref::<Payload>()
        .map(|payload| payload.credentials.clone())
        .unwrap_or_default();

      for credential in credentials.iter() {
        match ctx.args.get(credential.name.as_str()) {
          Some(accessor) => {
            let value: String = accessor.deserialize()?;
            if value.is_empty() {
              return Err(async_graphql::Error::new(format!(
                "credential `{}` must not be empty",
                credential.name
              )));
            }
            store.insert(credential.store_key.clone(), value);
          }
          None if credential.required => {
            return Err(async_graphql::Error::new(format!(
              "credential `{}` is required",
              credential.name
            )));
          }
          None => {}
        }
      }

      Ok(Some(FieldValue::owned_any(Payload {
        value: serde_json::Value::Object(serde_json::Map::new()),
        credentials: store,
      })))
    })
  })
}

/// Accumulators returned from routing; plain buckets are keyed by field
/// name, authenticated buckets by protocol name.
#[derive(Default)]
pub(crate) struct FieldBuckets {
  pub query: IndexMap<String, FieldSpec>,
  pub mutation: IndexMap<String, FieldSpec>,
  pub auth_query: IndexMap<String, Vec<FieldSpec>>,
  pub auth_mutation: IndexMap<String, Vec<FieldSpec>>,
}

pub(crate) struct FieldLoader<'ir, 'm> {
  ir: &'ir Ir,
  registry: &'m mut NameRegistry,
  options: &'m Options,
  transport: Arc<dyn Transport>,
  report: &'m mut TranslationReport,
  cache: TypeCache<'ir>,
  plans: BTreeMap<String, Arc<CallPlan>>,
  buckets: FieldBuckets,
}

impl<'ir, 'm> FieldLoader<'ir, 'm> {
  pub(crate) fn new(
    ir: &'ir Ir,
    registry: &'m mut NameRegistry,
    options: &'m Options,
    transport: Arc<dyn Transport>,
    report: &'m mut TranslationReport,
  ) -> Self {
    Self {
      ir,
      registry,
      options,
      transport,
      report,
      cache: TypeCache::new(ir),
      plans: BTreeMap::new(),
      buckets: FieldBuckets::default(),
    }
  }

  /// Routes every operation into its bucket. Link-bearing operations are
  /// processed first, in full, and the link-field map is assembled before
  /// any type is constructed, so a response type shared between
  /// operations with differing link sets is always cached in its
  /// link-augmented form, whatever the specification's iteration order.
  pub(crate) fn route(mut self) -> Result<(FieldBuckets, TypeCache<'ir>), TranslateError> {
    let ir = self.ir;
    let (linked, plain): (Vec<&Operation>, Vec<&Operation>) =
      ir.operations.iter().partition(|operation| !operation.links.is_empty());

    let mut link_map = LinkFieldMap::new();
    for operation in &linked {
      if link_map.contains_key(&operation.res_type) {
        // First link-bearing operation to claim a response type wins.
        warn!(
          operation = %operation.id,
          response_type = %operation.res_type,
          "response type already carries another operation's links"
        );
        continue;
      }
      let link_fields = self.link_fields(operation)?;
      if !link_fields.is_empty() {
        link_map.insert(operation.res_type.clone(), link_fields);
      }
    }

    for operation in linked.iter().chain(plain.iter()) {
      self.load(operation, &link_map)?;
    }

    Ok((self.buckets, self.cache))
  }

  fn load(&mut self, operation: &Operation, links: &LinkFieldMap) -> Result<(), TranslateError> {
    let direction = if operation.method == Method::GET {
      Direction::Query
    } else {
      Direction::Mutation
    };

    let hint = self.field_hint(operation);
    let name = self
      .registry
      .resolve(direction.namespace(), &format!("op:{}", operation.id), &hint);
    let plan = self.call_plan(operation);
    let args = self.build_args(operation, &BTreeSet::new())?;

    let shape = TypeShape::Reference(operation.res_type.clone());
    let type_ref = self.cache.output_type_ref(&shape, links)?;
    let spec = FieldSpec {
      name: name.clone(),
      type_ref,
      args,
      kind: FieldKind::Operation { plan: plan.clone() },
      list_depth: self.cache.list_depth(&shape),
      json_leaf: self.cache.json_leaf(&shape),
    };

    if plan.authenticated {
      for protocol in self.supported_protocols(operation) {
        self.auth_bucket_mut(direction).entry(protocol).or_default().push(spec.clone());
      }
      debug!(operation = %operation.id, field = %name, "field routed into authenticated buckets");
    } else {
      self.plain_bucket_mut(direction).insert(name, spec);
    }

    self.report.record_operation();
    Ok(())
  }

  fn link_fields(&mut self, operation: &Operation) -> Result<Vec<FieldSpec>, TranslateError> {
    let mut specs = Vec::new();
    let mut used = BTreeSet::new();

    for link in &operation.links {
      let Some(target) = self.find_operation(&link.target_operation) else {
        self.report.record_warning(TranslationWarning::UnresolvedLinkTarget {
          link: link.name.clone(),
          target: link.target_operation.clone(),
        });
        continue;
      };

      let mut bindings = Vec::new();
      let mut bound = BTreeSet::new();
      for (raw_parameter, expression) in &link.parameters {
        let Some(parameter) = target.parameters.iter().find(|p| p.raw_name == *raw_parameter) else {
          self.report.record_warning(TranslationWarning::UnknownLinkParameter {
            link: link.name.clone(),
            parameter: raw_parameter.clone(),
          });
          continue;
        };
        if matches!(expression, RuntimeExpression::Unsupported(_)) {
          // The parameter stays an explicit argument on the link field.
          self.report.record_warning(TranslationWarning::UnsupportedLinkParameter {
            link: link.name.clone(),
            parameter: raw_parameter.clone(),
          });
          continue;
        }
        bindings.push(LinkBinding {
          parameter: parameter.sane_name.clone(),
          expression: expression.clone(),
        });
        bound.insert(parameter.sane_name.clone());
      }

      let args = self.build_args(target, &bound)?;
      let plan = self.call_plan(target);
      let shape = TypeShape::Reference(target.res_type.clone());
      let type_ref = self.cache.peek_output_type_ref(&shape)?;
      let name = identifiers::ensure_unique(&identifiers::to_field_name(&link.name), &used);
      used.insert(name.clone());

      specs.push(FieldSpec {
        name,
        type_ref,
        args,
        kind: FieldKind::Link {
          plan,
          bindings: Arc::new(bindings),
        },
        list_depth: self.cache.list_depth(&shape),
        json_leaf: self.cache.json_leaf(&shape),
      });
    }

    Ok(specs)
  }

  /// One argument per parameter not fed by a link binding, plus the body
  /// argument when the operation takes a request type.
  fn build_args(&mut self, operation: &Operation, bound: &BTreeSet<String>) -> Result<Vec<ArgSpec>, TranslateError> {
    let mut args = Vec::new();

    for parameter in &operation.parameters {
      if bound.contains(&parameter.sane_name) {
        continue;
      }
      let mut type_ref = self.cache.input_type_ref(&parameter.shape, self.registry)?;
      if parameter.required {
        type_ref = TypeRef::NonNull(Box::new(type_ref));
      }
      args.push(ArgSpec {
        name: parameter.sane_name.clone(),
        type_ref,
      });
    }

    if let Some(request_type) = &operation.req_type {
      let shape = TypeShape::Reference(request_type.clone());
      let mut type_ref = self.cache.input_type_ref(&shape, self.registry)?;
      if operation.req_required {
        type_ref = TypeRef::NonNull(Box::new(type_ref));
      }
      args.push(ArgSpec {
        name: body_arg_name(operation),
        type_ref,
      });
    }

    Ok(args)
  }

  fn call_plan(&mut self, operation: &Operation) -> Arc<CallPlan> {
    if let Some(existing) = self.plans.get(&operation.id) {
      return existing.clone();
    }

    let ir = self.ir;
    let authenticated = self.options.viewer && !self.supported_protocols(operation).is_empty();
    let plan = Arc::new(CallPlan {
      method: operation.method.clone(),
      base_url: ir.base_url.clone(),
      path: operation.path.clone(),
      parameters: operation.parameters.clone(),
      body: operation.req_type.as_ref().map(|type_name| BodyPlan {
        arg_name: body_arg_name(operation),
        type_name: type_name.clone(),
      }),
      security: operation.security.clone(),
      authenticated,
      headers: self.options.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
      qs: self.options.qs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
      types: ir.types.clone(),
      schemes: ir.security.clone(),
      transport: self.transport.clone(),
    });

    self.plans.insert(operation.id.clone(), plan.clone());
    plan
  }

  /// Protocol names that can produce a viewer, in declaration order,
  /// deduplicated across the operation's alternatives.
  fn supported_protocols(&self, operation: &Operation) -> Vec<String> {
    let ir = self.ir;
    let mut seen = BTreeSet::new();
    let mut protocols = Vec::new();
    for name in operation.security.iter().flatten() {
      if seen.insert(name.clone()) && ir.security.get(name).is_some_and(|def| def.supported()) {
        protocols.push(name.clone());
      }
    }
    protocols
  }

  /// The innermost named type of the response shape names the field, so
  /// list responses read naturally; scalar responses fall back to the
  /// operation id.
  fn field_hint(&self, operation: &Operation) -> String {
    let ir = self.ir;
    let mut seen = BTreeSet::new();
    let mut current = operation.res_type.clone();
    while seen.insert(current.clone()) {
      let Some(def) = ir.types.get(&current) else {
        break;
      };
      match &def.shape {
        TypeShape::Object { .. } => return identifiers::to_field_name(&def.raw_name),
        TypeShape::Reference(next) => current = next.clone(),
        TypeShape::Array(items) => {
          let mut shape = items.as_ref();
          loop {
            match shape {
              TypeShape::Array(inner) => shape = inner,
              TypeShape::Reference(next) => {
                current = next.clone();
                break;
              }
              _ => return identifiers::to_field_name(&operation.id),
            }
          }
        }
        _ => return identifiers::to_field_name(&operation.id),
      }
    }
    identifiers::to_field_name(&operation.id)
  }

  fn find_operation(&self, operation_id: &str) -> Option<&'ir Operation> {
    self
      .ir
      .operations
      .iter()
      .find(|operation| operation.raw_operation_id.as_deref() == Some(operation_id))
  }

  fn plain_bucket_mut(&mut self, direction: Direction) -> &mut IndexMap<String, FieldSpec> {
    match direction {
      Direction::Query => &mut self.buckets.query,
      Direction::Mutation => &mut self.buckets.mutation,
    }
  }

  fn auth_bucket_mut(&mut self, direction: Direction) -> &mut IndexMap<String, Vec<FieldSpec>> {
    match direction {
      Direction::Query => &mut self.buckets.auth_query,
      Direction::Mutation => &mut self.buckets.auth_mutation,
    }
  }
}

/// The request-body argument is named `input` unless a declared parameter
/// already took that name; the plan and the argument list derive it the
/// same way.
pub(crate) fn body_arg_name(operation: &Operation) -> String {
  let taken: BTreeSet<String> = operation.parameters.iter().map(|p| p.sane_name.clone()).collect();
  identifiers::ensure_unique("input", &taken)
}

use oas3::{
  Spec,
  spec::{ObjectOrReference, SecurityScheme},
};

use super::ir::{ApiKeyLocation, CredentialKind, SecurityDef, SecurityTable};
use crate::report::{TranslationReport, TranslationWarning};

/// Builds the security table from the specification's components.
///
/// Every declared scheme gets an entry so operation references always
/// resolve; schemes whose credentials cannot be collected through viewer
/// arguments are recorded as unsupported.
pub(crate) fn extract(spec: &Spec, report: &mut TranslationReport) -> SecurityTable {
  let mut table = SecurityTable::new();

  let Some(components) = &spec.components else {
    return table;
  };

  for (name, scheme_ref) in &components.security_schemes {
    let Some(scheme) = resolve_scheme_ref(spec, scheme_ref) else {
      continue;
    };

    let kind = credential_kind(scheme);
    if kind == CredentialKind::Unsupported {
      report.record_warning(TranslationWarning::UnsupportedSecurityScheme { scheme: name.clone() });
    }

    table.insert(
      name.clone(),
      SecurityDef {
        name: name.clone(),
        kind,
      },
    );
  }

  table
}

fn credential_kind(scheme: &SecurityScheme) -> CredentialKind {
  match scheme {
    SecurityScheme::ApiKey { name, location, .. } => match location.as_str() {
      "header" => CredentialKind::ApiKey {
        param: name.clone(),
        location: ApiKeyLocation::Header,
      },
      "query" => CredentialKind::ApiKey {
        param: name.clone(),
        location: ApiKeyLocation::Query,
      },
      // Cookie-carried keys would need a cookie jar on the transport.
      _ => CredentialKind::Unsupported,
    },
    SecurityScheme::Http { scheme, .. } => match scheme.to_lowercase().as_str() {
      "basic" => CredentialKind::Basic,
      "bearer" => CredentialKind::Bearer,
      _ => CredentialKind::Unsupported,
    },
    _ => CredentialKind::Unsupported,
  }
}

fn resolve_scheme_ref<'a>(
  spec: &'a Spec,
  scheme_ref: &'a ObjectOrReference<SecurityScheme>,
) -> Option<&'a SecurityScheme> {
  match scheme_ref {
    ObjectOrReference::Object(scheme) => Some(scheme),
    ObjectOrReference::Ref { ref_path, .. } => {
      let name = ref_path.strip_prefix("#/components/securitySchemes/")?;
      spec
        .components
        .as_ref()?
        .security_schemes
        .get(name)
        .and_then(|nested| match nested {
          ObjectOrReference::Object(scheme) => Some(scheme),
          ObjectOrReference::Ref { .. } => None,
        })
    }
  }
}

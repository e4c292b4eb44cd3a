use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use orgform_config::{UnitDef, UnitKind};
use orgform_organization::{AttributeLookup, EntityKind, Organization, OrganizationEntity, Target};
use orgform_state::PersistedState;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::artifact::{ImportRef, RenderedArtifact};
use crate::coerce::coerce_parameters;
use crate::error::RenderError;
use crate::interpolate::interpolate;

/// Renders units for targets of one organization.
///
/// Physical ids are taken from the identifier bindings of `state` first and
/// from the organization second. Imported outputs come from the deployment
/// records of `state`.
pub struct TemplateRenderer<'a> {
  organization: &'a Organization,
  state: &'a PersistedState,
}

impl<'a> TemplateRenderer<'a> {
  pub fn new(organization: &'a Organization, state: &'a PersistedState) -> Self {
    Self {
      organization,
      state,
    }
  }

  /// Render `unit` for `target`.
  ///
  /// Fails with [`RenderError::UnresolvedExport`] listing every import whose
  /// output has not been recorded yet.
  pub fn render(&self, unit: &UnitDef, target: &Target) -> Result<RenderedArtifact, RenderError> {
    let (walker, body, parameters) = self.walk_unit(unit, target)?;

    if !walker.missing.is_empty() {
      return Err(RenderError::UnresolvedExport {
        unit: unit.name.clone(),
        target: target.key(),
        missing: walker.missing.into_iter().collect(),
      });
    }

    debug!(unit = %unit.name, target = %target.key(), imports = walker.imports.len(), "unit_rendered");

    Ok(RenderedArtifact {
      body,
      parameters: coerce_parameters(parameters),
      imports: walker.imports,
    })
  }

  /// Every import a render of `unit` for `target` performs, whether or not
  /// the imported outputs are available.
  pub fn collect_imports(
    &self,
    unit: &UnitDef,
    target: &Target,
  ) -> Result<BTreeSet<ImportRef>, RenderError> {
    let (walker, _, _) = self.walk_unit(unit, target)?;
    Ok(walker.imports)
  }

  fn walk_unit<'w>(
    &'w self,
    unit: &'w UnitDef,
    target: &'w Target,
  ) -> Result<(Walker<'w, 'a>, Value, BTreeMap<String, Value>), RenderError> {
    let mut walker = Walker {
      renderer: self,
      unit: &unit.name,
      target,
      imports: BTreeSet::new(),
      missing: BTreeSet::new(),
    };

    let (body, parameters) = match &unit.kind {
      UnitKind::Stack {
        template,
        parameters,
      } => {
        let body = walker.walk(template)?;
        let mut rendered = BTreeMap::new();
        for (name, value) in parameters {
          rendered.insert(name.clone(), walker.walk(value)?);
        }
        (body, rendered)
      }
      UnitKind::Plugin { config, .. } => (walker.walk(config)?, BTreeMap::new()),
    };

    Ok((walker, body, parameters))
  }
}

/// Tree walk over one unit for one target.
struct Walker<'w, 'a> {
  renderer: &'w TemplateRenderer<'a>,
  unit: &'w str,
  target: &'w Target,
  imports: BTreeSet<ImportRef>,
  missing: BTreeSet<ImportRef>,
}

impl Walker<'_, '_> {
  fn walk(&mut self, value: &Value) -> Result<Value, RenderError> {
    match value {
      Value::Array(items) => items
        .iter()
        .map(|item| self.walk(item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array),
      Value::Object(map) => {
        if map.len() == 1
          && let Some((function, arg)) = map.iter().next()
        {
          match function.as_str() {
            "Ref" => return self.reference_expression(value, arg),
            "Fn::GetAtt" => return self.attribute_expression(value, arg),
            "Fn::Sub" => return self.sub(arg),
            "Fn::CopyValue" => return self.copy_value(arg),
            _ => {}
          }
        }

        let mut rendered = Map::new();
        for (key, item) in map {
          rendered.insert(key.clone(), self.walk(item)?);
        }
        Ok(Value::Object(rendered))
      }
      other => Ok(other.clone()),
    }
  }

  fn reference_expression(&mut self, original: &Value, arg: &Value) -> Result<Value, RenderError> {
    let Some(name) = arg.as_str() else {
      return Err(self.invalid("Ref", "expected a logical id"));
    };
    Ok(match self.reference(name) {
      Some(id) => Value::String(id),
      None => original.clone(),
    })
  }

  fn attribute_expression(&mut self, original: &Value, arg: &Value) -> Result<Value, RenderError> {
    let pair = match arg {
      Value::String(s) => s.split_once('.'),
      Value::Array(items) => match items.as_slice() {
        [Value::String(id), Value::String(attribute)] => Some((id.as_str(), attribute.as_str())),
        _ => None,
      },
      _ => None,
    };

    let Some((id, attribute)) = pair else {
      // Not an organization attribute; let the engine deal with it.
      let walked = self.walk(arg)?;
      return Ok(json!({ "Fn::GetAtt": walked }));
    };

    Ok(match self.attribute(id, attribute) {
      Some(value) => Value::String(value),
      None => original.clone(),
    })
  }

  fn sub(&mut self, arg: &Value) -> Result<Value, RenderError> {
    let (text, variables) = match arg {
      Value::String(text) => (text.as_str(), None),
      Value::Array(items) => match items.as_slice() {
        [Value::String(text)] => (text.as_str(), None),
        [Value::String(text), Value::Object(variables)] => (text.as_str(), Some(variables)),
        _ => return Err(self.invalid("Fn::Sub", "expected a string or [string, variables]")),
      },
      _ => return Err(self.invalid("Fn::Sub", "expected a string or [string, variables]")),
    };

    let rendered_variables = match variables {
      Some(variables) => {
        let mut rendered = Map::new();
        for (name, value) in variables {
          rendered.insert(name.clone(), self.walk(value)?);
        }
        Some(rendered)
      }
      None => None,
    };
    let local: HashSet<&str> = variables
      .map(|v| v.keys().map(String::as_str).collect())
      .unwrap_or_default();

    let result = interpolate(text, |expression| {
      if local.contains(expression) {
        None
      } else {
        self.placeholder(expression)
      }
    });

    if result.is_complete() {
      return Ok(Value::String(result.text));
    }
    Ok(match rendered_variables {
      Some(variables) => json!({ "Fn::Sub": [result.text, variables] }),
      None => json!({ "Fn::Sub": result.text }),
    })
  }

  fn copy_value(&mut self, arg: &Value) -> Result<Value, RenderError> {
    let rendered = self.walk(arg)?;
    let Some(args) = rendered
      .as_array()
      .and_then(|items| items.iter().map(Value::as_str).collect::<Option<Vec<_>>>())
    else {
      return Err(self.invalid("Fn::CopyValue", "expected a list of strings"));
    };

    let (unit, output, account, region) = match args.as_slice() {
      [unit, output] => (*unit, *output, None, None),
      [unit, output, account] => (*unit, *output, Some(*account), None),
      [unit, output, account, region] => (*unit, *output, Some(*account), Some(*region)),
      _ => {
        return Err(self.invalid(
          "Fn::CopyValue",
          "expected [unit, output] with optional account and region",
        ));
      }
    };
    if unit.is_empty() || output.is_empty() {
      return Err(self.invalid("Fn::CopyValue", "unit and output must not be empty"));
    }

    let import = ImportRef {
      unit: unit.to_string(),
      account_id: match account {
        Some(account) => self.account_id(account),
        None => self.target.account_id.clone(),
      },
      region: region.unwrap_or(self.target.region.as_str()).to_string(),
      output: output.to_string(),
    };
    self.imports.insert(import.clone());

    let value = self.renderer.state.output(
      &import.unit,
      &import.account_id,
      &import.region,
      &import.output,
    );
    match value {
      Some(value) => Ok(Value::String(value.to_string())),
      None => {
        self.missing.insert(import);
        Ok(json!({ "Fn::CopyValue": rendered }))
      }
    }
  }

  /// Resolve a `${...}` placeholder body.
  fn placeholder(&self, expression: &str) -> Option<String> {
    match expression.split_once('.') {
      Some((id, attribute)) => self.attribute(id, attribute),
      None => self.reference(expression),
    }
  }

  /// Physical id denoted by a logical id, or `None` when it is not an
  /// organization entity.
  fn reference(&self, name: &str) -> Option<String> {
    if Organization::is_current_account_id(name) {
      return Some(self.target.account_id.clone());
    }
    let entity = self.renderer.organization.get(name)?;
    self.physical_id(entity)
  }

  fn attribute(&self, id: &str, attribute: &str) -> Option<String> {
    let current = Organization::is_current_account_id(id);
    let entity = if current {
      self.current_account()
    } else {
      Cow::Borrowed(self.renderer.organization.get(id)?)
    };

    if attribute == "AccountId" {
      let physical_id = if current {
        Some(self.target.account_id.clone())
      } else {
        self.physical_id(&entity)
      };
      return Some(physical_id.unwrap_or_default());
    }

    match entity.attribute(attribute) {
      AttributeLookup::Value(value) => Some(value),
      AttributeLookup::Missing => Some(String::new()),
      AttributeLookup::Unknown => None,
    }
  }

  /// The account entity of the target being rendered.
  fn current_account(&self) -> Cow<'_, OrganizationEntity> {
    let organization = self.renderer.organization;
    organization
      .find_account_by_physical_id(&self.target.account_id)
      .or_else(|| organization.get(&self.target.account_logical_id))
      .map(Cow::Borrowed)
      .unwrap_or_else(|| {
        Cow::Owned(
          OrganizationEntity::new(&self.target.account_logical_id, EntityKind::Account)
            .with_physical_id(&self.target.account_id),
        )
      })
  }

  fn physical_id(&self, entity: &OrganizationEntity) -> Option<String> {
    self
      .renderer
      .state
      .physical_id(&entity.logical_id)
      .or(entity.physical_id.as_deref())
      .map(str::to_string)
  }

  /// Account id for an explicit import account: a logical id, the current
  /// account pseudo id, or a physical id.
  fn account_id(&self, account: &str) -> String {
    if Organization::is_current_account_id(account) {
      return self.target.account_id.clone();
    }
    self
      .renderer
      .organization
      .get(account)
      .filter(|e| e.is_account())
      .and_then(|e| self.physical_id(e))
      .unwrap_or_else(|| account.to_string())
  }

  fn invalid(&self, function: &str, message: &str) -> RenderError {
    RenderError::InvalidExpression {
      unit: self.unit.to_string(),
      function: function.to_string(),
      message: message.to_string(),
    }
  }
}

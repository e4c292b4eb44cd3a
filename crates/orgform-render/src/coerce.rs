//! Parameter coercion.
//!
//! Stack parameters are strings on the wire. Rendered parameter values are
//! converted here after references were resolved.

use std::collections::BTreeMap;

use serde_json::Value;

/// Coerce every rendered parameter value to its string form.
pub fn coerce_parameters(parameters: BTreeMap<String, Value>) -> BTreeMap<String, String> {
  parameters
    .into_iter()
    .map(|(name, value)| (name, coerce_parameter(&value)))
    .collect()
}

/// Coerce one value: scalars to their text, lists to a comma-joined string,
/// fully resolved joins to the joined string. Anything else keeps its JSON text.
pub fn coerce_parameter(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Array(items) => items
      .iter()
      .map(coerce_parameter)
      .collect::<Vec<_>>()
      .join(","),
    Value::Object(_) => fold_join(value).unwrap_or_else(|| value.to_string()),
  }
}

/// Evaluate `{"Fn::Join": [delimiter, [parts...]]}` when every part is a scalar.
fn fold_join(value: &Value) -> Option<String> {
  let args = value.as_object()?.get("Fn::Join")?.as_array()?;
  let [delimiter, parts] = args.as_slice() else {
    return None;
  };
  let delimiter = delimiter.as_str()?;
  let parts = parts
    .as_array()?
    .iter()
    .map(|part| match part {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      Value::Bool(b) => Some(b.to_string()),
      Value::Object(_) => fold_join(part),
      _ => None,
    })
    .collect::<Option<Vec<_>>>()?;
  Some(parts.join(delimiter))
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit / organization configuration (`unit`, `ratedNCO`, `unitContext`, ...).
///
/// Treated as read-only; values are looked up by dot path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitConfig(Value);

impl UnitConfig {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Resolves a dot path such as `ratedNCO.name`. Numeric segments index
    /// into arrays. Any missing segment yields `None`.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }
        path.split('.').try_fold(&self.0, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Resolves a dot path and stringifies the result. `null` counts as absent.
    pub fn resolve_string(&self, path: &str) -> Option<String> {
        self.resolve(path).and_then(stringify_value)
    }
}

impl From<Value> for UnitConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// String form of a configuration value as it is written into a form field.
///
/// Strings are taken verbatim, scalars use their JSON text, arrays are joined
/// with commas and objects are rendered as compact JSON. `null` has no string
/// form.
pub fn stringify_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| stringify_value(item).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

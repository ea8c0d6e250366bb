use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of form field. Only `Text` fields are eligible for generation.
///
/// Unknown type strings survive a round trip through `Other` so the PDF writer
/// still sees whatever the field file declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    Text,
    Checkbox,
    Dropdown,
    Radio,
    Other(String),
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "text" => FieldType::Text,
            "checkbox" => FieldType::Checkbox,
            "dropdown" => FieldType::Dropdown,
            "radio" => FieldType::Radio,
            _ => FieldType::Other(value),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => f.write_str("text"),
            FieldType::Checkbox => f.write_str("checkbox"),
            FieldType::Dropdown => f.write_str("dropdown"),
            FieldType::Radio => f.write_str("radio"),
            FieldType::Other(other) => f.write_str(other),
        }
    }
}

/// Field content: text for most fields, a flag for checkboxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Checked(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Checked(_) => None,
        }
    }
}

/// Pointer into the unit configuration, e.g. `ratedNCO.name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticSource {
    pub config_key: String,
}

/// Generation settings plus the markers written back by enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSpec {
    #[serde(default)]
    pub generate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_key: Option<String>,
    /// Overrides the template's token budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_value: Option<String>,
    /// Absent means required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Highest-precedence context entries for this field's prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<BTreeMap<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_fallback: Option<bool>,
}

impl LlmSpec {
    pub fn is_required(&self) -> bool {
        self.required != Some(false)
    }

    /// Field-level budget, ignoring a zero override.
    pub fn token_override(&self) -> Option<u32> {
        self.max_tokens.filter(|&tokens| tokens > 0)
    }
}

/// A single NCOER form field as stored in the field definition file.
///
/// Properties this crate does not interpret (page geometry, labels, selector
/// hints) are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_source: Option<StaticSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Field {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
            value: None,
            static_source: None,
            llm: None,
            extra: Map::new(),
        }
    }

    pub fn with_static(mut self, config_key: impl Into<String>) -> Self {
        self.static_source = Some(StaticSource {
            config_key: config_key.into(),
        });
        self
    }

    pub fn with_llm(mut self, llm: LlmSpec) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config_key(&self) -> Option<&str> {
        self.static_source
            .as_ref()
            .map(|s| s.config_key.as_str())
            .filter(|key| !key.is_empty())
    }

    pub fn wants_generation(&self) -> bool {
        self.llm.as_ref().is_some_and(|llm| llm.generate)
    }

    pub fn prompt_key(&self) -> Option<&str> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.prompt_key.as_deref())
            .filter(|key| !key.is_empty())
    }

    pub fn text_value(&self) -> Option<&str> {
        self.value.as_ref().and_then(FieldValue::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_deserializes_camel_case_llm_spec() {
        let field: Field = serde_json::from_value(json!({
            "name": "part3c",
            "type": "text",
            "llm": {
                "generate": true,
                "promptKey": "part3_daily_duties",
                "maxTokens": 350,
                "fallbackValue": "N/A",
                "required": false,
                "additionalContext": {"keyDuties": "motor pool"}
            }
        }))
        .unwrap();

        let llm = field.llm.as_ref().unwrap();
        assert!(field.wants_generation());
        assert_eq!(field.prompt_key(), Some("part3_daily_duties"));
        assert_eq!(llm.token_override(), Some(350));
        assert!(!llm.is_required());
        assert_eq!(llm.fallback_value.as_deref(), Some("N/A"));
    }

    #[test]
    fn test_geometry_survives_round_trip() {
        let input = json!({
            "name": "rated_name",
            "type": "text",
            "page": 0,
            "x": 36.5,
            "y": 700,
            "w": 200,
            "h": 14,
            "origin": "top-left",
            "static": {"configKey": "ratedNCO.name"}
        });
        let field: Field = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(field.config_key(), Some("ratedNCO.name"));

        let output = serde_json::to_value(&field).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_missing_type_defaults_to_text() {
        let field: Field = serde_json::from_value(json!({"name": "a"})).unwrap();
        assert_eq!(field.field_type, FieldType::Text);
        assert!(!field.wants_generation());
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let field: Field =
            serde_json::from_value(json!({"name": "sig", "type": "signature"})).unwrap();
        assert_eq!(field.field_type, FieldType::Other("signature".to_string()));
        assert_eq!(serde_json::to_value(&field).unwrap()["type"], "signature");
    }

    #[test]
    fn test_checkbox_value_deserializes_as_flag() {
        let field: Field =
            serde_json::from_value(json!({"name": "c", "type": "checkbox", "value": true}))
                .unwrap();
        assert_eq!(field.value, Some(FieldValue::Checked(true)));
        assert_eq!(field.text_value(), None);
    }

    #[test]
    fn test_empty_prompt_key_counts_as_missing() {
        let field = Field::text("a").with_llm(LlmSpec {
            generate: true,
            prompt_key: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(field.prompt_key(), None);
    }

    #[test]
    fn test_zero_token_override_is_ignored() {
        let llm = LlmSpec {
            max_tokens: Some(0),
            ..Default::default()
        };
        assert_eq!(llm.token_override(), None);
    }
}

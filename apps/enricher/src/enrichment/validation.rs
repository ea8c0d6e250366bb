use serde::Serialize;

use crate::enrichment::prompts::lookup;
use crate::models::field::{Field, FieldType};

/// Pre-flight check of the generation settings in a field collection.
///
/// `errors` block generation; `warnings` are informational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub valid: bool,
}

/// Validates every field with `llm.generate = true`:
/// - a `promptKey` is required
/// - an unregistered `promptKey` is warned about; at generation time it goes
///   through the field's fallback / required policy like any other failure
/// - generation on a non-text field is allowed but warned about
pub fn validate_llm_config(fields: &[Field]) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for field in fields.iter().filter(|f| f.wants_generation()) {
        match field.prompt_key() {
            None => errors.push(format!("Field \"{}\": missing llm.promptKey", field.name)),
            Some(key) => {
                if lookup(key).is_err() {
                    warnings.push(format!(
                        "Field \"{}\": unknown llm.promptKey \"{}\"",
                        field.name, key
                    ));
                }
            }
        }

        if field.field_type != FieldType::Text {
            warnings.push(format!(
                "Field \"{}\": LLM generation on non-text field (type: {})",
                field.name, field.field_type
            ));
        }
    }

    let valid = errors.is_empty();
    ValidationReport {
        errors,
        warnings,
        valid,
    }
}

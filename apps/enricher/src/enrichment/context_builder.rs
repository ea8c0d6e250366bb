//! Context Builder: assembles the per-field prompt context.
//!
//! Layers, later ones overwrite earlier ones on key collision:
//! 1. prior-document text picked by `PRIOR_DOCUMENT_SOURCES` for the field's prompt key
//! 2. curated supplemental context from the prior document (accomplishments only)
//! 3. current unit / rated NCO facts and `unitContext` from the unit config
//! 4. the field's own `llm.additionalContext`

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::field::Field;
use crate::models::previous::PreviousDocument;
use crate::models::unit_config::{stringify_value, UnitConfig};

/// Ephemeral prompt inputs for one field. Ordered so previews are stable.
pub type PromptContext = BTreeMap<String, String>;

/// One prior-document value feeding a prompt: `section.field` → `context_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorSource {
    pub context_key: &'static str,
    pub section: &'static str,
    pub field: &'static str,
}

const fn prior(
    context_key: &'static str,
    section: &'static str,
    field: &'static str,
) -> PriorSource {
    PriorSource {
        context_key,
        section,
        field,
    }
}

/// Prompt key → prior-document values it draws from.
pub const PRIOR_DOCUMENT_SOURCES: &[(&str, &[PriorSource])] = &[
    ("part3_daily_duties", &[prior("previousDuties", "part3", "dailyDuties")]),
    ("part3_special_emphasis", &[prior("previousEmphasis", "part3", "specialEmphasis")]),
    ("part3_appointed_duties", &[prior("previousAppointed", "part3", "appointedDuties")]),
    ("part4_pt", &[prior("previousPT", "part4", "ptComments")]),
    ("part4_character", &[prior("previousCharacter", "part4", "cComments")]),
    ("part4_presence", &[prior("previousPresence", "part4", "dComments")]),
    ("part4_intellect", &[prior("previousIntellect", "part4", "eComments")]),
    ("part4_leads", &[prior("previousLeads", "part4", "fComments")]),
    ("part4_develops", &[prior("previousDevelops", "part4", "gComments")]),
    ("part4_achieves", &[prior("previousAchieves", "part4", "hComments")]),
    ("part4_overall", &[prior("previousOverall", "part4", "jComments")]),
    ("part5_rater", &[prior("previousRater", "part5", "a")]),
    ("part5_sr_potential", &[prior("previousSR", "part5", "b")]),
    ("part5_sr_comments", &[prior("previousSRComments", "part5", "c")]),
];

/// Supplemental prior-document keys carried forward. Unit and position come
/// from the unit config instead.
const SUPPLEMENTAL_KEYS: &[&str] = &["keyAccomplishments"];
const SUPPLEMENTAL_SECTION: &str = "supplementalContext";

/// Context key → unit-config paths, first non-empty value wins.
const UNIT_CONFIG_SOURCES: &[(&str, &[&str])] = &[
    ("unit", &["unit.fullDesignation", "unit.name"]),
    ("unitShortName", &["unit.shortName"]),
    ("position", &["ratedNCO.position"]),
    ("rank", &["ratedNCO.rank"]),
];
const UNIT_CONTEXT_KEY: &str = "unitContext";

pub fn prior_sources(prompt_key: &str) -> &'static [PriorSource] {
    PRIOR_DOCUMENT_SOURCES
        .iter()
        .find(|(key, _)| *key == prompt_key)
        .map(|(_, sources)| *sources)
        .unwrap_or(&[])
}

/// Builds the prompt context for `field`. With neither a prior document nor a
/// unit config the context is empty.
pub fn build_context(
    field: &Field,
    previous: Option<&PreviousDocument>,
    unit_config: Option<&UnitConfig>,
) -> PromptContext {
    let mut context = PromptContext::new();

    if previous.is_none() && unit_config.is_none() {
        return context;
    }

    if let Some(previous) = previous {
        if let Some(prompt_key) = field.prompt_key() {
            for source in prior_sources(prompt_key) {
                if let Some(value) = previous.get(source.section, source.field) {
                    context.insert(source.context_key.to_string(), value.to_string());
                }
            }
        }

        for key in SUPPLEMENTAL_KEYS {
            if let Some(value) = previous.get(SUPPLEMENTAL_SECTION, key) {
                context.insert((*key).to_string(), value.to_string());
            }
        }
    }

    if let Some(config) = unit_config {
        for (context_key, paths) in UNIT_CONFIG_SOURCES {
            let value = paths
                .iter()
                .filter_map(|path| config.resolve_string(path))
                .find(|v| !v.is_empty());
            if let Some(value) = value {
                context.insert((*context_key).to_string(), value);
            }
        }

        if let Some(Value::Object(entries)) = config.resolve(UNIT_CONTEXT_KEY) {
            merge(&mut context, entries.iter());
        }
    }

    if let Some(overrides) = field
        .llm
        .as_ref()
        .and_then(|llm| llm.additional_context.as_ref())
    {
        merge(&mut context, overrides.iter());
    }

    context
}

/// Stringifies and inserts each entry; an explicit `null` removes the key.
fn merge<'a>(context: &mut PromptContext, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    for (key, value) in entries {
        match stringify_value(value) {
            Some(text) => {
                context.insert(key.clone(), text);
            }
            None => {
                context.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::prompts::PROMPT_TEMPLATES;
    use crate::models::field::LlmSpec;
    use serde_json::json;

    fn llm_field(prompt_key: &str) -> Field {
        Field::text("f").with_llm(LlmSpec {
            generate: true,
            prompt_key: Some(prompt_key.to_string()),
            ..Default::default()
        })
    }

    fn previous() -> PreviousDocument {
        serde_json::from_value(json!({
            "part3": {"dailyDuties": "Old duties", "specialEmphasis": "Old emphasis"},
            "part4": {"cComments": "Old character"},
            "supplementalContext": {
                "keyAccomplishments": "Led gunnery qualification",
                "unit": "Old unit",
                "position": "Old position"
            }
        }))
        .unwrap()
    }

    fn unit_config() -> UnitConfig {
        UnitConfig::new(json!({
            "unit": {"name": "1-1 CAV", "fullDesignation": "1st Squadron, 1st Cavalry Regiment", "shortName": "1-1 CAV"},
            "ratedNCO": {"position": "Section Sergeant", "rank": "SSG"},
            "unitContext": {"keyDuties": "Maintenance of 4 M1A2 tanks", "ptScore": 540}
        }))
    }

    #[test]
    fn test_every_prompt_template_has_a_prior_source_row() {
        for template in PROMPT_TEMPLATES {
            assert!(
                !prior_sources(template.key).is_empty(),
                "no prior-document mapping for {}",
                template.key
            );
        }
    }

    #[test]
    fn test_no_sources_yields_empty_context() {
        let mut field = llm_field("part3_daily_duties");
        field.llm.as_mut().unwrap().additional_context =
            Some([("keyDuties".to_string(), json!("x"))].into_iter().collect());
        assert!(build_context(&field, None, None).is_empty());
    }

    #[test]
    fn test_prior_document_feeds_only_matching_prompt_key() {
        let ctx = build_context(&llm_field("part3_daily_duties"), Some(&previous()), None);
        assert_eq!(ctx["previousDuties"], "Old duties");
        assert!(!ctx.contains_key("previousEmphasis"));
        assert!(!ctx.contains_key("previousCharacter"));
    }

    #[test]
    fn test_supplemental_context_is_curated() {
        let ctx = build_context(&llm_field("part4_character"), Some(&previous()), None);
        assert_eq!(ctx["previousCharacter"], "Old character");
        assert_eq!(ctx["keyAccomplishments"], "Led gunnery qualification");
        assert!(!ctx.contains_key("unit"));
        assert!(!ctx.contains_key("position"));
    }

    #[test]
    fn test_unit_config_supplies_current_facts() {
        let ctx = build_context(&llm_field("part3_daily_duties"), Some(&previous()), Some(&unit_config()));
        assert_eq!(ctx["unit"], "1st Squadron, 1st Cavalry Regiment");
        assert_eq!(ctx["unitShortName"], "1-1 CAV");
        assert_eq!(ctx["position"], "Section Sergeant");
        assert_eq!(ctx["rank"], "SSG");
        assert_eq!(ctx["keyDuties"], "Maintenance of 4 M1A2 tanks");
        assert_eq!(ctx["ptScore"], "540");
        assert_eq!(ctx["previousDuties"], "Old duties");
    }

    #[test]
    fn test_unit_name_used_when_full_designation_blank() {
        let config = UnitConfig::new(json!({"unit": {"name": "1-1 CAV", "fullDesignation": ""}}));
        let ctx = build_context(&llm_field("part4_pt"), None, Some(&config));
        assert_eq!(ctx["unit"], "1-1 CAV");
        assert!(!ctx.contains_key("unitShortName"));
    }

    #[test]
    fn test_unit_context_overrides_prior_document() {
        let config = UnitConfig::new(json!({
            "unitContext": {"previousDuties": "Curated duties", "keyAccomplishments": "Newer"}
        }));
        let ctx = build_context(&llm_field("part3_daily_duties"), Some(&previous()), Some(&config));
        assert_eq!(ctx["previousDuties"], "Curated duties");
        assert_eq!(ctx["keyAccomplishments"], "Newer");
    }

    #[test]
    fn test_additional_context_wins_over_everything() {
        let mut field = llm_field("part3_daily_duties");
        field.llm.as_mut().unwrap().additional_context = Some(
            [
                ("position".to_string(), json!("Platoon Sergeant")),
                ("previousDuties".to_string(), json!(null)),
                ("achievesExamples".to_string(), json!(["ACFT 600", "EIB"])),
            ]
            .into_iter()
            .collect(),
        );

        let ctx = build_context(&field, Some(&previous()), Some(&unit_config()));
        assert_eq!(ctx["position"], "Platoon Sergeant");
        assert!(!ctx.contains_key("previousDuties"));
        assert_eq!(ctx["achievesExamples"], "ACFT 600,EIB");
    }

    #[test]
    fn test_field_without_prompt_key_still_gets_unit_facts() {
        let ctx = build_context(&Field::text("f"), Some(&previous()), Some(&unit_config()));
        assert!(!ctx.contains_key("previousDuties"));
        assert_eq!(ctx["rank"], "SSG");
    }
}

//! Prompt Template Registry: one template per NCOER block.
//!
//! A template is data: a heading, an ordered list of context-driven sections
//! and a closing instruction. A section is rendered only when its context key
//! holds non-blank text (or when it declares a default), so a field with no
//! prior document and no unit data still gets a usable prompt.

use serde::Serialize;
use thiserror::Error;

use crate::enrichment::context_builder::PromptContext;
use crate::llm_client::prompts::NCOER_SYSTEM_PROMPT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Unknown prompt key: {key}. Available keys: {available}")]
    UnknownPromptKey { key: String, available: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `Label:\n<value>\n`, used for quoting previous NCOER text.
    Block,
    /// `Label: <value>`
    Inline,
}

#[derive(Debug)]
pub struct TemplateSection {
    pub context_key: &'static str,
    pub label: &'static str,
    pub layout: Layout,
    /// Rendered in place of a missing value.
    pub default: Option<&'static str>,
}

const fn block(context_key: &'static str, label: &'static str) -> TemplateSection {
    TemplateSection {
        context_key,
        label,
        layout: Layout::Block,
        default: None,
    }
}

const fn inline(context_key: &'static str, label: &'static str) -> TemplateSection {
    TemplateSection {
        context_key,
        label,
        layout: Layout::Inline,
        default: None,
    }
}

const fn inline_or(
    context_key: &'static str,
    label: &'static str,
    default: &'static str,
) -> TemplateSection {
    TemplateSection {
        context_key,
        label,
        layout: Layout::Inline,
        default: Some(default),
    }
}

impl TemplateSection {
    fn render(&self, context: &PromptContext) -> Option<String> {
        let value = context
            .get(self.context_key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .or(self.default)?;

        Some(match self.layout {
            Layout::Block => format!("{}:\n{}\n", self.label, value),
            Layout::Inline => format!("{}: {}", self.label, value),
        })
    }
}

#[derive(Debug)]
pub struct PromptTemplate {
    pub key: &'static str,
    pub description: &'static str,
    heading: &'static str,
    sections: &'static [TemplateSection],
    instruction: &'static str,
    /// Default token budget; a field may override it.
    pub max_tokens: u32,
}

impl PromptTemplate {
    pub fn system_prompt(&self) -> &'static str {
        NCOER_SYSTEM_PROMPT
    }

    /// Renders the user prompt. Pure: the same context always yields the same text.
    pub fn render(&self, context: &PromptContext) -> String {
        let sections: Vec<String> = self
            .sections
            .iter()
            .filter_map(|section| section.render(context))
            .collect();

        let mut prompt = String::with_capacity(512);
        prompt.push_str(self.heading);
        prompt.push_str("\n\n");
        if !sections.is_empty() {
            prompt.push_str(&sections.join("\n"));
            prompt.push_str("\n\n");
        }
        prompt.push_str(self.instruction);
        prompt
    }
}

/// Entry in the prompt-key listing shown by `list-prompts` and `GET /api/v1/prompts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptKeyInfo {
    pub key: &'static str,
    pub description: &'static str,
}

pub const PROMPT_TEMPLATES: &[PromptTemplate] = &[
    // Part 3 - Duty Description
    PromptTemplate {
        key: "part3_daily_duties",
        description: "Part 3c - Daily Duties and Scope",
        heading: "Generate content for NCOER Part 3c (Daily Duties and Scope).",
        sections: &[
            block("previousDuties", "Previous NCOER content for reference"),
            inline("position", "Current position"),
            inline("unit", "Unit"),
            inline("keyDuties", "Key duties to highlight"),
        ],
        instruction: "Write a professional description of daily duties and scope of responsibility. \
            Include people supervised, equipment/facilities managed, and dollar value responsibility if applicable. \
            Format as a flowing narrative paragraph.",
        max_tokens: 400,
    },
    PromptTemplate {
        key: "part3_special_emphasis",
        description: "Part 3d - Areas of Special Emphasis",
        heading: "Generate content for NCOER Part 3d (Areas of Special Emphasis).",
        sections: &[
            block("previousEmphasis", "Previous content"),
            inline_or(
                "focusAreas",
                "Focus areas",
                "Training, readiness, soldier welfare",
            ),
        ],
        instruction: "Describe areas of special emphasis assigned by the rating chain. \
            These are specific areas the NCO was directed to focus on during the rating period.",
        max_tokens: 300,
    },
    PromptTemplate {
        key: "part3_appointed_duties",
        description: "Part 3e - Appointed Duties",
        heading: "Generate content for NCOER Part 3e (Appointed Duties).",
        sections: &[
            block("previousAppointed", "Previous content"),
            inline("additionalDuties", "Additional duties"),
        ],
        instruction: "List appointed duties beyond primary responsibilities. \
            These are additional duties assigned such as Safety NCO, Unit Movement Officer, Key Control Custodian, etc.",
        max_tokens: 250,
    },
    // Part 4 - Performance Assessment
    PromptTemplate {
        key: "part4_pt",
        description: "Part 4 - Physical Training Comments",
        heading: "Generate NCOER Part 4 Physical Training/ACFT comments.",
        sections: &[
            block("previousPT", "Previous comments"),
            inline("ptScore", "Current ACFT score"),
            inline("ptAchievements", "PT achievements"),
        ],
        instruction: "Write bullet-style comments about physical fitness, ACFT performance, and physical readiness. \
            Focus on scores, improvement, and leadership of PT programs.",
        max_tokens: 200,
    },
    PromptTemplate {
        key: "part4_character",
        description: "Part 4c - Character Comments",
        heading: "Generate NCOER Part 4c Character comments.",
        sections: &[
            block("previousCharacter", "Previous comments"),
            inline("characterExamples", "Examples"),
        ],
        instruction: "Write bullet-style comments about Army Values, empathy, warrior ethos, and discipline. \
            Focus on specific examples demonstrating character.",
        max_tokens: 200,
    },
    PromptTemplate {
        key: "part4_presence",
        description: "Part 4d - Presence Comments",
        heading: "Generate NCOER Part 4d Presence comments.",
        sections: &[
            block("previousPresence", "Previous comments"),
            inline("presenceExamples", "Examples"),
        ],
        instruction: "Write bullet-style comments about military bearing, fitness, confidence, and resilience. \
            Focus on how the NCO presents themselves as a leader.",
        max_tokens: 200,
    },
    PromptTemplate {
        key: "part4_intellect",
        description: "Part 4e - Intellect Comments",
        heading: "Generate NCOER Part 4e Intellect comments.",
        sections: &[
            block("previousIntellect", "Previous comments"),
            inline("intellectExamples", "Examples"),
            inline("education", "Education/training"),
        ],
        instruction: "Write bullet-style comments about mental agility, sound judgment, innovation, and professional development. \
            Include education and self-improvement efforts.",
        max_tokens: 200,
    },
    PromptTemplate {
        key: "part4_leads",
        description: "Part 4f - Leads Comments",
        heading: "Generate NCOER Part 4f Leads comments.",
        sections: &[
            block("previousLeads", "Previous comments"),
            inline("leadsExamples", "Examples"),
        ],
        instruction: "Write bullet-style comments about leading others, extending influence, building trust, and creating a positive environment. \
            Focus on leadership actions and their impact.",
        max_tokens: 200,
    },
    PromptTemplate {
        key: "part4_develops",
        description: "Part 4g - Develops Comments",
        heading: "Generate NCOER Part 4g Develops comments.",
        sections: &[
            block("previousDevelops", "Previous comments"),
            inline("developsExamples", "Examples"),
        ],
        instruction: "Write bullet-style comments about developing self and others, creating positive climate, preparing self, and stewardship of the profession. \
            Focus on mentorship and training.",
        max_tokens: 200,
    },
    PromptTemplate {
        key: "part4_achieves",
        description: "Part 4h - Achieves Comments",
        heading: "Generate NCOER Part 4h Achieves comments.",
        sections: &[
            block("previousAchieves", "Previous comments"),
            inline("achievesExamples", "Examples"),
        ],
        instruction: "Write bullet-style comments about getting results. \
            Focus on specific accomplishments, mission success, and quantifiable achievements.",
        max_tokens: 200,
    },
    PromptTemplate {
        key: "part4_overall",
        description: "Part 4j - Overall Performance Comments",
        heading: "Generate NCOER Part 4j Overall Performance comments.",
        sections: &[
            block("previousOverall", "Previous comments"),
            inline("overallSummary", "Key points"),
            inline("rating", "Performance rating"),
        ],
        instruction: "Write a comprehensive summary of overall performance. \
            This should tie together the NCO's achievements across all competencies.",
        max_tokens: 300,
    },
    // Part 5 - Potential
    PromptTemplate {
        key: "part5_rater",
        description: "Part 5a - Rater Overall Assessment",
        heading: "Generate NCOER Part 5a Rater Overall Assessment.",
        sections: &[
            block("previousRater", "Previous assessment"),
            inline("potentialIndicators", "Potential indicators"),
        ],
        instruction: "Write the rater's assessment of the NCO's potential for increased responsibility. \
            Focus on readiness for promotion and next-level assignments.",
        max_tokens: 250,
    },
    PromptTemplate {
        key: "part5_sr_potential",
        description: "Part 5b - Senior Rater Potential Evaluation",
        heading: "Generate NCOER Part 5b Senior Rater Potential Evaluation.",
        sections: &[
            block("previousSR", "Previous evaluation"),
            inline("srPotential", "Potential indicators"),
        ],
        instruction: "Write the senior rater's evaluation of potential. \
            This is the most influential block for promotion boards.",
        max_tokens: 250,
    },
    PromptTemplate {
        key: "part5_sr_comments",
        description: "Part 5c - Senior Rater Comments",
        heading: "Generate NCOER Part 5c Senior Rater Comments.",
        sections: &[
            block("previousSRComments", "Previous comments"),
            inline("srComments", "Key points"),
        ],
        instruction: "Write the senior rater's comments about potential. \
            Include recommendations for future assignments, schools, and broadening opportunities.",
        max_tokens: 300,
    },
];

/// Finds the template for `key`. The error lists every valid key.
pub fn lookup(key: &str) -> Result<&'static PromptTemplate, PromptError> {
    PROMPT_TEMPLATES
        .iter()
        .find(|t| t.key == key)
        .ok_or_else(|| PromptError::UnknownPromptKey {
            key: key.to_string(),
            available: PROMPT_TEMPLATES
                .iter()
                .map(|t| t.key)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

pub fn available_prompt_keys() -> Vec<PromptKeyInfo> {
    PROMPT_TEMPLATES
        .iter()
        .map(|t| PromptKeyInfo {
            key: t.key,
            description: t.description,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn context(pairs: &[(&str, &str)]) -> PromptContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<_> = PROMPT_TEMPLATES.iter().map(|t| t.key).collect();
        assert_eq!(keys.len(), PROMPT_TEMPLATES.len());
        assert_eq!(PROMPT_TEMPLATES.len(), 14);
    }

    #[test]
    fn test_lookup_returns_budget_and_system_prompt() {
        let template = lookup("part3_daily_duties").unwrap();
        assert_eq!(template.max_tokens, 400);
        assert_eq!(template.description, "Part 3c - Daily Duties and Scope");
        assert!(template.system_prompt().contains("AR 623-3"));
    }

    #[test]
    fn test_unknown_key_lists_every_valid_key() {
        let err = lookup("part9_nonsense").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Unknown prompt key: part9_nonsense"));
        for template in PROMPT_TEMPLATES {
            assert!(message.contains(template.key), "missing {}", template.key);
        }
    }

    #[test]
    fn test_render_with_empty_context_omits_sections() {
        let prompt = lookup("part4_character").unwrap().render(&PromptContext::new());
        assert!(prompt.starts_with("Generate NCOER Part 4c Character comments.\n\n"));
        assert!(!prompt.contains("Previous comments"));
        assert!(!prompt.contains("Examples"));
        assert!(!prompt.contains("undefined"));
        assert!(prompt.ends_with("Focus on specific examples demonstrating character."));
    }

    #[test]
    fn test_render_includes_present_sections_in_order() {
        let ctx = context(&[
            ("previousDuties", "Squad leader for 9 Soldiers"),
            ("unit", "1st Squadron, 1st Cavalry Regiment"),
            ("position", "Squad Leader"),
        ]);
        let prompt = lookup("part3_daily_duties").unwrap().render(&ctx);

        let previous = prompt
            .find("Previous NCOER content for reference:\nSquad leader for 9 Soldiers\n")
            .unwrap();
        let position = prompt.find("Current position: Squad Leader").unwrap();
        let unit = prompt.find("Unit: 1st Squadron, 1st Cavalry Regiment").unwrap();
        assert!(previous < position && position < unit);
        assert!(!prompt.contains("Key duties to highlight"));
    }

    #[test]
    fn test_blank_values_are_treated_as_missing() {
        let ctx = context(&[("previousPT", "   "), ("ptScore", "")]);
        let prompt = lookup("part4_pt").unwrap().render(&ctx);
        assert!(!prompt.contains("Previous comments"));
        assert!(!prompt.contains("Current ACFT score"));
    }

    #[test]
    fn test_default_fills_missing_focus_areas() {
        let template = lookup("part3_special_emphasis").unwrap();
        let default = template.render(&PromptContext::new());
        assert!(default.contains("Focus areas: Training, readiness, soldier welfare"));

        let custom = template.render(&context(&[("focusAreas", "Gunnery")]));
        assert!(custom.contains("Focus areas: Gunnery"));
        assert!(!custom.contains("soldier welfare"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let ctx = context(&[("previousOverall", "Top NCO"), ("rating", "Far Exceeded")]);
        let template = lookup("part4_overall").unwrap();
        assert_eq!(template.render(&ctx), template.render(&ctx));
    }

    #[test]
    fn test_available_prompt_keys_follow_registry_order() {
        let keys = available_prompt_keys();
        assert_eq!(keys.len(), PROMPT_TEMPLATES.len());
        assert_eq!(keys[0].key, "part3_daily_duties");
        assert_eq!(keys[13].key, "part5_sr_comments");
        assert_eq!(keys[13].description, "Part 5c - Senior Rater Comments");
    }
}

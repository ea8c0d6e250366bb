//! Previous NCOER snapshot, as produced by the PDF field extractor.
//!
//! Sections (`part3`, `part4`, `part5`, `supplementalContext`) are flat maps of
//! sub-field name to text. On load, top-level values that are not objects are
//! dropped, non-string entries inside a section are skipped, and a section
//! left with no string entries (the extractor's `rawFields`, for one) is
//! dropped entirely. Other objects with string entries, such as `metadata`,
//! load as ordinary sections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::unit_config::stringify_value;

pub type Section = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct PreviousDocument {
    #[serde(flatten)]
    sections: BTreeMap<String, Section>,
}

impl From<Map<String, Value>> for PreviousDocument {
    fn from(raw: Map<String, Value>) -> Self {
        let sections = raw
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::Object(entries) => {
                    let section: Section = entries
                        .into_iter()
                        .filter_map(|(key, v)| match v {
                            Value::String(s) => Some((key, s)),
                            _ => None,
                        })
                        .collect();
                    (!section.is_empty()).then_some((name, section))
                }
                _ => None,
            })
            .collect();
        Self { sections }
    }
}

/// Where each standard (mapped) field name lands in the structured document.
const STRUCTURE: &[(&str, &str, &str)] = &[
    ("part3", "dailyDuties", "part3c_daily_duties"),
    ("part3", "specialEmphasis", "part3d_special_emphasis"),
    ("part3", "appointedDuties", "part3e_appointed_duties"),
    ("part4", "ptComments", "part4_pt_comments"),
    ("part4", "cComments", "part4c_comments"),
    ("part4", "dComments", "part4d_comments"),
    ("part4", "eComments", "part4e_comments"),
    ("part4", "fComments", "part4f_comments"),
    ("part4", "gComments", "part4g_comments"),
    ("part4", "hComments", "part4h_comments"),
    ("part4", "jComments", "part4j_comments"),
    ("part5", "a", "part5a_potential"),
    ("part5", "b", "part5b_potential"),
    ("part5", "c", "part5c_potential"),
    ("supplementalContext", "position", "position"),
    ("supplementalContext", "unit", "unit"),
    ("supplementalContext", "ratedSoldier", "rated_name"),
    ("supplementalContext", "rank", "rated_rank"),
];

/// Candidate raw PDF field names for one standard field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldCandidates {
    One(String),
    Many(Vec<String>),
}

impl FieldCandidates {
    fn names(&self) -> &[String] {
        match self {
            FieldCandidates::One(name) => std::slice::from_ref(name),
            FieldCandidates::Many(names) => names,
        }
    }
}

/// Standard field name → raw PDF field name(s), as stored in `field-mapping.json`.
pub type FieldMapping = BTreeMap<String, FieldCandidates>;

/// Resolves each standard name to the value of the first candidate raw field
/// that exists in the extracted PDF data.
pub fn map_raw_fields(raw: &Map<String, Value>, mapping: &FieldMapping) -> BTreeMap<String, String> {
    mapping
        .iter()
        .filter_map(|(standard, candidates)| {
            candidates
                .names()
                .iter()
                .find_map(|name| raw.get(name))
                .map(|value| {
                    let text = stringify_value(raw_value(value)).unwrap_or_default();
                    (standard.clone(), text)
                })
        })
        .collect()
}

/// Raw extractor entries are either the value itself or `{type, value}`.
fn raw_value(entry: &Value) -> &Value {
    match entry {
        Value::Object(map) if map.contains_key("value") => &map["value"],
        other => other,
    }
}

impl PreviousDocument {
    /// Builds the section layout from standard field names. Names without a
    /// slot in the layout are ignored; missing names leave the slot absent.
    pub fn from_mapped(mapped: &BTreeMap<String, String>) -> Self {
        let mut sections: BTreeMap<String, Section> = BTreeMap::new();
        for (section, key, standard) in STRUCTURE {
            if let Some(value) = mapped.get(*standard) {
                sections
                    .entry((*section).to_string())
                    .or_default()
                    .insert((*key).to_string(), value.clone());
            }
        }
        Self { sections }
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(Section::is_empty)
    }
}

//! Field Enrichment Orchestrator.
//!
//! Flow: clone fields → static pass → validation → sequential generation pass
//! (context → prompt → LLM) → enriched collection.
//!
//! Generation is strictly sequential. Order matters for fail-fast aborts and
//! for readable progress output, and the LLM API is the rate-limited resource.

use std::fmt;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::enrichment::context_builder::build_context;
use crate::enrichment::prompts::{lookup, PromptError};
use crate::enrichment::validation::{validate_llm_config, ValidationReport};
use crate::llm_client::{ContentGenerator, ErrorKind, LlmClient, LlmError, LlmSettings};
use crate::models::field::{Field, FieldValue, LlmSpec};
use crate::models::previous::PreviousDocument;
use crate::models::unit_config::UnitConfig;

// ────────────────────────────────────────────────────────────────────────────
// Options and results
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EnrichOptions {
    /// Credential / model overrides for the client built by `enrich_fields`.
    pub llm: LlmSettings,
    /// Narrate progress at `info` instead of `debug`.
    pub verbose: bool,
    /// Render prompts without calling the LLM.
    pub dry_run: bool,
    pub unit_config: Option<UnitConfig>,
}

/// What a dry run would have sent for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPreview {
    pub field: String,
    pub prompt_key: String,
    pub description: String,
    pub max_tokens: u32,
    pub context_keys: Vec<String>,
    pub prompt: String,
}

/// A generation failure that did not stop the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredError {
    pub field: String,
    pub kind: ErrorKind,
    pub message: String,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichOutcome {
    pub fields: Vec<Field>,
    pub previews: Vec<PromptPreview>,
    pub recovered: Vec<RecoveredError>,
    pub warnings: Vec<String>,
}

impl EnrichOutcome {
    pub fn generated_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.llm.as_ref().is_some_and(|llm| llm.generated_at.is_some()))
            .count()
    }
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Field configuration errors: {}", .0.errors.join("; "))]
    Validation(ValidationReport),

    #[error("Could not initialise LLM client: {0}")]
    Client(#[source] LlmError),

    /// Aborted run. `partial` holds every field: those before `field` are
    /// processed, the rest are as they stood after the static pass.
    #[error("Generation failed for field '{field}': {source}")]
    Generation {
        field: String,
        source: FieldError,
        partial: Vec<Field>,
    },
}

/// Why one field could not be generated.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl FieldError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FieldError::Prompt(PromptError::UnknownPromptKey { .. }) => ErrorKind::UnknownPromptKey,
            FieldError::Llm(error) => error.kind(),
        }
    }

    /// Only configuration-class LLM failures stop the run; a bad prompt key
    /// is local to its field.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FieldError::Llm(error) if error.is_fatal())
    }
}

impl EnrichError {
    pub fn partial(&self) -> Option<&[Field]> {
        match self {
            EnrichError::Generation { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Entry points
// ────────────────────────────────────────────────────────────────────────────

/// Enriches `fields`, building an `LlmClient` from `options.llm` only when a
/// live generation is actually needed.
pub async fn enrich_fields(
    fields: &[Field],
    previous: Option<&PreviousDocument>,
    options: &EnrichOptions,
) -> Result<EnrichOutcome, EnrichError> {
    run(fields, previous, options, GeneratorSource::FromSettings).await
}

/// Enriches `fields` with a caller-supplied generator.
pub async fn enrich_fields_with(
    fields: &[Field],
    previous: Option<&PreviousDocument>,
    options: &EnrichOptions,
    generator: &dyn ContentGenerator,
) -> Result<EnrichOutcome, EnrichError> {
    run(fields, previous, options, GeneratorSource::Provided(generator)).await
}

enum GeneratorSource<'a> {
    Provided(&'a dyn ContentGenerator),
    FromSettings,
}

fn narrate(verbose: bool, message: fmt::Arguments<'_>) {
    if verbose {
        info!("{message}");
    } else {
        debug!("{message}");
    }
}

async fn run(
    fields: &[Field],
    previous: Option<&PreviousDocument>,
    options: &EnrichOptions,
    source: GeneratorSource<'_>,
) -> Result<EnrichOutcome, EnrichError> {
    let verbose = options.verbose;
    let unit_config = options.unit_config.as_ref();

    // Static pass
    let static_count = fields.iter().filter(|f| f.config_key().is_some()).count();
    if static_count > 0 {
        narrate(
            verbose,
            format_args!("Found {static_count} static fields to populate from config"),
        );
    }
    let staged: Vec<Field> = fields
        .iter()
        .map(|field| resolve_static(field, unit_config, verbose))
        .collect();

    // Validation
    let report = validate_llm_config(&staged);
    if !report.valid {
        return Err(EnrichError::Validation(report));
    }
    for warning in &report.warnings {
        warn!("{warning}");
    }

    let mut outcome = EnrichOutcome {
        warnings: report.warnings,
        ..Default::default()
    };

    let llm_count = staged.iter().filter(|f| f.wants_generation()).count();
    if llm_count == 0 {
        narrate(verbose, format_args!("No fields marked for LLM generation"));
        outcome.fields = staged;
        return Ok(outcome);
    }
    narrate(
        verbose,
        format_args!("Found {llm_count} fields to generate with LLM"),
    );

    let owned_client;
    let generator: Option<&dyn ContentGenerator> = if options.dry_run {
        None
    } else {
        match source {
            GeneratorSource::Provided(generator) => Some(generator),
            GeneratorSource::FromSettings => {
                owned_client = LlmClient::from_settings(&options.llm).map_err(EnrichError::Client)?;
                info!("LLM client initialized (model: {})", owned_client.model());
                Some(&owned_client as &dyn ContentGenerator)
            }
        }
    };

    // Generation pass
    let mut enriched = Vec::with_capacity(staged.len());
    let mut pending = staged.into_iter();
    while let Some(field) = pending.next() {
        if !field.wants_generation() {
            enriched.push(field);
            continue;
        }

        match generate_field(field, previous, options, generator).await {
            FieldStep::Generated(field) => enriched.push(field),
            FieldStep::Previewed(field, preview) => {
                outcome.previews.push(preview);
                enriched.push(field);
            }
            FieldStep::Recovered(field, recovered) => {
                outcome.recovered.push(recovered);
                enriched.push(field);
            }
            FieldStep::Aborted(field, error) => {
                let name = field.name.clone();
                warn!("Aborting enrichment at field '{}': {}", name, error);
                enriched.push(field);
                enriched.extend(pending);
                return Err(EnrichError::Generation {
                    field: name,
                    source: error,
                    partial: enriched,
                });
            }
        }
    }

    outcome.fields = enriched;
    Ok(outcome)
}

// ────────────────────────────────────────────────────────────────────────────
// Per-field steps
// ────────────────────────────────────────────────────────────────────────────

fn resolve_static(field: &Field, unit_config: Option<&UnitConfig>, verbose: bool) -> Field {
    let mut field = field.clone();
    let resolved = field
        .config_key()
        .zip(unit_config)
        .and_then(|(key, config)| config.resolve_string(key));

    if let Some(value) = resolved {
        narrate(
            verbose,
            format_args!("  Static: {} = \"{}\"", field.name, value),
        );
        field.value = Some(FieldValue::Text(value));
    }
    field
}

enum FieldStep {
    Generated(Field),
    Previewed(Field, PromptPreview),
    Recovered(Field, RecoveredError),
    Aborted(Field, FieldError),
}

async fn generate_field(
    mut field: Field,
    previous: Option<&PreviousDocument>,
    options: &EnrichOptions,
    generator: Option<&dyn ContentGenerator>,
) -> FieldStep {
    let prompt_key = field.prompt_key().unwrap_or_default().to_string();
    let template = match lookup(&prompt_key) {
        Ok(template) => template,
        Err(error) => return resolve_failure(field, error.into(), options.verbose),
    };

    let context = build_context(&field, previous, options.unit_config.as_ref());
    let prompt = template.render(&context);
    let max_tokens = field
        .llm
        .as_ref()
        .and_then(LlmSpec::token_override)
        .unwrap_or(template.max_tokens);

    narrate(
        options.verbose,
        format_args!("Generating: {} ({})", field.name, template.description),
    );

    let Some(generator) = generator else {
        let preview = PromptPreview {
            field: field.name.clone(),
            prompt_key,
            description: template.description.to_string(),
            max_tokens,
            context_keys: context.into_keys().collect(),
            prompt,
        };
        return FieldStep::Previewed(field, preview);
    };

    match generator
        .generate(&prompt, template.system_prompt(), max_tokens)
        .await
    {
        Ok(text) => {
            let text = text.trim().to_string();
            narrate(
                options.verbose,
                format_args!("  Generated {} characters", text.chars().count()),
            );
            let llm = field.llm.get_or_insert_with(LlmSpec::default);
            llm.generated_at = Some(Utc::now());
            llm.error = None;
            llm.used_fallback = None;
            field.value = Some(FieldValue::Text(text));
            FieldStep::Generated(field)
        }
        Err(error) => resolve_failure(field, error.into(), options.verbose),
    }
}

/// Failure policy: configuration-class errors abort the run; otherwise a
/// declared fallback is used, a required field aborts, and an optional field
/// is left as it was. Unknown prompt keys take the same path as LLM failures.
fn resolve_failure(mut field: Field, error: FieldError, verbose: bool) -> FieldStep {
    if error.is_fatal() {
        return FieldStep::Aborted(field, error);
    }

    let message = error.to_string();
    warn!("Error generating content for {}: {}", field.name, message);

    let kind = error.kind();
    let llm = field.llm.get_or_insert_with(LlmSpec::default);
    if let Some(fallback) = llm.fallback_value.clone() {
        llm.error = Some(message.clone());
        llm.used_fallback = Some(true);
        field.value = Some(FieldValue::Text(fallback));
        narrate(verbose, format_args!("  Using fallback value"));
        let recovered = RecoveredError {
            field: field.name.clone(),
            kind,
            message,
            used_fallback: true,
        };
        return FieldStep::Recovered(field, recovered);
    }

    if llm.is_required() {
        return FieldStep::Aborted(field, error);
    }

    narrate(
        verbose,
        format_args!("  Field {} is optional, leaving it unset", field.name),
    );
    let recovered = RecoveredError {
        field: field.name.clone(),
        kind,
        message,
        used_fallback: false,
    };
    FieldStep::Recovered(field, recovered)
}

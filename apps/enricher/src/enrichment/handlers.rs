use axum::{extract::State, Json};
use serde::Deserialize;

use crate::enrichment::enricher::{enrich_fields, EnrichOptions, EnrichOutcome};
use crate::enrichment::prompts::{available_prompt_keys, PromptKeyInfo};
use crate::enrichment::validation::{validate_llm_config, ValidationReport};
use crate::errors::AppError;
use crate::models::field::Field;
use crate::models::previous::PreviousDocument;
use crate::models::unit_config::UnitConfig;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    pub fields: Vec<Field>,
    #[serde(default)]
    pub previous_document: Option<PreviousDocument>,
    #[serde(default)]
    pub unit_config: Option<UnitConfig>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// GET /api/v1/prompts
pub async fn handle_list_prompts() -> Json<Vec<PromptKeyInfo>> {
    Json(available_prompt_keys())
}

/// POST /api/v1/fields/validate
pub async fn handle_validate(Json(req): Json<ValidateRequest>) -> Json<ValidationReport> {
    Json(validate_llm_config(&req.fields))
}

/// POST /api/v1/fields/enrich
///
/// Credentials come from the server environment; the request may only pick
/// the model and ask for a dry run.
pub async fn handle_enrich(
    State(state): State<AppState>,
    Json(req): Json<EnrichRequest>,
) -> Result<Json<EnrichOutcome>, AppError> {
    let options = EnrichOptions {
        llm: state.config.llm_settings(None, req.model, None),
        verbose: false,
        dry_run: req.dry_run,
        unit_config: req.unit_config,
    };

    let outcome = enrich_fields(&req.fields, req.previous_document.as_ref(), &options).await?;
    tracing::info!(
        fields = outcome.fields.len(),
        generated = outcome.generated_count(),
        recovered = outcome.recovered.len(),
        "Enrichment request complete"
    );
    Ok(Json(outcome))
}

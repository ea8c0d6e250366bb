use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::Config;
use crate::enrichment::enricher::{enrich_fields, EnrichOptions, EnrichOutcome};
use crate::enrichment::prompts::available_prompt_keys;
use crate::enrichment::validation::validate_llm_config;
use crate::llm_client::DEFAULT_MODEL;
use crate::models::field::Field;
use crate::models::previous::{map_raw_fields, FieldMapping, PreviousDocument};
use crate::models::unit_config::UnitConfig;

#[derive(Parser, Debug)]
#[command(
    name = "ncoer-enricher",
    version,
    about = "Populates NCOER form fields from unit config and Claude-generated narrative"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enrich a field collection and write the result as JSON
    Generate(GenerateArgs),
    /// Check the LLM settings of a field collection without generating
    Validate(ValidateArgs),
    /// List the registered prompt keys
    ListPrompts,
    /// Turn raw extracted PDF fields into a previous-NCOER document
    StructurePrevious(StructureArgs),
    /// Run the HTTP API
    Serve(ServeArgs),
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Field definitions with LLM markers
    #[arg(long, value_name = "PATH")]
    pub fields: PathBuf,

    /// Previous NCOER JSON used as context
    #[arg(long, value_name = "PATH")]
    pub previous: Option<PathBuf>,

    /// Unit configuration JSON for static fields and unit context
    #[arg(long, value_name = "PATH")]
    pub unit_config: Option<PathBuf>,

    /// Output path for the enriched fields
    #[arg(long, value_name = "PATH", default_value = "fields-enriched.json")]
    pub output: PathBuf,

    /// Anthropic API key (falls back to ANTHROPIC_API_KEY, then llm-config.json)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Claude model to use
    #[arg(long)]
    pub model: Option<String>,

    /// Retries per field after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Preview prompts without calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Narrate progress
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[arg(long, value_name = "PATH")]
    pub fields: PathBuf,
}

#[derive(Parser, Debug)]
pub struct StructureArgs {
    /// Extractor output: either `{"rawFields": {...}}` or a flat object of raw fields
    #[arg(long, value_name = "PATH")]
    pub raw: PathBuf,

    /// Standard field name → raw PDF field name(s)
    #[arg(long, value_name = "PATH")]
    pub mapping: PathBuf,

    #[arg(long, value_name = "PATH", default_value = "previous-ncoer.json")]
    pub output: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Overrides PORT
    #[arg(long)]
    pub port: Option<u16>,
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

pub async fn run_generate(args: GenerateArgs, config: &Config) -> Result<()> {
    let fields: Vec<Field> = read_json(&args.fields).context("Error reading fields")?;

    let previous = match &args.previous {
        Some(path) => {
            let previous: PreviousDocument =
                read_json(path).context("Error reading previous NCOER")?;
            info!("Loaded previous NCOER context from {}", path.display());
            Some(previous)
        }
        None => None,
    };

    let unit_config = match &args.unit_config {
        Some(path) => Some(read_json::<UnitConfig>(path).context("Error reading unit config")?),
        None => None,
    };

    let settings = config.llm_settings(args.api_key.clone(), args.model.clone(), args.max_retries);
    info!(
        fields = %args.fields.display(),
        output = %args.output.display(),
        model = settings.model.as_deref().unwrap_or(DEFAULT_MODEL),
        dry_run = args.dry_run,
        "Starting enrichment"
    );

    let options = EnrichOptions {
        llm: settings,
        verbose: args.verbose,
        dry_run: args.dry_run,
        unit_config,
    };

    let outcome = match enrich_fields(&fields, previous.as_ref(), &options).await {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(partial) = err.partial() {
                let checkpoint = checkpoint_path(&args.output);
                write_json(&checkpoint, partial)?;
                eprintln!("Partial results written to {}", checkpoint.display());
            }
            return Err(err.into());
        }
    };

    if args.verbose {
        for warning in &outcome.warnings {
            println!("Warning: {warning}");
        }
    }

    if args.dry_run {
        print_previews(&outcome);
        return Ok(());
    }

    write_json(&args.output, &outcome.fields)?;
    println!("\nEnriched fields written to {}", args.output.display());
    println!("Generated content for {} fields", outcome.generated_count());

    if !outcome.recovered.is_empty() {
        println!("\nErrors encountered:");
        for recovered in &outcome.recovered {
            let note = if recovered.used_fallback { " (used fallback)" } else { "" };
            println!("  - {}: {}{}", recovered.field, recovered.message, note);
        }
    }

    Ok(())
}

pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let fields: Vec<Field> = read_json(&args.fields).context("Error reading fields")?;
    let report = validate_llm_config(&fields);

    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    if !report.valid {
        eprintln!("Field configuration errors:");
        for error in &report.errors {
            eprintln!("  - {error}");
        }
        bail!("{} field configuration error(s)", report.errors.len());
    }

    let llm_fields = fields.iter().filter(|f| f.wants_generation()).count();
    println!("Configuration valid: {} fields, {llm_fields} marked for generation", fields.len());
    Ok(())
}

pub fn run_list_prompts() {
    println!("Available prompt keys:\n");
    for prompt in available_prompt_keys() {
        println!("  {:<25} {}", prompt.key, prompt.description);
    }
}

pub fn run_structure_previous(args: &StructureArgs) -> Result<()> {
    let raw: Map<String, Value> = read_json(&args.raw).context("Error reading raw fields")?;
    let mapping: FieldMapping = read_json(&args.mapping).context("Error reading field mapping")?;

    let raw_fields = match raw.get("rawFields") {
        Some(Value::Object(fields)) => fields,
        _ => &raw,
    };
    let mapped = map_raw_fields(raw_fields, &mapping);
    let previous = PreviousDocument::from_mapped(&mapped);
    info!(
        raw = raw_fields.len(),
        mapped = mapped.len(),
        empty = previous.is_empty(),
        "Structured previous NCOER"
    );

    write_json(&args.output, &previous)?;
    println!("Previous NCOER written to {}", args.output.display());
    Ok(())
}

fn print_previews(outcome: &EnrichOutcome) {
    for preview in &outcome.previews {
        println!("\n--- {} ({}) ---", preview.field, preview.prompt_key);
        println!("{}", preview.description);
        println!("Max tokens: {}", preview.max_tokens);
        if preview.context_keys.is_empty() {
            println!("Context: (none)");
        } else {
            println!("Context: {}", preview.context_keys.join(", "));
        }
        println!("\n{}", preview.prompt);
    }
    println!("\nDry run: {} prompts rendered, nothing written", outcome.previews.len());
}

// ────────────────────────────────────────────────────────────────────────────
// File helpers
// ────────────────────────────────────────────────────────────────────────────

/// `fields-enriched.json` → `fields-enriched.partial.json`
pub fn checkpoint_path(output: &Path) -> PathBuf {
    output.with_extension("partial.json")
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("File not found or unreadable: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

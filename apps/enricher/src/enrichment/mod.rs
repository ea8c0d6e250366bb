// Field enrichment pipeline: static config values plus LLM-generated content.
// All LLM calls go through llm_client; this module never talks HTTP itself.

pub mod context_builder;
pub mod enricher;
pub mod handlers;
pub mod prompts;
pub mod validation;

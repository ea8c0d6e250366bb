use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// No LLM client lives here: each enrichment request resolves credentials and
/// builds its own client, so a server without a key still answers dry runs.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}

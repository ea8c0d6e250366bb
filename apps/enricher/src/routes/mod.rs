pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::enrichment::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/prompts", get(handlers::handle_list_prompts))
        .route("/api/v1/fields/validate", post(handlers::handle_validate))
        .route("/api/v1/fields/enrich", post(handlers::handle_enrich))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;

    fn app() -> Router {
        build_router(AppState {
            config: Config::default(),
        })
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "ncoer-enricher");
    }

    #[tokio::test]
    async fn test_list_prompts() {
        let request = Request::builder()
            .uri("/api/v1/prompts")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        let keys: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["key"].as_str().unwrap())
            .collect();
        assert!(keys.contains(&"part4_pt"));
        assert!(keys.contains(&"part5_sr_comments"));
    }

    #[tokio::test]
    async fn test_validate_reports_errors_without_failing_the_request() {
        let body = json!({
            "fields": [
                { "name": "a", "type": "text", "llm": { "generate": true } },
                { "name": "b", "type": "checkbox", "llm": { "generate": true, "promptKey": "part4_pt" } }
            ]
        });
        let (status, report) = send(post_json("/api/v1/fields/validate", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["valid"], false);
        assert_eq!(report["errors"][0], "Field \"a\": missing llm.promptKey");
        assert_eq!(report["warnings"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enrich_dry_run_needs_no_credentials() {
        let body = json!({
            "fields": [
                { "name": "ratedName", "type": "text", "static": { "configKey": "ratedNCO.name" } },
                { "name": "pt", "type": "text", "llm": { "generate": true, "promptKey": "part4_pt" } }
            ],
            "previousDocument": {
                "part4": { "ptComments": "Scored 540 on the ACFT" }
            },
            "unitConfig": { "ratedNCO": { "name": "SMITH, JOHN A" } },
            "dryRun": true
        });
        let (status, outcome) = send(post_json("/api/v1/fields/enrich", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["fields"][0]["value"], "SMITH, JOHN A");
        assert!(outcome["fields"][1].get("value").is_none());
        assert_eq!(outcome["previews"][0]["promptKey"], "part4_pt");
        assert!(outcome["previews"][0]["prompt"]
            .as_str()
            .unwrap()
            .contains("Scored 540 on the ACFT"));
    }

    #[tokio::test]
    async fn test_enrich_rejects_invalid_configuration() {
        let body = json!({
            "fields": [
                { "name": "x", "llm": { "generate": true } }
            ]
        });
        let (status, error) = send(post_json("/api/v1/fields/enrich", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"]["code"], "VALIDATION_ERROR");
        assert!(error["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Field \"x\": missing llm.promptKey"));
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::enrichment::enricher::EnrichError;
use crate::llm_client::ErrorKind;
use crate::models::field::Field;

/// Application-level error type for the HTTP surface.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// LLM failures that abort a run carry the fields enriched so far; they are
/// returned as `error.partialFields` so the caller can checkpoint.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        partial: Option<Vec<Field>>,
    },

    #[error("LLM error: {message}")]
    Llm {
        message: String,
        partial: Option<Vec<Field>>,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<EnrichError> for AppError {
    fn from(err: EnrichError) -> Self {
        let message = err.to_string();
        let (kind, partial) = match err {
            EnrichError::Validation(report) => {
                return AppError::Validation(report.errors.join("; "))
            }
            EnrichError::Client(source) => (source.kind(), None),
            EnrichError::Generation {
                source, partial, ..
            } => (source.kind(), Some(partial)),
        };

        if kind == ErrorKind::Auth {
            AppError::Unauthorized { message, partial }
        } else {
            AppError::Llm { message, partial }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, partial) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None),
            AppError::Unauthorized { message, partial } => {
                tracing::error!("LLM credentials rejected: {message}");
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message, partial)
            }
            AppError::Llm { message, partial } => {
                tracing::error!("LLM error: {message}");
                (StatusCode::BAD_GATEWAY, "LLM_ERROR", message, partial)
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(fields) = partial {
            error["partialFields"] = serde_json::to_value(fields).unwrap_or(Value::Null);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    use crate::enrichment::enricher::FieldError;
    use crate::enrichment::validation::ValidationReport;
    use crate::llm_client::LlmError;
    use crate::models::field::FieldValue;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn generated(name: &str, text: &str) -> Field {
        let mut field = Field::text(name);
        field.value = Some(FieldValue::Text(text.to_string()));
        field
    }

    #[tokio::test]
    async fn test_validation_maps_to_bad_request() {
        let err = EnrichError::Validation(ValidationReport {
            errors: vec!["Field \"a\": missing llm.promptKey".to_string()],
            warnings: vec![],
            valid: false,
        });
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"].get("partialFields").is_none());
    }

    #[test]
    fn test_auth_failure_maps_to_unauthorized() {
        let err = EnrichError::Client(LlmError::Auth("No API key found".to_string()));
        let app = AppError::from(err);
        assert!(matches!(app, AppError::Unauthorized { partial: None, .. }));
        assert_eq!(app.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_aborted_run_returns_partial_fields() {
        let err = EnrichError::Generation {
            field: "leads".to_string(),
            source: FieldError::Llm(LlmError::Auth("Invalid API key".to_string())),
            partial: vec![generated("pt", "PT text"), Field::text("leads")],
        };

        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_of(response).await;
        let partial = body["error"]["partialFields"].as_array().unwrap();
        assert_eq!(partial.len(), 2);
        assert_eq!(partial[0]["name"], "pt");
        assert_eq!(partial[0]["value"], "PT text");
        assert!(partial[1].get("value").is_none());
    }

    #[tokio::test]
    async fn test_generation_failure_names_field() {
        let err = EnrichError::Generation {
            field: "part4_pt".to_string(),
            source: FieldError::Llm(LlmError::Api {
                status: 404,
                message: "model not found".to_string(),
            }),
            partial: vec![],
        };
        let app = AppError::from(err);
        match &app {
            AppError::Llm { message, partial } => {
                assert!(message.contains("part4_pt"));
                assert!(message.contains("model not found"));
                assert_eq!(partial.as_deref(), Some(&[][..]));
            }
            other => panic!("unexpected {other:?}"),
        }

        let response = app.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_of(response).await;
        assert_eq!(body["error"]["code"], "LLM_ERROR");
        assert_eq!(body["error"]["partialFields"], json!([]));
    }
}

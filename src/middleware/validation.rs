use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::error::ErrorResponse;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Validation failed: {0}")]
    InvalidInput(String),
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let status = match self {
            ValidationError::InvalidJson(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ValidationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            error_code: "VALIDATION_ERROR".to_string(),
        });

        (status, body).into_response()
    }
}

/// `field: message, message; field: message`
fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            format!("{}: {}", field, messages.join(", "))
        })
        .collect();
    fields.sort();
    fields.join("; ")
}

/// JSON body extractor that runs `validator` rules before the handler sees it
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidationError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ValidationError::InvalidJson(rejection.body_text()))?;

        value
            .validate()
            .map_err(|e| ValidationError::InvalidInput(describe(&e)))?;

        Ok(ValidatedJson(value))
    }
}

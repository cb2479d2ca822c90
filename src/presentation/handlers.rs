use crate::application::registration_service::RegistrationService;
use crate::data::registration_store::InMemoryRegistrationStore;
use crate::domain::error::DomainError;
use crate::domain::user::{CompleteRegistration, CreatePartialUser};
use actix_web::{HttpResponse, ResponseError, web};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub struct AppState {
    pub registrations: RegistrationService<InMemoryRegistrationStore>,
}

// Uniform error response format
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Internal server error")]
    Internal(String),
}

impl ResponseError for RegistrationError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            RegistrationError::Validation(_) => actix_web::http::StatusCode::BAD_REQUEST,
            RegistrationError::Conflict(_) => actix_web::http::StatusCode::BAD_REQUEST,
            RegistrationError::NotFound(_) => actix_web::http::StatusCode::NOT_FOUND,
            RegistrationError::Internal(_) => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_msg = self.to_string();

        let (kind, details) = match self {
            RegistrationError::Validation(msg) => ("validation", serde_json::json!({ "message": msg })),
            RegistrationError::Conflict(msg) => ("conflict", serde_json::json!({ "message": msg })),
            RegistrationError::NotFound(msg) => ("not_found", serde_json::json!({ "message": msg })),
            // Internal detail stays in the logs.
            RegistrationError::Internal(_) => ("internal", serde_json::json!({})),
        };

        match self {
            RegistrationError::Internal(detail) => {
                error!(error = %detail, status = %status, kind = kind, "Internal error")
            }
            _ => warn!(error = %error_msg, status = %status, kind = kind, "Request rejected"),
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: error_msg,
            details,
        })
    }
}

impl From<anyhow::Error> for RegistrationError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<DomainError>() {
            Some(e @ DomainError::AlreadyRegistered) => RegistrationError::Conflict(e.to_string()),
            Some(e @ DomainError::EmailTaken) => RegistrationError::Conflict(e.to_string()),
            Some(e @ DomainError::PartialUserNotFound) => {
                RegistrationError::NotFound(e.to_string())
            }
            Some(DomainError::Validation(msg)) => RegistrationError::Validation(msg.clone()),
            Some(e @ DomainError::DuplicateEmail(_)) => RegistrationError::Conflict(e.to_string()),
            None => RegistrationError::Internal(format!("{err:#}")),
        }
    }
}

/// Turns malformed JSON bodies into the same error shape as domain failures.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        RegistrationError::Validation(format!("Invalid request body: {err}")).into()
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
}

#[instrument]
pub async fn health_check() -> HttpResponse {
    info!("Health check requested");
    let response = HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };
    HttpResponse::Ok().json(response)
}

#[instrument(skip(state, req), fields(email = %req.email, partial_id))]
pub async fn create_partial_user(
    state: web::Data<AppState>,
    req: web::Json<CreatePartialUser>,
) -> Result<HttpResponse, RegistrationError> {
    info!(email = %req.email, "Partial registration request received");
    let partial = state
        .registrations
        .create_partial_user(req.into_inner())
        .await?;
    tracing::Span::current().record("partial_id", partial.id.as_str());
    info!(
        partial_id = %partial.id,
        email = %partial.email,
        "Partial user created successfully"
    );
    Ok(HttpResponse::Created().json(partial))
}

#[instrument(skip(state, req), fields(email = %req.email, user_id))]
pub async fn complete_registration(
    state: web::Data<AppState>,
    req: web::Json<CompleteRegistration>,
) -> Result<HttpResponse, RegistrationError> {
    info!(
        email = %req.email,
        auth_provider = %req.auth_provider,
        "Registration completion request received"
    );
    let user = state
        .registrations
        .complete_registration(req.into_inner())
        .await?;
    tracing::Span::current().record("user_id", user.id.as_str());
    info!(
        user_id = %user.id,
        email = %user.email,
        "Registration completed successfully"
    );
    Ok(HttpResponse::Created().json(user))
}

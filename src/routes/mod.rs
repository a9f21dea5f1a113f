// Route exports
pub mod admin;
pub mod entries;
pub mod matches;

use actix_web::{error, http::StatusCode, web, HttpRequest, HttpResponse};

use crate::core::Engine;
use crate::error::EngineError;
use crate::models::ErrorResponse;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure)
            .configure(entries::configure)
            .configure(admin::configure),
    );
}

/// Map an engine error onto its HTTP status and JSON body
pub fn error_response(err: EngineError) -> HttpResponse {
    let (status, error, reasons) = match &err {
        EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed", Vec::new()),
        EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", Vec::new()),
        EngineError::Conflict(_) => (StatusCode::CONFLICT, "conflict", Vec::new()),
        EngineError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state", Vec::new()),
        EngineError::Ineligible { reasons } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "ineligible", reasons.clone())
        }
        EngineError::ExternalDependency(_) => {
            (StatusCode::BAD_GATEWAY, "external_dependency", Vec::new())
        }
        EngineError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", Vec::new()),
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected: {}", err);
    }

    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message: err.to_string(),
        status_code: status.as_u16(),
        reasons,
    })
}

/// 400 with the shared error body for requests that fail extraction
fn rejected_payload(kind: &str, message: String) -> actix_web::Error {
    let body = ErrorResponse {
        error: kind.to_string(),
        message: message.clone(),
        status_code: StatusCode::BAD_REQUEST.as_u16(),
        reasons: Vec::new(),
    };
    error::InternalError::from_response(message, HttpResponse::BadRequest().json(body)).into()
}

pub fn json_error_handler(err: error::JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("Rejected JSON body on {}: {}", req.path(), err);
    rejected_payload("invalid_json", format!("Invalid JSON: {}", err))
}

pub fn query_error_handler(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    rejected_payload("invalid_query", format!("Invalid query: {}", err))
}

/// Malformed ids in the path, e.g. a non-UUID entry id
pub fn path_error_handler(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    rejected_payload("invalid_path", format!("Invalid path parameter: {}", err))
}

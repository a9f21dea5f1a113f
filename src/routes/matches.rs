use actix_web::{web, HttpResponse, Responder};
use uuid::Uuid;

use crate::core::ConfirmationOutcome;
use crate::models::{
    ConfirmRequest, ConfirmationResponse, DeclineRequest, HealthResponse, MeetingOutcomeRequest,
};
use crate::routes::{error_response, AppState};

/// Configure match, meeting and health routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matches/{id}", web::get().to(get_match))
        .route("/matches/{id}/confirm", web::post().to(confirm_match))
        .route("/matches/{id}/decline", web::post().to(decline_match))
        .route("/meetings/{match_id}", web::get().to(get_meeting))
        .route("/meetings/{match_id}/outcome", web::post().to(record_outcome));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state.engine.store.health_check().await.unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

async fn get_match(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    match state.engine.coordinator.get_match(path.into_inner()).await {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(e) => error_response(e),
    }
}

/// Confirm a proposed match
///
/// POST /api/v1/matches/{id}/confirm
///
/// Request body:
/// ```json
/// { "entryId": "uuid" }
/// ```
///
/// `outcome` in the response is one of `pending`, `scheduled`, `expired`, `closed`.
async fn confirm_match(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ConfirmRequest>,
) -> impl Responder {
    let match_id = path.into_inner();

    match state.engine.coordinator.confirm(match_id, req.entry_id).await {
        Ok(outcome) => {
            let label = outcome.label().to_string();
            let (matched, meeting) = match outcome {
                ConfirmationOutcome::Pending(m) | ConfirmationOutcome::Closed(m) => (m, None),
                ConfirmationOutcome::Scheduled { matched, meeting } => (matched, Some(meeting)),
            };
            HttpResponse::Ok().json(ConfirmationResponse {
                outcome: label,
                matched,
                meeting,
            })
        }
        Err(e) => error_response(e),
    }
}

async fn decline_match(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<DeclineRequest>,
) -> impl Responder {
    match state
        .engine
        .coordinator
        .decline(path.into_inner(), req.entry_id, req.reason)
        .await
    {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(e) => error_response(e),
    }
}

async fn get_meeting(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    match state.engine.coordinator.get_meeting(path.into_inner()).await {
        Ok(meeting) => HttpResponse::Ok().json(meeting),
        Err(e) => error_response(e),
    }
}

/// Meeting-completion signal
///
/// POST /api/v1/meetings/{match_id}/outcome
///
/// Request body:
/// ```json
/// { "outcome": "completed|no_show|cancelled" }
/// ```
async fn record_outcome(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<MeetingOutcomeRequest>,
) -> impl Responder {
    match state
        .engine
        .coordinator
        .record_meeting_outcome(path.into_inner(), req.outcome)
        .await
    {
        Ok(meeting) => HttpResponse::Ok().json(meeting),
        Err(e) => error_response(e),
    }
}

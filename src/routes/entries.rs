use actix_web::{web, HttpResponse, Responder};
use uuid::Uuid;

use crate::models::{EnqueueRequest, UpdateGatesRequest};
use crate::routes::{error_response, AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/entries", web::post().to(submit_entry))
        .service(
            web::resource("/entries/{id}")
                .route(web::get().to(get_entry))
                .route(web::delete().to(withdraw_entry)),
        )
        .route("/entries/{id}/gates", web::post().to(update_gates));
}

/// Join the queue
///
/// POST /api/v1/entries
///
/// Request body:
/// ```json
/// {
///   "participantId": "string",
///   "age": 26,
///   "gender": "female",
///   "preferredAgeMin": 24,
///   "preferredAgeMax": 32,
///   "genderPreference": "male",
///   "meetingType": "casual",
///   "availability": [{"date": "2025-12-28", "start": "18:00:00", "end": "20:00:00"}]
/// }
/// ```
async fn submit_entry(state: web::Data<AppState>, req: web::Json<EnqueueRequest>) -> impl Responder {
    tracing::info!("Enqueue request from {}", req.participant_id);

    match state.engine.intake.submit(req.into_inner()).await {
        Ok(entry) => HttpResponse::Created().json(entry),
        Err(e) => error_response(e),
    }
}

async fn get_entry(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    match state.engine.intake.get_entry(path.into_inner()).await {
        Ok(entry) => HttpResponse::Ok().json(entry),
        Err(e) => error_response(e),
    }
}

/// Withdraw from the queue
///
/// DELETE /api/v1/entries/{id}
///
/// A proposed entry declines its match; the counterpart is requeued.
async fn withdraw_entry(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    match state.engine.coordinator.withdraw(path.into_inner()).await {
        Ok(entry) => HttpResponse::Ok().json(entry),
        Err(e) => error_response(e),
    }
}

/// Verification / payment status callback
async fn update_gates(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<UpdateGatesRequest>,
) -> impl Responder {
    let req = req.into_inner();
    match state
        .engine
        .intake
        .update_gates(path.into_inner(), req.verification_status, req.payment_status)
        .await
    {
        Ok(entry) => HttpResponse::Ok().json(entry),
        Err(e) => error_response(e),
    }
}

use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::error::EngineError;
use crate::models::{
    EntriesResponse, EntryFilter, ForceMatchRequest, ListMatchesQuery, ListWaitingQuery,
    MatchesResponse, SweepResponse,
};
use crate::routes::{error_response, AppState};

/// Configure operator routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/admin/waiting", web::get().to(list_waiting))
        .route("/admin/matches", web::get().to(list_matches))
        .route("/admin/matches/force", web::post().to(force_match))
        .route("/admin/passes", web::post().to(run_pass))
        .route("/admin/sweeps", web::post().to(run_sweep));
}

/// GET /api/v1/admin/waiting?meetingType=&gender=&eligibleOnly=
async fn list_waiting(state: web::Data<AppState>, query: web::Query<ListWaitingQuery>) -> impl Responder {
    let filter = EntryFilter::from(query.into_inner());

    match state.engine.admin.list_waiting(&filter).await {
        Ok(entries) => HttpResponse::Ok().json(EntriesResponse {
            total_results: entries.len(),
            entries,
        }),
        Err(e) => error_response(e),
    }
}

/// GET /api/v1/admin/matches?status=proposed
async fn list_matches(state: web::Data<AppState>, query: web::Query<ListMatchesQuery>) -> impl Responder {
    match state.engine.admin.list_by_status(query.status).await {
        Ok(matches) => HttpResponse::Ok().json(MatchesResponse {
            total_results: matches.len(),
            matches,
        }),
        Err(e) => error_response(e),
    }
}

/// Force a match between two waiting entries
///
/// POST /api/v1/admin/matches/force
///
/// Request body:
/// ```json
/// {
///   "entryA": "uuid",
///   "entryB": "uuid",
///   "justification": "string"
/// }
/// ```
async fn force_match(state: web::Data<AppState>, req: web::Json<ForceMatchRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return error_response(EngineError::from(errors));
    }

    let req = req.into_inner();
    tracing::info!("Admin force match requested for {} and {}", req.entry_a, req.entry_b);

    match state
        .engine
        .admin
        .force_match(req.entry_a, req.entry_b, req.justification)
        .await
    {
        Ok(record) => HttpResponse::Created().json(record),
        Err(e) => error_response(e),
    }
}

/// Run a matching pass now
async fn run_pass(state: web::Data<AppState>) -> impl Responder {
    match state.engine.matcher.run_matching_pass().await {
        Ok(matches) => HttpResponse::Ok().json(MatchesResponse {
            total_results: matches.len(),
            matches,
        }),
        Err(e) => error_response(e),
    }
}

/// Run an expiry sweep now
async fn run_sweep(state: web::Data<AppState>) -> impl Responder {
    match state.engine.coordinator.sweep_expired().await {
        Ok(report) => HttpResponse::Ok().json(SweepResponse {
            expired: report.expired,
            repaired_entries: report.repaired_entries,
        }),
        Err(e) => error_response(e),
    }
}

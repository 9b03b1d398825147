//! Handlers de novedades
//!
//! Reporte de novedades durante un trayecto y sus estadísticas.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use tracing::info;

use crate::{
    dto::ApiResponse,
    models::auth::AuthContext,
    models::incident::{CreateIncidentRequest, IncidentFilters, IncidentResponse, IncidentStats},
    state::AppState,
    utils::errors::AppError,
};

pub fn create_incidents_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_incidents).post(report_incident))
        .route("/stats", get(incident_stats))
}

async fn report_incident(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Json(request): Json<CreateIncidentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IncidentResponse>>), AppError> {
    let incident = state.engine.report_incident(&ctx, request).await?;
    info!(
        "🚨 Novedad {} en trayecto {}",
        incident.tipo.as_str(),
        incident.trayecto_id
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(incident, "Novedad reportada")),
    ))
}

async fn list_incidents(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Query(filters): Query<IncidentFilters>,
) -> Result<Json<Vec<IncidentResponse>>, AppError> {
    Ok(Json(state.engine.incidents(&ctx, filters).await?))
}

async fn incident_stats(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
) -> Result<Json<IncidentStats>, AppError> {
    Ok(Json(state.engine.incident_stats(&ctx).await?))
}

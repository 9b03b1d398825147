//! Handlers del tablero de despacho

use axum::{extract::State, routing::get, Extension, Json, Router};

use crate::{
    models::auth::AuthContext,
    models::dashboard::{DashboardSnapshot, FleetSummary},
    state::AppState,
    utils::errors::AppError,
};

pub fn create_dashboard_router() -> Router<AppState> {
    Router::new()
        .route("/resumen", get(fleet_summary))
        .route("/snapshot", get(dashboard_snapshot))
}

async fn fleet_summary(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
) -> Result<Json<FleetSummary>, AppError> {
    Ok(Json(state.engine.fleet_summary(&ctx).await?))
}

async fn dashboard_snapshot(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    Ok(Json(state.engine.dashboard_snapshot(&ctx).await?))
}

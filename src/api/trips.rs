//! Handlers de trayectos
//!
//! Ciclo de vida de los trayectos: programar, iniciar, finalizar, cancelar
//! y consultar progreso y atrasos.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::info;
use validator::Validate;

use crate::{
    dto::ApiResponse,
    models::auth::AuthContext,
    models::trip::{CreateTripRequest, FinishTripRequest, TripFilters, TripId, TripResponse},
    services::progress_estimator::{OverdueTrip, TripProgress},
    state::AppState,
    utils::errors::AppError,
};

pub fn create_trips_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_trips).post(create_trip))
        .route("/atrasados", get(overdue_trips))
        .route("/:id", get(get_trip).delete(delete_trip))
        .route("/:id/iniciar", post(start_trip))
        .route("/:id/finalizar", post(finish_trip))
        .route("/:id/cancelar", post(cancel_trip))
        .route("/:id/progreso", get(trip_progress))
}

async fn list_trips(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Query(filters): Query<TripFilters>,
) -> Result<Json<Vec<TripResponse>>, AppError> {
    let trips = state.engine.list_trips(&ctx, filters).await?;
    Ok(Json(trips))
}

async fn create_trip(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Json(request): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TripResponse>>), AppError> {
    let trip = state.engine.create_trip(&ctx, request).await?;
    info!("📝 Trayecto {} programado por {}", trip.id, ctx.user_id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(trip, "Trayecto creado exitosamente")),
    ))
}

async fn get_trip(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> Result<Json<TripResponse>, AppError> {
    Ok(Json(state.engine.get_trip(&ctx, trip_id).await?))
}

async fn delete_trip(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.engine.delete_trip(&ctx, trip_id).await?;
    Ok(Json(ApiResponse::message("Trayecto eliminado exitosamente")))
}

async fn start_trip(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> Result<Json<ApiResponse<TripResponse>>, AppError> {
    let trip = state.engine.start_trip(&ctx, trip_id).await?;
    Ok(Json(ApiResponse::success_with_message(trip, "Trayecto iniciado")))
}

async fn finish_trip(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
    Json(request): Json<FinishTripRequest>,
) -> Result<Json<ApiResponse<TripResponse>>, AppError> {
    request.validate()?;
    let trip = state
        .engine
        .finish_trip(&ctx, trip_id, request.cantidad_pasajeros)
        .await?;
    Ok(Json(ApiResponse::success_with_message(trip, "Trayecto finalizado")))
}

async fn cancel_trip(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> Result<Json<ApiResponse<TripResponse>>, AppError> {
    let trip = state.engine.cancel_trip(&ctx, trip_id).await?;
    Ok(Json(ApiResponse::success_with_message(trip, "Trayecto cancelado")))
}

async fn trip_progress(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(trip_id): Path<TripId>,
) -> Result<Json<TripProgress>, AppError> {
    Ok(Json(state.engine.progress(&ctx, trip_id).await?))
}

async fn overdue_trips(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
) -> Result<Json<Vec<OverdueTrip>>, AppError> {
    Ok(Json(state.engine.overdue_trips(&ctx).await?))
}

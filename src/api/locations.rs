//! Handlers de ubicaciones
//!
//! Ingesta de posiciones GPS de los conductores y vistas de monitoreo:
//! posiciones activas, recorrido y stream SSE en vivo.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::{
    dto::ApiResponse,
    models::auth::AuthContext,
    models::position::{
        ActivePositionResponse, LocationFilters, LocationUpdateRequest, PositionUpdate,
        TrailPointResponse,
    },
    models::trip::DriverId,
    state::AppState,
    utils::errors::AppError,
};

pub fn create_locations_router() -> Router<AppState> {
    Router::new()
        .route("/ubicacion", post(update_location))
        .route("/ubicaciones", get(active_positions))
        .route("/ubicaciones/stream", get(position_stream))
        .route("/ubicaciones/:conductor_id/recorrido", get(driver_trail))
}

async fn update_location(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Json(request): Json<LocationUpdateRequest>,
) -> Result<Json<ApiResponse<TrailPointResponse>>, AppError> {
    let position = state.engine.ingest_location(&ctx, request).await?;
    Ok(Json(ApiResponse::success_with_message(
        TrailPointResponse::from(&position),
        "Ubicación actualizada",
    )))
}

async fn active_positions(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Query(filters): Query<LocationFilters>,
) -> Result<Json<Vec<ActivePositionResponse>>, AppError> {
    Ok(Json(state.engine.active_positions(&ctx, filters).await?))
}

async fn driver_trail(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Path(driver_id): Path<DriverId>,
) -> Result<Json<Vec<TrailPointResponse>>, AppError> {
    Ok(Json(state.engine.trail(&ctx, driver_id).await?))
}

/// Evento SSE `ubicacion`
#[derive(Debug, Serialize)]
struct PositionEvent {
    conductor_id: DriverId,
    lat: f64,
    lng: f64,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&PositionUpdate> for PositionEvent {
    fn from(update: &PositionUpdate) -> Self {
        Self {
            conductor_id: update.driver_id,
            lat: update.position.coordinate.latitude,
            lng: update.position.coordinate.longitude,
            timestamp: update.position.captured_at,
        }
    }
}

async fn position_stream(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let rx = state.engine.position_stream(&ctx)?;
    debug!("📡 Stream de ubicaciones abierto para {}", ctx.user_id);

    let updates = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(update) => {
                    let event = match Event::default()
                        .event("ubicacion")
                        .json_data(PositionEvent::from(&update))
                    {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("⚠️ No se pudo serializar la ubicación: {}", e);
                            continue;
                        }
                    };
                    return Some((Ok(event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Stream de ubicaciones atrasado, {} actualizaciones descartadas", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(updates).keep_alive(KeepAlive::default()))
}

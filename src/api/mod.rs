//! API endpoints
//!
//! Este módulo contiene los endpoints de la API.

pub mod dashboard;
pub mod incidents;
pub mod locations;
pub mod routes;
pub mod trips;

use axum::{http::StatusCode, middleware, routing::get, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::dto::ApiResponse;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

/// Crear el router principal de la API
pub fn create_api_router(state: AppState) -> Router {
    let protected = Router::new()
        .nest(
            "/trayectos",
            trips::create_trips_router().merge(locations::create_locations_router()),
        )
        .nest("/novedades", incidents::create_incidents_router())
        .nest("/rutas", routes::create_routes_router())
        .nest("/dashboard", dashboard::create_dashboard_router())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "trip_tracking",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error("Endpoint no encontrado")),
    )
}

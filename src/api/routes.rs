//! Handlers de rutas
//!
//! Catálogo de rutas que el motor usa para nombres y tiempos estimados.

use axum::{extract::State, routing::get, Extension, Json, Router};

use crate::{
    dto::ApiResponse, models::auth::AuthContext, models::route::Route, state::AppState,
    utils::errors::AppError,
};

pub fn create_routes_router() -> Router<AppState> {
    Router::new().route("/", get(list_routes).post(upsert_route))
}

async fn list_routes(State(state): State<AppState>) -> Json<Vec<Route>> {
    Json(state.engine.list_routes().await)
}

async fn upsert_route(
    Extension(ctx): Extension<AuthContext>,
    State(state): State<AppState>,
    Json(route): Json<Route>,
) -> Result<Json<ApiResponse<Route>>, AppError> {
    let route = state.engine.upsert_route(&ctx, route).await?;
    Ok(Json(ApiResponse::success_with_message(route, "Ruta guardada")))
}

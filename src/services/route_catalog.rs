//! Catálogo de rutas
//!
//! Datos de referencia de solo lectura para el motor: nombre de ruta para
//! las vistas y tiempo estimado como respaldo de la duración del trayecto.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::info;
use validator::Validate;

use crate::models::route::Route;
use crate::models::trip::RouteId;
use crate::utils::errors::{not_found_error, AppResult};

#[derive(Debug, Default)]
pub struct RouteCatalog {
    routes: RwLock<HashMap<RouteId, Route>>,
}

impl RouteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta o reemplaza una ruta
    pub async fn upsert(&self, route: Route) -> AppResult<Route> {
        route.validate()?;
        let replaced = self.routes.write().await.insert(route.id, route.clone());
        info!(
            "🛣️ Ruta {} '{}' {}",
            route.id,
            route.name,
            if replaced.is_some() { "actualizada" } else { "registrada" }
        );
        Ok(route)
    }

    pub async fn get(&self, route_id: RouteId) -> Option<Route> {
        self.routes.read().await.get(&route_id).cloned()
    }

    pub async fn require(&self, route_id: RouteId) -> AppResult<Route> {
        self.get(route_id)
            .await
            .ok_or_else(|| not_found_error("Route", route_id))
    }

    pub async fn name_of(&self, route_id: RouteId) -> Option<String> {
        self.routes.read().await.get(&route_id).map(|r| r.name.clone())
    }

    /// Rutas ordenadas por id
    pub async fn list(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.routes.read().await.values().cloned().collect();
        routes.sort_by_key(|route| route.id);
        routes
    }

    /// Foto completa, para joins sin mantener el lock
    pub async fn snapshot(&self) -> HashMap<RouteId, Route> {
        self.routes.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::AppError;

    fn route(id: RouteId, name: &str) -> Route {
        Route {
            id,
            name: name.to_string(),
            origin: "Terminal".to_string(),
            destination: "Centro".to_string(),
            distance_km: 12.0,
            estimated_time_minutes: Some(40),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let catalog = RouteCatalog::new();
        catalog.upsert(route(2, "Ruta B")).await.unwrap();
        catalog.upsert(route(1, "Ruta A")).await.unwrap();
        catalog.upsert(route(2, "Ruta B2")).await.unwrap();

        let names: Vec<String> = catalog.list().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Ruta A", "Ruta B2"]);
        assert_eq!(catalog.name_of(2).await.as_deref(), Some("Ruta B2"));
        assert!(matches!(catalog.require(9).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_route_rejected() {
        let catalog = RouteCatalog::new();
        let result = catalog.upsert(route(3, "")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(catalog.get(3).await.is_none());
    }
}

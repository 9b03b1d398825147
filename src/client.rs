//! Cliente HTTP del backend de trayectos
//!
//! Este módulo contiene el cliente que usan la app del conductor y el
//! tablero de despacho para hablar con la API REST. Implementa los traits
//! de envío de posiciones, consulta de trayecto activo y snapshot del
//! tablero, así el tracker y el poller funcionan igual en local o remoto.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EnvironmentConfig;
use crate::models::dashboard::{DashboardSnapshot, FleetSummary};
use crate::models::incident::{CreateIncidentRequest, IncidentResponse, IncidentStats};
use crate::models::position::{
    ActivePositionResponse, LocationFilters, LocationUpdateRequest, PositionReport, TrailPointResponse,
};
use crate::models::route::Route;
use crate::models::trip::{
    CreateTripRequest, DriverId, FinishTripRequest, TripFilters, TripId, TripResponse, TripStatus,
};
use crate::services::dashboard_poller::DashboardSource;
use crate::services::geolocation::{ActiveTripProbe, PositionSink};
use crate::services::progress_estimator::{OverdueTrip, TripProgress};
use crate::utils::errors::{AppError, AppResult};

/// Envoltorio `{success, message, data}` de los comandos
#[derive(Debug, Deserialize)]
struct CommandResponse<T> {
    #[allow(dead_code)]
    success: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

/// Cliente HTTP para la API de trayectos
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    /// Crear nuevo cliente HTTP con URL base configurable
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &EnvironmentConfig, token: Option<String>) -> AppResult<Self> {
        let base_url = config
            .backend_url
            .clone()
            .ok_or_else(|| AppError::Validation("BACKEND_URL no configurado".to_string()))?;
        Self::new(base_url, token)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- Trayectos ----

    pub async fn list_trips(&self, filters: &TripFilters) -> AppResult<Vec<TripResponse>> {
        self.fetch(self.get("/trayectos").query(filters)).await
    }

    pub async fn create_trip(&self, request: &CreateTripRequest) -> AppResult<TripResponse> {
        self.command(self.post("/trayectos").json(request)).await
    }

    pub async fn get_trip(&self, trip_id: TripId) -> AppResult<TripResponse> {
        self.fetch(self.get(&format!("/trayectos/{}", trip_id))).await
    }

    pub async fn start_trip(&self, trip_id: TripId) -> AppResult<TripResponse> {
        self.command(self.post(&format!("/trayectos/{}/iniciar", trip_id)))
            .await
    }

    pub async fn finish_trip(&self, trip_id: TripId, passenger_count: i64) -> AppResult<TripResponse> {
        let body = FinishTripRequest {
            cantidad_pasajeros: passenger_count,
        };
        self.command(self.post(&format!("/trayectos/{}/finalizar", trip_id)).json(&body))
            .await
    }

    pub async fn cancel_trip(&self, trip_id: TripId) -> AppResult<TripResponse> {
        self.command(self.post(&format!("/trayectos/{}/cancelar", trip_id)))
            .await
    }

    pub async fn trip_progress(&self, trip_id: TripId) -> AppResult<TripProgress> {
        self.fetch(self.get(&format!("/trayectos/{}/progreso", trip_id)))
            .await
    }

    pub async fn overdue_trips(&self) -> AppResult<Vec<OverdueTrip>> {
        self.fetch(self.get("/trayectos/atrasados")).await
    }

    // ---- Ubicaciones ----

    pub async fn update_location(&self, request: &LocationUpdateRequest) -> AppResult<TrailPointResponse> {
        self.command(self.post("/trayectos/ubicacion").json(request))
            .await
    }

    pub async fn active_positions(&self, filters: &LocationFilters) -> AppResult<Vec<ActivePositionResponse>> {
        self.fetch(self.get("/trayectos/ubicaciones").query(filters))
            .await
    }

    pub async fn driver_trail(&self, driver_id: DriverId) -> AppResult<Vec<TrailPointResponse>> {
        self.fetch(self.get(&format!("/trayectos/ubicaciones/{}/recorrido", driver_id)))
            .await
    }

    // ---- Novedades, rutas y tablero ----

    pub async fn report_incident(&self, request: &CreateIncidentRequest) -> AppResult<IncidentResponse> {
        self.command(self.post("/novedades").json(request)).await
    }

    pub async fn incident_stats(&self) -> AppResult<IncidentStats> {
        self.fetch(self.get("/novedades/stats")).await
    }

    pub async fn list_routes(&self) -> AppResult<Vec<Route>> {
        self.fetch(self.get("/rutas")).await
    }

    pub async fn upsert_route(&self, route: &Route) -> AppResult<Route> {
        self.command(self.post("/rutas").json(route)).await
    }

    pub async fn fleet_summary(&self) -> AppResult<FleetSummary> {
        self.fetch(self.get("/dashboard/resumen")).await
    }

    pub async fn dashboard_snapshot(&self) -> AppResult<DashboardSnapshot> {
        self.fetch(self.get("/dashboard/snapshot")).await
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Consultas: el cuerpo es el recurso tal cual
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> AppResult<T> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// Comandos: el recurso viene dentro de `data`
    async fn command<T: DeserializeOwned>(&self, request: RequestBuilder) -> AppResult<T> {
        let response = Self::check(request.send().await?).await?;
        let body: CommandResponse<T> = response.json().await?;
        if let Some(message) = &body.message {
            debug!("📨 {}", message);
        }
        body.data
            .ok_or_else(|| AppError::Internal("Respuesta sin datos".to_string()))
    }

    async fn check(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.json::<ErrorBody>().await.ok();
        let message = body
            .as_ref()
            .and_then(|b| b.message.clone())
            .unwrap_or_else(|| format!("Error HTTP: {}", status));

        match body.and_then(|b| b.code) {
            Some(code) => Err(AppError::from_code(&code, message)),
            None if status.is_server_error() => Err(AppError::TransientNetwork(message)),
            None => Err(AppError::Internal(message)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ActiveTripQuery {
    conductor_id: DriverId,
    estado: TripStatus,
}

#[async_trait]
impl PositionSink for BackendClient {
    async fn submit(&self, report: PositionReport) -> AppResult<()> {
        let request = LocationUpdateRequest {
            conductor_id: report.driver_id,
            lat: report.coordinate.latitude,
            lng: report.coordinate.longitude,
            timestamp: Some(report.captured_at),
        };
        self.update_location(&request).await.map(|_| ())
    }
}

#[async_trait]
impl ActiveTripProbe for BackendClient {
    async fn has_active_trip(&self, driver_id: DriverId) -> AppResult<bool> {
        let query = ActiveTripQuery {
            conductor_id: driver_id,
            estado: TripStatus::InProgress,
        };
        let trips: Vec<TripResponse> = self.fetch(self.get("/trayectos").query(&query)).await?;
        Ok(!trips.is_empty())
    }
}

#[async_trait]
impl DashboardSource for BackendClient {
    async fn fetch_snapshot(&self) -> AppResult<DashboardSnapshot> {
        self.dashboard_snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = BackendClient::new("http://localhost:3000/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_from_config_requires_backend_url() {
        let config = EnvironmentConfig::default();
        let err = BackendClient::from_config(&config, None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}

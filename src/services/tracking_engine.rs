//! Motor de seguimiento
//!
//! Fachada que une la máquina de estados, el store de posiciones, el
//! estimador, la animación y el registro de trackers. Cada comando recibe
//! el `AuthContext` de forma explícita.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};
use validator::Validate;

use crate::config::TrackingConfig;
use crate::models::auth::AuthContext;
use crate::models::dashboard::{DashboardSnapshot, FleetSummary};
use crate::models::incident::{CreateIncidentRequest, IncidentFilters, IncidentResponse, IncidentStats};
use crate::models::position::{
    ActivePositionResponse, LocationFilters, LocationUpdateRequest, Position, PositionReport,
    PositionUpdate, TrailPointResponse,
};
use crate::models::route::Route;
use crate::models::trip::{CreateTripRequest, DriverId, Trip, TripFilters, TripId, TripResponse, TripStatus};
use crate::services::animation_driver::AnimationDriver;
use crate::services::authorization_service::AuthorizationService;
use crate::services::dashboard_poller::DashboardSource;
use crate::services::geolocation::{ActiveTripProbe, PositionSink, TrackerRegistry};
use crate::services::position_store::PositionStore;
use crate::services::progress_estimator::{OverdueTrip, ProgressEstimator, TripProgress};
use crate::services::route_catalog::RouteCatalog;
use crate::services::trip_state_machine::TripStateMachine;
use crate::utils::clock::{Clock, SharedClock, SystemClock};
use crate::utils::errors::{forbidden_error, validation_error, AppResult};
use crate::utils::geo::Coordinate;
use crate::utils::validation::{into_app_error, validate_coordinates};

pub struct TrackingEngine {
    config: TrackingConfig,
    clock: SharedClock,
    trips: Arc<TripStateMachine>,
    positions: Arc<PositionStore>,
    routes: Arc<RouteCatalog>,
    estimator: ProgressEstimator,
    animation: Arc<AnimationDriver>,
    trackers: Arc<TrackerRegistry>,
    authz: AuthorizationService,
}

impl TrackingEngine {
    pub fn new(config: TrackingConfig, clock: SharedClock) -> Self {
        let positions = Arc::new(PositionStore::new(config.trail_capacity, Arc::clone(&clock)));
        let trackers = Arc::new(TrackerRegistry::new());
        let animation = Arc::new(AnimationDriver::from_config(&config));
        let trips = Arc::new(
            TripStateMachine::new(Arc::clone(&positions), trackers.clone(), Arc::clone(&clock))
                .with_animation(Arc::clone(&animation)),
        );

        info!(
            "🧭 Motor de seguimiento listo (recorrido máx. {}, ventana {} ms)",
            config.trail_capacity, config.animation_window_ms
        );

        Self {
            estimator: ProgressEstimator::new(config.default_trip_duration_minutes),
            animation,
            routes: Arc::new(RouteCatalog::new()),
            authz: AuthorizationService::new(),
            config,
            clock,
            trips,
            positions,
            trackers,
        }
    }

    pub fn with_system_clock(config: TrackingConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn trips(&self) -> &Arc<TripStateMachine> {
        &self.trips
    }

    pub fn positions(&self) -> &Arc<PositionStore> {
        &self.positions
    }

    pub fn routes(&self) -> &Arc<RouteCatalog> {
        &self.routes
    }

    pub fn animation(&self) -> &Arc<AnimationDriver> {
        &self.animation
    }

    /// Registro usado por `start` para pedir la ubicación inmediata
    pub fn trackers(&self) -> &Arc<TrackerRegistry> {
        &self.trackers
    }

    // ---- Trayectos ----

    pub async fn create_trip(&self, ctx: &AuthContext, request: CreateTripRequest) -> AppResult<TripResponse> {
        self.authz
            .require(self.authz.can_manage_trips(ctx), "create trip", ctx)?;
        request.validate()?;
        let trip = self.trips.create(request).await?;
        Ok(self.respond(&trip).await)
    }

    pub async fn get_trip(&self, ctx: &AuthContext, trip_id: TripId) -> AppResult<TripResponse> {
        let trip = self.trips.get(trip_id).await?;
        self.authz
            .require(self.authz.can_view_trip(ctx, &trip), "view trip", ctx)?;
        Ok(self.respond(&trip).await)
    }

    /// Los conductores solo ven sus propios trayectos
    pub async fn list_trips(&self, ctx: &AuthContext, mut filters: TripFilters) -> AppResult<Vec<TripResponse>> {
        if !ctx.role.is_dispatcher() {
            let own = ctx
                .driver_id
                .ok_or_else(|| forbidden_error("list trips", "driver context without conductor_id"))?;
            filters.driver_id = Some(own);
        }

        let trips = self.trips.list(&filters).await;
        let route_names = self.route_names().await;
        let now = self.clock.now();
        Ok(trips
            .iter()
            .map(|trip| {
                TripResponse::from_trip(trip, route_names.get(&trip.route_id).map(String::as_str), now)
            })
            .collect())
    }

    pub async fn start_trip(&self, ctx: &AuthContext, trip_id: TripId) -> AppResult<TripResponse> {
        let trip = self.trips.get(trip_id).await?;
        self.authz
            .require(self.authz.can_operate_trip(ctx, &trip), "start trip", ctx)?;
        let started = self.trips.start(trip_id).await?;
        Ok(self.respond(&started).await)
    }

    pub async fn finish_trip(
        &self,
        ctx: &AuthContext,
        trip_id: TripId,
        passenger_count: i64,
    ) -> AppResult<TripResponse> {
        let trip = self.trips.get(trip_id).await?;
        self.authz
            .require(self.authz.can_operate_trip(ctx, &trip), "finish trip", ctx)?;
        let finished = self.trips.finish(trip_id, passenger_count).await?;
        Ok(self.respond(&finished).await)
    }

    pub async fn cancel_trip(&self, ctx: &AuthContext, trip_id: TripId) -> AppResult<TripResponse> {
        self.authz
            .require(self.authz.can_manage_trips(ctx), "cancel trip", ctx)?;
        let cancelled = self.trips.cancel(trip_id).await?;
        Ok(self.respond(&cancelled).await)
    }

    pub async fn delete_trip(&self, ctx: &AuthContext, trip_id: TripId) -> AppResult<TripResponse> {
        self.authz
            .require(self.authz.can_manage_trips(ctx), "delete trip", ctx)?;
        let deleted = self.trips.delete(trip_id).await?;
        Ok(self.respond(&deleted).await)
    }

    pub async fn progress(&self, ctx: &AuthContext, trip_id: TripId) -> AppResult<TripProgress> {
        let trip = self.trips.get(trip_id).await?;
        self.authz
            .require(self.authz.can_view_trip(ctx, &trip), "view trip progress", ctx)?;
        let route = self.routes.get(trip.route_id).await;
        self.estimator.progress(&trip, route.as_ref(), self.clock.now())
    }

    pub async fn overdue_trips(&self, ctx: &AuthContext) -> AppResult<Vec<OverdueTrip>> {
        self.authz
            .require(self.authz.can_monitor_fleet(ctx), "list overdue trips", ctx)?;
        Ok(self.overdue_snapshot().await)
    }

    /// Atrasos recalculados con el reloj actual
    pub async fn overdue_snapshot(&self) -> Vec<OverdueTrip> {
        let trips = self.trips.in_progress().await;
        let routes = self.routes.snapshot().await;
        self.estimator
            .overdue_trips(&trips, |route_id| routes.get(&route_id).cloned(), self.clock.now())
    }

    /// Progreso sin chequeo de rol, para tareas internas
    pub async fn progress_of(&self, trip_id: TripId) -> AppResult<TripProgress> {
        let trip = self.trips.get(trip_id).await?;
        let route = self.routes.get(trip.route_id).await;
        self.estimator.progress(&trip, route.as_ref(), self.clock.now())
    }

    // ---- Novedades ----

    pub async fn report_incident(
        &self,
        ctx: &AuthContext,
        request: CreateIncidentRequest,
    ) -> AppResult<IncidentResponse> {
        request.validate()?;
        let trip = self.trips.get(request.trayecto_id).await?;
        self.authz
            .require(self.authz.can_operate_trip(ctx, &trip), "report incident", ctx)?;
        if trip.driver_id != request.conductor_id {
            return Err(validation_error(
                "conductor_id",
                "does not match the driver assigned to the trip",
            ));
        }

        let incident = self
            .trips
            .report_incident(request.trayecto_id, request.tipo, request.notas)
            .await?;
        Ok(IncidentResponse::from(&incident))
    }

    pub async fn incidents(&self, ctx: &AuthContext, mut filters: IncidentFilters) -> AppResult<Vec<IncidentResponse>> {
        if !ctx.role.is_dispatcher() {
            filters.conductor_id = Some(
                ctx.driver_id
                    .ok_or_else(|| forbidden_error("list incidents", "driver context without conductor_id"))?,
            );
        }
        Ok(self
            .trips
            .incidents(&filters)
            .await
            .iter()
            .map(IncidentResponse::from)
            .collect())
    }

    pub async fn incident_stats(&self, ctx: &AuthContext) -> AppResult<IncidentStats> {
        self.authz
            .require(self.authz.can_view_stats(ctx), "view incident stats", ctx)?;
        let incidents = self.trips.incidents(&IncidentFilters::default()).await;
        Ok(IncidentStats::compute(&incidents, self.clock.now()))
    }

    // ---- Posiciones ----

    /// `POST /trayectos/ubicacion`
    pub async fn ingest_location(&self, ctx: &AuthContext, request: LocationUpdateRequest) -> AppResult<Position> {
        request.validate()?;
        validate_coordinates(request.lat, request.lng).map_err(|e| into_app_error("lat/lng", e))?;
        self.authz.require(
            self.authz.can_report_position(ctx, request.conductor_id),
            "report position",
            ctx,
        )?;

        let captured_at = request.timestamp.unwrap_or_else(|| self.clock.now());
        Ok(self
            .ingest(PositionReport {
                driver_id: request.conductor_id,
                coordinate: Coordinate::new(request.lat, request.lng),
                captured_at,
            })
            .await)
    }

    /// Ingesta sin chequeo de rol; siempre tiene éxito. El marcador se
    /// actualiza dentro del mismo slot del store, así que el último reporte
    /// en llegar es también el último animado.
    pub async fn ingest(&self, report: PositionReport) -> Position {
        self.positions
            .ingest_with(report, |driver_id, position| {
                self.animation.on_report(driver_id, position.coordinate)
            })
            .await
    }

    /// Posiciones de conductores con trayecto en curso, filtrables por ruta
    pub async fn active_positions(
        &self,
        ctx: &AuthContext,
        filters: LocationFilters,
    ) -> AppResult<Vec<ActivePositionResponse>> {
        self.authz
            .require(self.authz.can_monitor_fleet(ctx), "view active positions", ctx)?;
        Ok(self.collect_active_positions(&filters).await)
    }

    async fn collect_active_positions(&self, filters: &LocationFilters) -> Vec<ActivePositionResponse> {
        let trips = self.trips.in_progress().await;
        let latest = self.positions.snapshot().await;
        let route_names = self.route_names().await;

        let mut active: Vec<ActivePositionResponse> = trips
            .iter()
            .filter(|trip| filters.ruta_id.map_or(true, |route_id| trip.route_id == route_id))
            .filter_map(|trip| {
                let position = latest.get(&trip.driver_id)?;
                Some(ActivePositionResponse {
                    conductor_id: trip.driver_id,
                    trayecto_id: trip.id,
                    ruta_id: trip.route_id,
                    lat: position.coordinate.latitude,
                    lng: position.coordinate.longitude,
                    timestamp: position.captured_at,
                    nombre_ruta: route_names.get(&trip.route_id).cloned(),
                    nombre_conductor: trip.driver_name.clone(),
                    placa_vehiculo: trip.vehicle_plate.clone(),
                })
            })
            .collect();

        active.sort_by_key(|p| p.conductor_id);
        debug!("🗺️ {} posiciones activas", active.len());
        active
    }

    pub async fn trail(&self, ctx: &AuthContext, driver_id: DriverId) -> AppResult<Vec<TrailPointResponse>> {
        let allowed = self.authz.can_monitor_fleet(ctx) || self.authz.is_driver(ctx, driver_id);
        self.authz.require(allowed, "view trail", ctx)?;
        Ok(self
            .positions
            .trail(driver_id)
            .await
            .iter()
            .map(TrailPointResponse::from)
            .collect())
    }

    pub fn displayed_position(&self, driver_id: DriverId) -> Option<Coordinate> {
        self.animation.displayed_position(driver_id)
    }

    /// Suscripción en vivo para el mapa de monitoreo
    pub fn position_stream(&self, ctx: &AuthContext) -> AppResult<broadcast::Receiver<PositionUpdate>> {
        self.authz
            .require(self.authz.can_monitor_fleet(ctx), "stream positions", ctx)?;
        Ok(self.positions.subscribe())
    }

    // ---- Rutas ----

    pub async fn upsert_route(&self, ctx: &AuthContext, route: Route) -> AppResult<Route> {
        self.authz
            .require(self.authz.can_manage_routes(ctx), "manage routes", ctx)?;
        self.routes.upsert(route).await
    }

    pub async fn list_routes(&self) -> Vec<Route> {
        self.routes.list().await
    }

    // ---- Tablero ----

    pub async fn fleet_summary(&self, ctx: &AuthContext) -> AppResult<FleetSummary> {
        self.authz
            .require(self.authz.can_monitor_fleet(ctx), "view fleet summary", ctx)?;

        let now = self.clock.now();
        let today = now.date_naive();
        let trips = self.trips.list(&TripFilters::default()).await;
        let incidents = self.trips.incidents(&IncidentFilters::default()).await;
        let overdue = self.overdue_snapshot().await;
        let completed_today = |trip: &&Trip| {
            trip.status == TripStatus::Completed
                && trip.arrival_time.map_or(false, |arrival| arrival.date_naive() == today)
        };

        Ok(FleetSummary {
            programados: count_status(&trips, TripStatus::Scheduled),
            en_curso: count_status(&trips, TripStatus::InProgress),
            completados_hoy: trips.iter().filter(completed_today).count(),
            cancelados: count_status(&trips, TripStatus::Cancelled),
            atrasados: overdue.len(),
            conductores_activos: self
                .collect_active_positions(&LocationFilters::default())
                .await
                .len(),
            novedades_hoy: IncidentStats::compute(&incidents, now).hoy,
            pasajeros_hoy: trips
                .iter()
                .filter(completed_today)
                .filter_map(|trip| trip.passenger_count)
                .map(u64::from)
                .sum(),
            generado_en: now,
        })
    }

    pub async fn dashboard_snapshot(&self, ctx: &AuthContext) -> AppResult<DashboardSnapshot> {
        Ok(DashboardSnapshot {
            trayectos: self.list_trips(ctx, TripFilters::default()).await?,
            ubicaciones: self.active_positions(ctx, LocationFilters::default()).await?,
            novedades: self.incident_stats(ctx).await?,
            obtenido_en: self.clock.now(),
        })
    }

    async fn respond(&self, trip: &Trip) -> TripResponse {
        let route_name = self.routes.name_of(trip.route_id).await;
        TripResponse::from_trip(trip, route_name.as_deref(), self.clock.now())
    }

    async fn route_names(&self) -> HashMap<i64, String> {
        self.routes
            .snapshot()
            .await
            .into_iter()
            .map(|(id, route)| (id, route.name))
            .collect()
    }
}

fn count_status(trips: &[Trip], status: TripStatus) -> usize {
    trips.iter().filter(|trip| trip.status == status).count()
}

#[async_trait]
impl PositionSink for TrackingEngine {
    async fn submit(&self, report: PositionReport) -> AppResult<()> {
        self.ingest(report).await;
        Ok(())
    }
}

#[async_trait]
impl ActiveTripProbe for TrackingEngine {
    async fn has_active_trip(&self, driver_id: DriverId) -> AppResult<bool> {
        self.trips.has_active_trip(driver_id).await
    }
}

#[async_trait]
impl DashboardSource for TrackingEngine {
    async fn fetch_snapshot(&self) -> AppResult<DashboardSnapshot> {
        self.dashboard_snapshot(&AuthContext::dispatcher("dashboard")).await
    }
}

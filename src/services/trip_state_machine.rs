//! Máquina de estados de trayectos
//!
//! PROGRAMADO → EN_CURSO → COMPLETADO, con cancelación desde PROGRAMADO o
//! EN_CURSO. Las transiciones de un mismo trayecto se serializan con un
//! mutex por trayecto; trayectos distintos avanzan en paralelo. Un comando
//! inválido nunca modifica el trayecto.
//!
//! Un conductor tiene a lo sumo un trayecto EN_CURSO. `start`, `finish` y
//! `cancel` toman además el lock del conductor (siempre antes que el del
//! trayecto), así que el chequeo de unicidad y la limpieza del recorrido no
//! se cruzan con otro trayecto del mismo conductor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::incident::{Incident, IncidentFilters, IncidentType};
use crate::models::trip::{CreateTripRequest, DriverId, Trip, TripFilters, TripId, TripStatus};
use crate::services::animation_driver::AnimationDriver;
use crate::services::geolocation::{ActiveTripProbe, PositionRequester};
use crate::services::position_store::PositionStore;
use crate::utils::clock::{Clock, SharedClock};
use crate::utils::errors::{not_found_error, validation_error, AppError, AppResult};
use crate::utils::validation::{into_app_error, validate_max_length, validate_passenger_count, validate_positive_id};

const MAX_NOTES_LENGTH: usize = 1000;

pub struct TripStateMachine {
    trips: RwLock<HashMap<TripId, Arc<Mutex<Trip>>>>,
    incidents: RwLock<Vec<Incident>>,
    drivers: Mutex<HashMap<DriverId, Arc<Mutex<()>>>>,
    next_id: AtomicI64,
    positions: Arc<PositionStore>,
    animation: Option<Arc<AnimationDriver>>,
    requester: Arc<dyn PositionRequester>,
    clock: SharedClock,
}

impl TripStateMachine {
    pub fn new(
        positions: Arc<PositionStore>,
        requester: Arc<dyn PositionRequester>,
        clock: SharedClock,
    ) -> Self {
        Self {
            trips: RwLock::new(HashMap::new()),
            incidents: RwLock::new(Vec::new()),
            drivers: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            positions,
            animation: None,
            requester,
            clock,
        }
    }

    /// Marcadores a olvidar cuando un trayecto en curso termina
    pub fn with_animation(mut self, animation: Arc<AnimationDriver>) -> Self {
        self.animation = Some(animation);
        self
    }

    /// Programa un trayecto nuevo
    pub async fn create(&self, request: CreateTripRequest) -> AppResult<Trip> {
        validate_positive_id(request.route_id).map_err(|e| into_app_error("ruta_id", e))?;
        validate_positive_id(request.driver_id).map_err(|e| into_app_error("conductor_id", e))?;
        validate_positive_id(request.vehicle_id).map_err(|e| into_app_error("vehiculo_id", e))?;
        if request.estimated_duration_minutes == Some(0) {
            return Err(validation_error("duracion_estimada_minutos", "must be at least 1"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let trip = Trip {
            id,
            route_id: request.route_id,
            driver_id: request.driver_id,
            vehicle_id: request.vehicle_id,
            status: TripStatus::Scheduled,
            departure_time: None,
            arrival_time: None,
            estimated_duration_minutes: request.estimated_duration_minutes,
            passenger_count: None,
            actual_duration_minutes: None,
            driver_name: request.driver_name,
            vehicle_plate: request.vehicle_plate,
            created_at: self.clock.now(),
        };

        self.trips
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(trip.clone())));

        info!("🗓️ Trayecto {} programado (ruta {}, conductor {})", id, trip.route_id, trip.driver_id);
        Ok(trip)
    }

    pub async fn get(&self, trip_id: TripId) -> AppResult<Trip> {
        let slot = self.slot(trip_id).await?;
        let trip = slot.lock().await;
        Ok(trip.clone())
    }

    /// Lista ordenada por id
    pub async fn list(&self, filters: &TripFilters) -> Vec<Trip> {
        let mut trips = Vec::new();
        for slot in self.all_slots().await {
            let trip = slot.lock().await;
            if filters.matches(&trip) {
                trips.push(trip.clone());
            }
        }
        trips.sort_by_key(|trip| trip.id);
        trips
    }

    pub async fn in_progress(&self) -> Vec<Trip> {
        self.list(&TripFilters {
            status: Some(TripStatus::InProgress),
            ..Default::default()
        })
        .await
    }

    pub async fn in_progress_trip_for_driver(&self, driver_id: DriverId) -> Option<Trip> {
        self.list(&TripFilters {
            status: Some(TripStatus::InProgress),
            driver_id: Some(driver_id),
            route_id: None,
        })
        .await
        .into_iter()
        .next()
    }

    /// PROGRAMADO → EN_CURSO
    pub async fn start(&self, trip_id: TripId) -> AppResult<Trip> {
        let slot = self.slot(trip_id).await?;
        let driver_id = slot.lock().await.driver_id;
        let driver_lock = self.driver_lock(driver_id).await;
        let driver_guard = driver_lock.lock().await;

        if let Some(current) = self.in_progress_trip_for_driver(driver_id).await {
            if current.id != trip_id {
                return Err(AppError::InvalidTransition(format!(
                    "Driver {} already has trip {} in progress",
                    driver_id, current.id
                )));
            }
        }

        let started = {
            let mut trip = slot.lock().await;
            ensure_transition(&trip, TripStatus::InProgress)?;
            trip.status = TripStatus::InProgress;
            trip.departure_time = Some(self.clock.now());
            trip.clone()
        };

        // Un trayecto nuevo no hereda el recorrido anterior
        self.positions.clear_trail(driver_id).await;
        drop(driver_guard);

        if let Err(e) = self.requester.request_position(driver_id) {
            warn!(
                "📍 No se pudo pedir la ubicación inmediata al conductor {}: {}",
                driver_id, e
            );
        }

        info!("🚌 Trayecto {} iniciado por conductor {}", trip_id, driver_id);
        Ok(started)
    }

    /// EN_CURSO → COMPLETADO
    pub async fn finish(&self, trip_id: TripId, passenger_count: i64) -> AppResult<Trip> {
        let passenger_count = validate_passenger_count(passenger_count)
            .map_err(|e| into_app_error("cantidad_pasajeros", e))?;

        let slot = self.slot(trip_id).await?;
        let driver_id = slot.lock().await.driver_id;
        let driver_lock = self.driver_lock(driver_id).await;
        let _driver_guard = driver_lock.lock().await;

        let finished = {
            let mut trip = slot.lock().await;
            ensure_transition(&trip, TripStatus::Completed)?;
            let now = self.clock.now();
            trip.status = TripStatus::Completed;
            trip.arrival_time = Some(now);
            trip.passenger_count = Some(passenger_count);
            trip.actual_duration_minutes = trip
                .departure_time
                .map(|departure| (now - departure).num_minutes().max(0));
            trip.clone()
        };

        self.release_driver(driver_id).await;

        info!(
            "🏁 Trayecto {} finalizado con {} pasajeros ({} min)",
            trip_id,
            passenger_count,
            finished.actual_duration_minutes.unwrap_or_default()
        );
        Ok(finished)
    }

    /// PROGRAMADO | EN_CURSO → CANCELADO
    pub async fn cancel(&self, trip_id: TripId) -> AppResult<Trip> {
        let slot = self.slot(trip_id).await?;
        let driver_id = slot.lock().await.driver_id;
        let driver_lock = self.driver_lock(driver_id).await;
        let _driver_guard = driver_lock.lock().await;

        let (cancelled, was_in_progress) = {
            let mut trip = slot.lock().await;
            ensure_transition(&trip, TripStatus::Cancelled)?;
            let was_in_progress = trip.is_in_progress();
            trip.status = TripStatus::Cancelled;
            (trip.clone(), was_in_progress)
        };

        // Cancelar un trayecto programado no toca el que esté en curso
        if was_in_progress {
            self.release_driver(driver_id).await;
        }

        info!("❌ Trayecto {} cancelado", trip_id);
        Ok(cancelled)
    }

    /// Registra una novedad; no cambia el estado del trayecto
    pub async fn report_incident(
        &self,
        trip_id: TripId,
        incident_type: IncidentType,
        notes: Option<String>,
    ) -> AppResult<Incident> {
        if let Some(notes) = notes.as_deref() {
            validate_max_length(notes, MAX_NOTES_LENGTH).map_err(|e| into_app_error("notas", e))?;
        }
        let notes = notes.filter(|n| !n.trim().is_empty());

        let slot = self.slot(trip_id).await?;
        let incident = {
            // Se mantiene el lock para que el trayecto no cambie de estado
            // mientras se registra la novedad
            let trip = slot.lock().await;
            if !trip.is_in_progress() {
                return Err(AppError::InvalidState(format!(
                    "Incidents can only be reported on trips in progress (trip {} is {})",
                    trip_id, trip.status
                )));
            }

            let incident = Incident {
                id: Uuid::new_v4(),
                trip_id,
                driver_id: trip.driver_id,
                incident_type,
                notes,
                reported_at: self.clock.now(),
            };
            self.incidents.write().await.push(incident.clone());
            incident
        };

        info!(
            "⚠️ Novedad '{}' reportada en trayecto {}",
            incident.incident_type.as_str(),
            trip_id
        );
        Ok(incident)
    }

    /// Novedades en orden de reporte
    pub async fn incidents(&self, filters: &IncidentFilters) -> Vec<Incident> {
        self.incidents
            .read()
            .await
            .iter()
            .filter(|incident| filters.matches(incident))
            .cloned()
            .collect()
    }

    /// Elimina un trayecto que no esté en curso
    pub async fn delete(&self, trip_id: TripId) -> AppResult<Trip> {
        let slot = self.slot(trip_id).await?;
        let trip = slot.lock().await;
        if trip.is_in_progress() {
            return Err(AppError::InvalidState(format!(
                "Trip {} is in progress and cannot be deleted",
                trip_id
            )));
        }

        self.trips.write().await.remove(&trip_id);
        debug!("🗑️ Trayecto {} eliminado", trip_id);
        Ok(trip.clone())
    }

    /// Limpia recorrido y marcador; llamar con el lock del conductor tomado
    async fn release_driver(&self, driver_id: DriverId) {
        self.positions.clear_trail(driver_id).await;
        if let Some(animation) = &self.animation {
            animation.forget(driver_id);
        }
    }

    async fn driver_lock(&self, driver_id: DriverId) -> Arc<Mutex<()>> {
        Arc::clone(self.drivers.lock().await.entry(driver_id).or_default())
    }

    async fn slot(&self, trip_id: TripId) -> AppResult<Arc<Mutex<Trip>>> {
        self.trips
            .read()
            .await
            .get(&trip_id)
            .cloned()
            .ok_or_else(|| not_found_error("Trip", trip_id))
    }

    async fn all_slots(&self) -> Vec<Arc<Mutex<Trip>>> {
        self.trips.read().await.values().cloned().collect()
    }
}

fn ensure_transition(trip: &Trip, next: TripStatus) -> AppResult<()> {
    if trip.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "Trip {} cannot move from '{}' to '{}'",
            trip.id, trip.status, next
        )))
    }
}

#[async_trait]
impl ActiveTripProbe for TripStateMachine {
    async fn has_active_trip(&self, driver_id: DriverId) -> AppResult<bool> {
        Ok(self.in_progress_trip_for_driver(driver_id).await.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::position::PositionReport;
    use crate::services::geolocation::NoopPositionRequester;
    use crate::utils::clock::ManualClock;
    use crate::utils::geo::Coordinate;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    struct CountingRequester {
        calls: AtomicUsize,
        fail: bool,
    }

    impl PositionRequester for CountingRequester {
        fn request_position(&self, driver_id: DriverId) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(not_found_error("Geolocation tracker", driver_id))
            } else {
                Ok(())
            }
        }
    }

    fn machine_with(requester: Arc<dyn PositionRequester>) -> (Arc<TripStateMachine>, Arc<PositionStore>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
        let shared: SharedClock = Arc::new(clock.clone());
        let positions = Arc::new(PositionStore::new(500, Arc::clone(&shared)));
        let machine = Arc::new(TripStateMachine::new(Arc::clone(&positions), requester, shared));
        (machine, positions, clock)
    }

    fn machine() -> (Arc<TripStateMachine>, Arc<PositionStore>, ManualClock) {
        machine_with(Arc::new(NoopPositionRequester))
    }

    fn new_trip(driver_id: DriverId) -> CreateTripRequest {
        CreateTripRequest {
            route_id: 1,
            driver_id,
            vehicle_id: 10,
            estimated_duration_minutes: Some(60),
            driver_name: Some("Carlos".to_string()),
            vehicle_plate: Some("ABC123".to_string()),
        }
    }

    async fn ping(positions: &PositionStore, driver_id: DriverId, lat: f64) {
        positions
            .ingest(PositionReport {
                driver_id,
                coordinate: Coordinate::new(lat, -75.5),
                captured_at: Utc::now(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_timestamps_follow_state() {
        let (machine, _, clock) = machine();
        let trip = machine.create(new_trip(1)).await.unwrap();
        assert_eq!(trip.status, TripStatus::Scheduled);
        assert!(trip.departure_time.is_none() && trip.arrival_time.is_none());

        let started = machine.start(trip.id).await.unwrap();
        assert_eq!(started.status, TripStatus::InProgress);
        assert!(started.departure_time.is_some() && started.arrival_time.is_none());

        clock.advance(Duration::minutes(42));
        let finished = machine.finish(trip.id, 18).await.unwrap();
        assert_eq!(finished.status, TripStatus::Completed);
        assert!(finished.departure_time.is_some() && finished.arrival_time.is_some());
        assert_eq!(finished.passenger_count, Some(18));
        assert_eq!(finished.actual_duration_minutes, Some(42));
    }

    #[tokio::test]
    async fn test_finish_requires_in_progress() {
        let (machine, _, _) = machine();
        let trip = machine.create(new_trip(1)).await.unwrap();

        let err = machine.finish(trip.id, 3).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(machine.get(trip.id).await.unwrap(), trip);

        machine.cancel(trip.id).await.unwrap();
        let err = machine.finish(trip.id, 3).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(machine.get(trip.id).await.unwrap().status, TripStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_negative_passenger_count_never_mutates() {
        let (machine, _, _) = machine();
        let trip = machine.create(new_trip(1)).await.unwrap();
        let started = machine.start(trip.id).await.unwrap();

        let err = machine.finish(trip.id, -1).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(machine.get(trip.id).await.unwrap(), started);
    }

    #[tokio::test]
    async fn test_unknown_trip_is_not_found() {
        let (machine, _, _) = machine();
        assert!(matches!(machine.start(404).await, Err(AppError::NotFound(_))));
        assert!(matches!(machine.cancel(404).await, Err(AppError::NotFound(_))));
        assert!(matches!(machine.finish(404, 1).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_start_has_single_winner() {
        let (machine, _, _) = machine();
        let trip = machine.create(new_trip(1)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let machine = Arc::clone(&machine);
            handles.push(tokio::spawn(async move { machine.start(trip.id).await }));
        }

        let mut winners = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AppError::InvalidTransition(_)) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(rejected, 15);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_everything() {
        let (machine, _, _) = machine();
        let trip = machine.create(new_trip(1)).await.unwrap();
        machine.start(trip.id).await.unwrap();
        machine.finish(trip.id, 0).await.unwrap();

        assert!(matches!(machine.start(trip.id).await, Err(AppError::InvalidTransition(_))));
        assert!(matches!(machine.cancel(trip.id).await, Err(AppError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_cancel_keeps_arrival_unset_and_clears_trail() {
        let (machine, positions, _) = machine();
        let trip = machine.create(new_trip(5)).await.unwrap();
        machine.start(trip.id).await.unwrap();
        ping(&positions, 5, 5.0).await;
        ping(&positions, 5, 5.1).await;

        let cancelled = machine.cancel(trip.id).await.unwrap();
        assert_eq!(cancelled.status, TripStatus::Cancelled);
        assert!(cancelled.arrival_time.is_none());
        assert!(positions.trail(5).await.is_empty());
    }

    #[tokio::test]
    async fn test_finish_without_positions_and_trail_reset_on_start() {
        let (machine, positions, _) = machine();
        let first = machine.create(new_trip(2)).await.unwrap();
        machine.start(first.id).await.unwrap();
        machine.finish(first.id, 4).await.unwrap();

        ping(&positions, 2, 5.0).await;
        let second = machine.create(new_trip(2)).await.unwrap();
        machine.start(second.id).await.unwrap();
        assert!(positions.trail(2).await.is_empty());

        ping(&positions, 2, 5.2).await;
        machine.finish(second.id, 1).await.unwrap();
        assert!(positions.trail(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_start_requests_position_best_effort() {
        let requester = Arc::new(CountingRequester {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let (machine, _, _) = machine_with(requester.clone());
        let trip = machine.create(new_trip(3)).await.unwrap();

        let started = machine.start(trip.id).await.unwrap();
        assert_eq!(started.status, TripStatus::InProgress);
        assert_eq!(requester.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_incidents_only_while_in_progress() {
        let (machine, _, _) = machine();
        let trip = machine.create(new_trip(4)).await.unwrap();

        let err = machine
            .report_incident(trip.id, IncidentType::Traffic, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        machine.start(trip.id).await.unwrap();
        let incident = machine
            .report_incident(trip.id, IncidentType::MechanicalFailure, Some("Llanta pinchada".into()))
            .await
            .unwrap();
        assert_eq!(incident.driver_id, 4);
        assert_eq!(machine.get(trip.id).await.unwrap().status, TripStatus::InProgress);

        let listed = machine
            .incidents(&IncidentFilters {
                trayecto_id: Some(trip.id),
                conductor_id: None,
            })
            .await;
        assert_eq!(listed, vec![incident]);
    }

    #[tokio::test]
    async fn test_long_notes_are_rejected() {
        let (machine, _, _) = machine();
        let trip = machine.create(new_trip(4)).await.unwrap();
        machine.start(trip.id).await.unwrap();

        let err = machine
            .report_incident(trip.id, IncidentType::Other, Some("x".repeat(1001)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(machine.incidents(&IncidentFilters::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_rules_and_listing() {
        let (machine, _, _) = machine();
        let a = machine.create(new_trip(1)).await.unwrap();
        let b = machine.create(new_trip(2)).await.unwrap();
        machine.start(b.id).await.unwrap();

        assert!(matches!(machine.delete(b.id).await, Err(AppError::InvalidState(_))));
        machine.delete(a.id).await.unwrap();
        assert!(matches!(machine.get(a.id).await, Err(AppError::NotFound(_))));

        let all = machine.list(&TripFilters::default()).await;
        assert_eq!(all.len(), 1);
        assert_eq!(machine.in_progress_trip_for_driver(2).await.map(|t| t.id), Some(b.id));
        assert!(machine.has_active_trip(2).await.unwrap());
        assert!(!machine.has_active_trip(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_validates_ids() {
        let (machine, _, _) = machine();
        let mut request = new_trip(1);
        request.vehicle_id = 0;
        assert!(matches!(machine.create(request).await, Err(AppError::Validation(_))));

        let mut request = new_trip(1);
        request.estimated_duration_minutes = Some(0);
        assert!(matches!(machine.create(request).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_second_start_for_same_driver_is_rejected() {
        let (machine, positions, _) = machine();
        let running = machine.create(new_trip(9)).await.unwrap();
        let queued = machine.create(new_trip(9)).await.unwrap();
        machine.start(running.id).await.unwrap();
        ping(&positions, 9, 5.0).await;

        let err = machine.start(queued.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(machine.get(queued.id).await.unwrap().status, TripStatus::Scheduled);
        assert_eq!(positions.trail(9).await.len(), 1);
        assert_eq!(machine.in_progress_trip_for_driver(9).await.unwrap().id, running.id);

        machine.finish(running.id, 2).await.unwrap();
        machine.start(queued.id).await.unwrap();
        assert_eq!(machine.in_progress_trip_for_driver(9).await.unwrap().id, queued.id);
    }
}

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;

use trip_tracking::config::TrackingConfig;
use trip_tracking::models::auth::AuthContext;
use trip_tracking::models::incident::{CreateIncidentRequest, IncidentType};
use trip_tracking::models::position::{LocationFilters, LocationUpdateRequest, PositionReport};
use trip_tracking::models::route::Route;
use trip_tracking::models::trip::{CreateTripRequest, TripFilters, TripId, TripStatus};
use trip_tracking::services::geolocation::{
    GeoSample, GeolocationError, GeolocationProvider, GeolocationState, GeolocationTracker,
    SampleStream, WatchOptions,
};
use trip_tracking::services::progress_estimator::DurationSource;
use trip_tracking::services::tracking_engine::TrackingEngine;
use trip_tracking::utils::clock::ManualClock;
use trip_tracking::utils::errors::AppError;
use trip_tracking::utils::geo::Coordinate;

fn nine_am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

fn engine_with(config: TrackingConfig) -> (Arc<TrackingEngine>, ManualClock) {
    let clock = ManualClock::new(nine_am());
    let engine = TrackingEngine::new(config, Arc::new(clock.clone()));
    (Arc::new(engine), clock)
}

fn engine() -> (Arc<TrackingEngine>, ManualClock) {
    engine_with(TrackingConfig::default())
}

fn admin() -> AuthContext {
    AuthContext::dispatcher("admin")
}

fn trip_request(driver_id: i64, minutes: Option<u32>) -> CreateTripRequest {
    CreateTripRequest {
        route_id: 1,
        driver_id,
        vehicle_id: 5,
        estimated_duration_minutes: minutes,
        driver_name: Some("Carlos Ruiz".to_string()),
        vehicle_plate: Some("XYZ987".to_string()),
    }
}

async fn started_trip(engine: &TrackingEngine, driver_id: i64, minutes: Option<u32>) -> TripId {
    let trip = engine.create_trip(&admin(), trip_request(driver_id, minutes)).await.unwrap();
    engine.start_trip(&admin(), trip.id).await.unwrap();
    trip.id
}

#[tokio::test]
async fn test_finish_only_from_in_progress() {
    let (engine, _) = engine();
    let trip = engine.create_trip(&admin(), trip_request(1, Some(60))).await.unwrap();

    let err = engine.finish_trip(&admin(), trip.id, 3).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    let unchanged = engine.get_trip(&admin(), trip.id).await.unwrap();
    assert_eq!(unchanged.estado, TripStatus::Scheduled);
    assert_eq!(unchanged.cantidad_pasajeros, None);

    engine.cancel_trip(&admin(), trip.id).await.unwrap();
    let err = engine.finish_trip(&admin(), trip.id, 3).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    assert_eq!(
        engine.get_trip(&admin(), trip.id).await.unwrap().estado,
        TripStatus::Cancelled
    );
}

#[tokio::test]
async fn test_timestamps_follow_status() {
    let (engine, clock) = engine();
    let trip = engine.create_trip(&admin(), trip_request(1, Some(60))).await.unwrap();
    assert!(trip.fecha_salida.is_none() && trip.fecha_llegada.is_none());

    let started = engine.start_trip(&admin(), trip.id).await.unwrap();
    assert_eq!(started.fecha_salida, Some(nine_am()));
    assert!(started.fecha_llegada.is_none());

    clock.advance(Duration::minutes(42));
    let finished = engine.finish_trip(&admin(), trip.id, 18).await.unwrap();
    assert_eq!(finished.fecha_salida, Some(nine_am()));
    assert_eq!(finished.fecha_llegada, Some(nine_am() + Duration::minutes(42)));
    assert_eq!(finished.duracion_minutos, Some(42));
    assert_eq!(finished.cantidad_pasajeros, Some(18));
}

#[tokio::test]
async fn test_concurrent_start_transitions_once() {
    let (engine, _) = engine();
    let trip = engine.create_trip(&admin(), trip_request(1, Some(60))).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.start_trip(&admin(), trip.id).await })
        })
        .collect();

    let mut started = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => started += 1,
            Err(AppError::InvalidTransition(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(rejected, 7);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_saturates() {
    let (engine, clock) = engine();
    let trip_id = started_trip(&engine, 1, Some(40)).await;

    let mut previous = -1.0;
    for _ in 0..12 {
        let progress = engine.progress(&admin(), trip_id).await.unwrap();
        assert!(progress.progress_percent >= previous);
        assert!(progress.progress_percent <= 100.0);
        previous = progress.progress_percent;
        clock.advance(Duration::minutes(5));
    }
    assert_eq!(previous, 100.0);
}

#[tokio::test]
async fn test_overdue_boundary() {
    let (engine, clock) = engine();
    let trip_id = started_trip(&engine, 1, Some(30)).await;

    clock.set(nine_am() + Duration::minutes(30) - Duration::seconds(1));
    assert!(!engine.progress(&admin(), trip_id).await.unwrap().is_overdue);
    assert!(engine.overdue_trips(&admin()).await.unwrap().is_empty());

    clock.set(nine_am() + Duration::minutes(30) + Duration::seconds(1));
    assert!(engine.progress(&admin(), trip_id).await.unwrap().is_overdue);
    assert_eq!(engine.overdue_trips(&admin()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_nine_am_scenario() {
    let (engine, clock) = engine();
    let trip_id = started_trip(&engine, 1, Some(60)).await;

    clock.set(nine_am() + Duration::minutes(45));
    let progress = engine.progress(&admin(), trip_id).await.unwrap();
    assert!((progress.progress_percent - 75.0).abs() < 1e-9);
    assert!(!progress.is_overdue);

    clock.set(nine_am() + Duration::minutes(65));
    let progress = engine.progress(&admin(), trip_id).await.unwrap();
    assert_eq!(progress.progress_percent, 100.0);
    assert!(progress.is_overdue);

    let overdue = engine.overdue_trips(&admin()).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert!((overdue[0].overrun_minutes - 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_duration_falls_back_to_route_then_default() {
    let (engine, _) = engine();
    let without_route = started_trip(&engine, 1, None).await;
    let progress = engine.progress(&admin(), without_route).await.unwrap();
    assert_eq!(progress.estimated_duration_minutes, 60);
    assert_eq!(progress.duration_source, DurationSource::Default);

    engine
        .upsert_route(
            &admin(),
            Route {
                id: 1,
                name: "Terminal - Cable".to_string(),
                origin: "Terminal".to_string(),
                destination: "Cable".to_string(),
                distance_km: 6.2,
                estimated_time_minutes: Some(25),
                active: true,
            },
        )
        .await
        .unwrap();
    let progress = engine.progress(&admin(), without_route).await.unwrap();
    assert_eq!(progress.estimated_duration_minutes, 25);
    assert_eq!(progress.duration_source, DurationSource::Route);

    let with_estimate = started_trip(&engine, 2, Some(50)).await;
    let progress = engine.progress(&admin(), with_estimate).await.unwrap();
    assert_eq!(progress.estimated_duration_minutes, 50);
    assert_eq!(progress.duration_source, DurationSource::Trip);
}

#[tokio::test]
async fn test_trail_is_bounded_and_ends_with_latest() {
    let config = TrackingConfig {
        trail_capacity: 5,
        ..TrackingConfig::default()
    };
    let (engine, clock) = engine_with(config);
    started_trip(&engine, 9, Some(60)).await;

    let mut last = None;
    for i in 0..8 {
        clock.advance(Duration::seconds(5));
        let request = LocationUpdateRequest {
            conductor_id: 9,
            lat: 5.0 + i as f64 * 0.001,
            lng: -75.5,
            timestamp: None,
        };
        last = Some((request.lat, request.lng));
        engine.ingest_location(&AuthContext::driver(9), request).await.unwrap();
    }

    let trail = engine.trail(&admin(), 9).await.unwrap();
    assert_eq!(trail.len(), 5);
    let tail = trail.last().unwrap();
    assert_eq!(Some((tail.lat, tail.lng)), last);
}

#[tokio::test]
async fn test_invalid_coordinates_are_rejected() {
    let (engine, _) = engine();
    let err = engine
        .ingest_location(
            &AuthContext::driver(3),
            LocationUpdateRequest {
                conductor_id: 3,
                lat: 91.0,
                lng: -75.5,
                timestamp: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(engine.positions().current_position(3).await.is_none());
}

#[tokio::test]
async fn test_active_positions_only_for_trips_in_progress() {
    let (engine, _) = engine();
    started_trip(&engine, 1, Some(60)).await;
    engine.create_trip(&admin(), trip_request(2, Some(60))).await.unwrap();

    for driver_id in [1, 2] {
        engine
            .ingest(PositionReport {
                driver_id,
                coordinate: Coordinate::new(5.06, -75.5),
                captured_at: nine_am(),
            })
            .await;
    }

    let active = engine
        .active_positions(&admin(), LocationFilters::default())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].conductor_id, 1);
    assert_eq!(active[0].nombre_conductor.as_deref(), Some("Carlos Ruiz"));

    let filtered = engine
        .active_positions(&admin(), LocationFilters { ruta_id: Some(99) })
        .await
        .unwrap();
    assert!(filtered.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_displayed_marker_midpoint_and_convergence() {
    let (engine, _) = engine();
    let a = Coordinate::new(5.07, -75.51);
    let b = Coordinate::new(5.08, -75.52);

    let report = |coordinate| PositionReport {
        driver_id: 4,
        coordinate,
        captured_at: nine_am(),
    };

    engine.ingest(report(a)).await;
    assert_eq!(engine.displayed_position(4), Some(a));

    tokio::time::advance(StdDuration::from_secs(3)).await;
    engine.ingest(report(b)).await;
    tokio::time::advance(StdDuration::from_millis(1500)).await;

    let shown = engine.displayed_position(4).unwrap();
    let midpoint = a.great_circle_point(&b, 0.5);
    assert!(shown.distance_km(&midpoint) < 0.01);
    assert!(shown.distance_km(&a) > 0.3 && shown.distance_km(&b) > 0.3);

    tokio::time::advance(StdDuration::from_secs(5)).await;
    assert_eq!(engine.displayed_position(4), Some(b));
}

#[tokio::test]
async fn test_incident_rules() {
    let (engine, _) = engine();
    let scheduled = engine.create_trip(&admin(), trip_request(6, Some(60))).await.unwrap();

    let request = |trip_id, conductor_id| CreateIncidentRequest {
        trayecto_id: trip_id,
        tipo: IncidentType::MechanicalFailure,
        notas: Some("Pinchazo".to_string()),
        conductor_id,
    };

    let err = engine
        .report_incident(&AuthContext::driver(6), request(scheduled.id, 6))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    engine.start_trip(&admin(), scheduled.id).await.unwrap();

    let err = engine
        .report_incident(&admin(), request(scheduled.id, 99))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = engine
        .report_incident(&AuthContext::driver(7), request(scheduled.id, 6))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let incident = engine
        .report_incident(&AuthContext::driver(6), request(scheduled.id, 6))
        .await
        .unwrap();
    assert_eq!(incident.tipo, IncidentType::MechanicalFailure);
    assert_eq!(
        engine.get_trip(&admin(), scheduled.id).await.unwrap().estado,
        TripStatus::InProgress
    );

    let stats = engine.incident_stats(&admin()).await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.por_tipo.get("Avería Mecánica"), Some(&1));
}

#[tokio::test]
async fn test_fleet_summary_counts() {
    let (engine, clock) = engine();
    let done = started_trip(&engine, 1, Some(30)).await;
    started_trip(&engine, 2, Some(30)).await;
    let cancelled = engine.create_trip(&admin(), trip_request(3, None)).await.unwrap();
    engine.create_trip(&admin(), trip_request(4, None)).await.unwrap();
    engine.cancel_trip(&admin(), cancelled.id).await.unwrap();

    clock.advance(Duration::minutes(40));
    engine.finish_trip(&admin(), done, 21).await.unwrap();

    let summary = engine.fleet_summary(&admin()).await.unwrap();
    assert_eq!(summary.programados, 1);
    assert_eq!(summary.en_curso, 1);
    assert_eq!(summary.completados_hoy, 1);
    assert_eq!(summary.cancelados, 1);
    assert_eq!(summary.atrasados, 1);
    assert_eq!(summary.pasajeros_hoy, 21);

    let err = engine.fleet_summary(&AuthContext::driver(1)).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

/// Dispositivo que nunca emite por suscripción pero responde lecturas puntuales
struct StillDevice {
    coordinate: Coordinate,
    _keep_open: std::sync::Mutex<Option<mpsc::Sender<Result<GeoSample, GeolocationError>>>>,
}

#[async_trait]
impl GeolocationProvider for StillDevice {
    fn is_supported(&self) -> bool {
        true
    }

    async fn watch_position(&self, _options: WatchOptions) -> Result<SampleStream, GeolocationError> {
        let (tx, rx) = mpsc::channel(4);
        if let Ok(mut slot) = self._keep_open.lock() {
            *slot = Some(tx);
        }
        Ok(rx)
    }

    async fn current_position(&self, _options: WatchOptions) -> Result<GeoSample, GeolocationError> {
        Ok(GeoSample {
            coordinate: self.coordinate,
            captured_at: Utc::now(),
            accuracy_meters: Some(8.0),
        })
    }
}

#[tokio::test]
async fn test_start_requests_immediate_position_from_tracker() {
    let (engine, _) = engine();
    let device = Arc::new(StillDevice {
        coordinate: Coordinate::new(5.068, -75.517),
        _keep_open: std::sync::Mutex::new(None),
    });

    let tracker = GeolocationTracker::start(
        11,
        device,
        engine.clone(),
        engine.clone(),
        engine.config(),
    )
    .await;
    engine.trackers().register(&tracker);
    assert!(engine.positions().current_position(11).await.is_none());

    started_trip(&engine, 11, Some(60)).await;

    let stored = tokio::time::timeout(StdDuration::from_secs(2), async {
        loop {
            if let Some(position) = engine.positions().current_position(11).await {
                return position;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    })
    .await
    .expect("tracker should report right after start");

    assert_eq!(stored.coordinate, Coordinate::new(5.068, -75.517));
    assert_eq!(tracker.state(), GeolocationState::Active);

    tracker.stop();
    engine.trackers().unregister(11);
    assert!(!tracker.is_running());
}

#[tokio::test]
async fn test_driver_keeps_a_single_trip_in_progress() {
    let (engine, _) = engine();
    let first = started_trip(&engine, 7, Some(60)).await;
    let second = engine.create_trip(&admin(), trip_request(7, Some(60))).await.unwrap();

    let err = engine.start_trip(&admin(), second.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    assert_eq!(
        engine.get_trip(&admin(), second.id).await.unwrap().estado,
        TripStatus::Scheduled
    );

    for lat in [5.06, 5.07, 5.08] {
        engine
            .ingest(PositionReport {
                driver_id: 7,
                coordinate: Coordinate::new(lat, -75.5),
                captured_at: nine_am(),
            })
            .await;
    }

    let active = engine
        .active_positions(&admin(), LocationFilters::default())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].trayecto_id, first);

    // Cancelar el programado no toca el recorrido ni el marcador del que está en curso
    let spare = engine.create_trip(&admin(), trip_request(7, Some(60))).await.unwrap();
    engine.cancel_trip(&admin(), spare.id).await.unwrap();
    assert_eq!(engine.positions().trail(7).await.len(), 3);
    assert!(engine.displayed_position(7).is_some());

    engine.finish_trip(&admin(), first, 12).await.unwrap();
    assert!(engine.positions().trail(7).await.is_empty());
    assert!(engine.displayed_position(7).is_none());

    engine.start_trip(&admin(), second.id).await.unwrap();
    engine
        .ingest(PositionReport {
            driver_id: 7,
            coordinate: Coordinate::new(5.09, -75.5),
            captured_at: nine_am(),
        })
        .await;
    assert_eq!(engine.positions().trail(7).await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_starts_for_one_driver_have_single_winner() {
    let (engine, _) = engine();
    let mut trip_ids = Vec::new();
    for _ in 0..6 {
        trip_ids.push(engine.create_trip(&admin(), trip_request(3, Some(60))).await.unwrap().id);
    }

    let handles: Vec<_> = trip_ids
        .iter()
        .map(|&trip_id| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.start_trip(&admin(), trip_id).await })
        })
        .collect();

    let mut started = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => started += 1,
            Err(AppError::InvalidTransition(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(started, 1);

    let in_progress = engine
        .list_trips(&admin(), TripFilters {
            status: Some(TripStatus::InProgress),
            driver_id: Some(3),
            route_id: None,
        })
        .await
        .unwrap();
    assert_eq!(in_progress.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_marker_follows_last_stored_position() {
    let (engine, _) = engine();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .ingest(PositionReport {
                        driver_id: 12,
                        coordinate: Coordinate::new(5.0 + f64::from(i) * 0.001, -75.5),
                        captured_at: nine_am(),
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    tokio::time::advance(StdDuration::from_secs(6)).await;
    let latest = engine.positions().current_position(12).await.unwrap();
    assert_eq!(engine.displayed_position(12), Some(latest.coordinate));
}

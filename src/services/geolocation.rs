//! Captura de geolocalización del lado del conductor
//!
//! El tracker se suscribe al flujo continuo del dispositivo y, en paralelo,
//! pide una lectura puntual cada 10 s por si la suscripción se queda muda.
//! Ambos caminos terminan en el mismo envío, que solo ocurre si el conductor
//! tiene un trayecto en curso en el momento del envío.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TrackingConfig;
use crate::models::position::PositionReport;
use crate::models::trip::DriverId;
use crate::utils::errors::{not_found_error, AppError, AppResult};
use crate::utils::geo::Coordinate;

/// Estado visible del tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeolocationState {
    Pending,
    Active,
    Denied,
    Unsupported,
}

impl GeolocationState {
    /// DENIED y UNSUPPORTED detienen la captura
    pub fn is_stopped(&self) -> bool {
        matches!(self, GeolocationState::Denied | GeolocationState::Unsupported)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    #[error("Geolocation permission denied")]
    PermissionDenied,

    #[error("Geolocation is not supported on this device")]
    Unsupported,

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Geolocation request timed out")]
    Timeout,
}

impl GeolocationError {
    fn is_fatal(&self) -> bool {
        matches!(self, GeolocationError::PermissionDenied | GeolocationError::Unsupported)
    }
}

impl From<GeolocationError> for AppError {
    fn from(error: GeolocationError) -> Self {
        match error {
            GeolocationError::PermissionDenied => AppError::PermissionDenied(error.to_string()),
            GeolocationError::Unsupported => AppError::Unsupported(error.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Una lectura del dispositivo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoSample {
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
    pub accuracy_meters: Option<f64>,
}

/// Preferencias de la suscripción
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub maximum_age: Duration,
    pub timeout: Duration,
}

impl WatchOptions {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            high_accuracy: config.geolocation_high_accuracy,
            maximum_age: config.geolocation_max_age(),
            timeout: config.geolocation_fallback(),
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}

pub type SampleStream = mpsc::Receiver<Result<GeoSample, GeolocationError>>;

/// Acceso a la geolocalización de la plataforma
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Suscripción continua; cada elemento es una lectura o un error
    async fn watch_position(&self, options: WatchOptions) -> Result<SampleStream, GeolocationError>;

    /// Lectura puntual
    async fn current_position(&self, options: WatchOptions) -> Result<GeoSample, GeolocationError>;
}

/// ¿Tiene el conductor un trayecto en curso?
#[async_trait]
pub trait ActiveTripProbe: Send + Sync {
    async fn has_active_trip(&self, driver_id: DriverId) -> AppResult<bool>;
}

/// Destino de las muestras (motor local o backend remoto)
#[async_trait]
pub trait PositionSink: Send + Sync {
    async fn submit(&self, report: PositionReport) -> AppResult<()>;
}

/// Pide al dispositivo de un conductor una lectura inmediata
pub trait PositionRequester: Send + Sync {
    fn request_position(&self, driver_id: DriverId) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPositionRequester;

impl PositionRequester for NoopPositionRequester {
    fn request_position(&self, _driver_id: DriverId) -> AppResult<()> {
        Ok(())
    }
}

/// Registro de trackers activos por conductor
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    triggers: RwLock<HashMap<DriverId, Arc<Notify>>>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tracker: &GeolocationTracker) {
        if let Ok(mut triggers) = self.triggers.write() {
            triggers.insert(tracker.driver_id(), tracker.trigger());
        }
    }

    pub fn unregister(&self, driver_id: DriverId) {
        if let Ok(mut triggers) = self.triggers.write() {
            triggers.remove(&driver_id);
        }
    }

    pub fn is_registered(&self, driver_id: DriverId) -> bool {
        self.triggers
            .read()
            .map(|triggers| triggers.contains_key(&driver_id))
            .unwrap_or(false)
    }
}

impl PositionRequester for TrackerRegistry {
    fn request_position(&self, driver_id: DriverId) -> AppResult<()> {
        let trigger = self
            .triggers
            .read()
            .map_err(|_| AppError::Internal("tracker registry lock poisoned".to_string()))?
            .get(&driver_id)
            .cloned()
            .ok_or_else(|| not_found_error("Geolocation tracker", driver_id))?;
        trigger.notify_one();
        Ok(())
    }
}

/// Camino común de la suscripción y del temporizador de respaldo
struct Forwarder {
    driver_id: DriverId,
    probe: Arc<dyn ActiveTripProbe>,
    sink: Arc<dyn PositionSink>,
    state: Arc<watch::Sender<GeolocationState>>,
}

impl Forwarder {
    fn is_stopped(&self) -> bool {
        self.state.borrow().is_stopped()
    }

    /// Devuelve `false` cuando la captura debe detenerse
    async fn handle(&self, result: Result<GeoSample, GeolocationError>) -> bool {
        match result {
            Ok(sample) => {
                self.mark_active();
                self.forward(sample).await;
                true
            }
            Err(error) if error.is_fatal() => {
                let next = match error {
                    GeolocationError::PermissionDenied => GeolocationState::Denied,
                    _ => GeolocationState::Unsupported,
                };
                self.state.send_replace(next);
                warn!("🚫 Geolocalización del conductor {}: {}", self.driver_id, error);
                false
            }
            Err(error) => {
                debug!("⚠️ Lectura fallida para conductor {}: {}", self.driver_id, error);
                true
            }
        }
    }

    fn mark_active(&self) {
        let activated = self.state.send_if_modified(|state| {
            if *state == GeolocationState::Pending {
                *state = GeolocationState::Active;
                true
            } else {
                false
            }
        });
        if activated {
            info!("🛰️ Geolocalización activa para conductor {}", self.driver_id);
        }
    }

    async fn forward(&self, sample: GeoSample) {
        // El trayecto se consulta al momento del envío
        match self.probe.has_active_trip(self.driver_id).await {
            Ok(true) => {
                let report = PositionReport {
                    driver_id: self.driver_id,
                    coordinate: sample.coordinate,
                    captured_at: sample.captured_at,
                };
                if let Err(e) = self.sink.submit(report).await {
                    warn!("📡 Muestra descartada para conductor {}: {}", self.driver_id, e);
                }
            }
            Ok(false) => {
                debug!("⏸️ Conductor {} sin trayecto en curso, muestra ignorada", self.driver_id);
            }
            Err(e) => {
                warn!("⚠️ No se pudo verificar el trayecto del conductor {}: {}", self.driver_id, e);
            }
        }
    }
}

/// Tracker de un conductor: suscripción continua + respaldo periódico
pub struct GeolocationTracker {
    driver_id: DriverId,
    state: Arc<watch::Sender<GeolocationState>>,
    trigger: Arc<Notify>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GeolocationTracker {
    pub async fn start(
        driver_id: DriverId,
        provider: Arc<dyn GeolocationProvider>,
        probe: Arc<dyn ActiveTripProbe>,
        sink: Arc<dyn PositionSink>,
        config: &TrackingConfig,
    ) -> Self {
        let (state, _) = watch::channel(GeolocationState::Pending);
        let tracker = Self {
            driver_id,
            state: Arc::new(state),
            trigger: Arc::new(Notify::new()),
            tasks: Mutex::new(Vec::new()),
        };

        if !provider.is_supported() {
            tracker.state.send_replace(GeolocationState::Unsupported);
            warn!("🚫 Dispositivo del conductor {} sin geolocalización", driver_id);
            return tracker;
        }

        let options = WatchOptions::from_config(config);
        let forwarder = Arc::new(Forwarder {
            driver_id,
            probe,
            sink,
            state: Arc::clone(&tracker.state),
        });

        let mut tasks = Vec::with_capacity(2);
        match provider.watch_position(options).await {
            Ok(stream) => {
                tasks.push(tokio::spawn(subscription_loop(Arc::clone(&forwarder), stream)));
            }
            Err(error) => {
                if !forwarder.handle(Err(error)).await {
                    return tracker;
                }
            }
        }

        tasks.push(tokio::spawn(fallback_loop(
            forwarder,
            provider,
            Arc::clone(&tracker.trigger),
            options,
            config.geolocation_fallback(),
        )));

        if let Ok(mut slot) = tracker.tasks.lock() {
            *slot = tasks;
        }

        info!("📡 Tracker iniciado para conductor {}", driver_id);
        tracker
    }

    pub fn driver_id(&self) -> DriverId {
        self.driver_id
    }

    pub fn state(&self) -> GeolocationState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<GeolocationState> {
        self.state.subscribe()
    }

    /// Lectura puntual inmediata por el camino de respaldo
    pub fn request_now(&self) {
        self.trigger.notify_one();
    }

    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .map(|tasks| tasks.iter().any(|task| !task.is_finished()))
            .unwrap_or(false)
    }

    /// Detiene la suscripción y el temporizador juntos
    pub fn stop(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if tasks.is_empty() {
                return;
            }
            for task in tasks.drain(..) {
                task.abort();
            }
            info!("🛑 Tracker detenido para conductor {}", self.driver_id);
        }
    }
}

impl Drop for GeolocationTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn subscription_loop(forwarder: Arc<Forwarder>, mut stream: SampleStream) {
    while let Some(result) = stream.recv().await {
        if forwarder.is_stopped() || !forwarder.handle(result).await {
            break;
        }
    }
    debug!("🔌 Suscripción terminada para conductor {}", forwarder.driver_id);
}

async fn fallback_loop(
    forwarder: Arc<Forwarder>,
    provider: Arc<dyn GeolocationProvider>,
    trigger: Arc<Notify>,
    options: WatchOptions,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = trigger.notified() => {
                debug!("📍 Lectura inmediata solicitada para conductor {}", forwarder.driver_id);
            }
        }

        if forwarder.is_stopped() {
            break;
        }
        let result = provider.current_position(options).await;
        if !forwarder.handle(result).await {
            break;
        }
    }
}

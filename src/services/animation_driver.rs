//! Driver de animación por conductor
//!
//! Cada reporte nuevo aborta la tarea de animación del conductor (si la hay)
//! y lanza otra que publica la posición mostrada cuadro a cuadro por un
//! canal `watch`. Las animaciones nunca se encolan.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::TrackingConfig;
use crate::models::trip::DriverId;
use crate::services::interpolation::{Animation, MarkerAnimator};
use crate::utils::geo::Coordinate;

struct Marker {
    animator: MarkerAnimator,
    display: Arc<watch::Sender<Option<Coordinate>>>,
    task: Option<JoinHandle<()>>,
}

pub struct AnimationDriver {
    window: Duration,
    frame: Duration,
    markers: Mutex<HashMap<DriverId, Marker>>,
}

impl AnimationDriver {
    pub fn new(window: Duration, frame: Duration) -> Self {
        Self {
            window,
            frame,
            markers: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::new(config.animation_window(), config.animation_frame())
    }

    /// Aplica un reporte nuevo. Debe llamarse dentro del runtime de tokio.
    pub fn on_report(&self, driver_id: DriverId, target: Coordinate) {
        let now = Instant::now();
        let Ok(mut markers) = self.markers.lock() else {
            warn!("⚠️ Estado de animación inaccesible para conductor {}", driver_id);
            return;
        };

        let window = self.window;
        let marker = markers.entry(driver_id).or_insert_with(|| Marker {
            animator: MarkerAnimator::new(window),
            display: Arc::new(watch::channel(None).0),
            task: None,
        });

        if let Some(task) = marker.task.take() {
            task.abort();
        }

        match marker.animator.on_report(target, now) {
            Some(animation) => {
                debug!(
                    "🎞️ Animando conductor {} hacia {} en {:?}",
                    driver_id, target, animation.window
                );
                marker.display.send_replace(Some(animation.from));
                marker.task = Some(tokio::spawn(run_animation(
                    animation,
                    self.frame,
                    Arc::clone(&marker.display),
                )));
            }
            None => {
                marker.display.send_replace(Some(target));
            }
        }
    }

    /// Posición mostrada evaluada ahora
    pub fn displayed_position(&self, driver_id: DriverId) -> Option<Coordinate> {
        let now = Instant::now();
        let markers = self.markers.lock().ok()?;
        markers.get(&driver_id)?.animator.displayed_at(now)
    }

    /// Canal con la posición publicada por la tarea del conductor
    pub fn watch(&self, driver_id: DriverId) -> Option<watch::Receiver<Option<Coordinate>>> {
        let markers = self.markers.lock().ok()?;
        markers.get(&driver_id).map(|marker| marker.display.subscribe())
    }

    pub fn is_animating(&self, driver_id: DriverId) -> bool {
        self.markers
            .lock()
            .ok()
            .and_then(|markers| {
                markers
                    .get(&driver_id)
                    .and_then(|marker| marker.task.as_ref().map(|task| !task.is_finished()))
            })
            .unwrap_or(false)
    }

    /// Olvida el marcador (fin del trayecto)
    pub fn forget(&self, driver_id: DriverId) {
        if let Ok(mut markers) = self.markers.lock() {
            if let Some(mut marker) = markers.remove(&driver_id) {
                if let Some(task) = marker.task.take() {
                    task.abort();
                }
            }
        }
    }

    pub fn shutdown(&self) {
        if let Ok(mut markers) = self.markers.lock() {
            for marker in markers.values_mut() {
                if let Some(task) = marker.task.take() {
                    task.abort();
                }
            }
        }
    }
}

impl Drop for AnimationDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_animation(
    animation: Animation,
    frame: Duration,
    display: Arc<watch::Sender<Option<Coordinate>>>,
) {
    let mut ticker = tokio::time::interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let now = Instant::now();
        display.send_replace(Some(animation.position_at(now)));
        if animation.is_finished(now) {
            break;
        }
    }
}

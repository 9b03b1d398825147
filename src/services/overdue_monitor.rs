//! Monitoreo periódico de atrasos y progreso
//!
//! Ambas tareas recalculan desde el reloj en cada tick; no acumulan estado
//! más allá de la última foto publicada.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::models::trip::TripId;
use crate::services::progress_estimator::{OverdueTrip, TripProgress};
use crate::services::tracking_engine::TrackingEngine;

/// Publica la lista de trayectos atrasados en cada tick
pub struct OverdueMonitor {
    overdue: watch::Receiver<Vec<OverdueTrip>>,
    task: JoinHandle<()>,
}

impl OverdueMonitor {
    pub fn spawn(engine: Arc<TrackingEngine>, interval: Duration) -> Self {
        let (tx, overdue) = watch::channel(Vec::new());
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut flagged: HashSet<TripId> = HashSet::new();

            loop {
                ticker.tick().await;
                let current = engine.overdue_snapshot().await;
                let ids: HashSet<TripId> = current.iter().map(|o| o.progress.trip_id).collect();

                for trip in current.iter().filter(|o| !flagged.contains(&o.progress.trip_id)) {
                    warn!(
                        "⏰ Trayecto {} atrasado {:.1} min (conductor {})",
                        trip.progress.trip_id, trip.overrun_minutes, trip.progress.driver_id
                    );
                }
                flagged = ids;
                tx.send_replace(current);
            }
        });

        info!("⏰ Monitor de atrasos iniciado cada {:?}", interval);
        Self { overdue, task }
    }

    pub fn current(&self) -> Vec<OverdueTrip> {
        self.overdue.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<OverdueTrip>> {
        self.overdue.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for OverdueMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sigue el progreso de un trayecto hasta que deja de estar en curso
pub struct ProgressWatch {
    progress: watch::Receiver<Option<TripProgress>>,
    task: JoinHandle<()>,
}

impl ProgressWatch {
    pub fn spawn(engine: Arc<TrackingEngine>, trip_id: TripId, interval: Duration) -> Self {
        let (tx, progress) = watch::channel(None);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match engine.progress_of(trip_id).await {
                    Ok(progress) => {
                        tx.send_replace(Some(progress));
                    }
                    Err(e) => {
                        debug!("🏁 Seguimiento de progreso del trayecto {} terminado: {}", trip_id, e);
                        tx.send_replace(None);
                        break;
                    }
                }
            }
        });

        Self { progress, task }
    }

    pub fn current(&self) -> Option<TripProgress> {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TripProgress>> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ProgressWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

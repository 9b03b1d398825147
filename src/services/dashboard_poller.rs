//! Poller del tablero
//!
//! Refresca el tablero con cadencia fija (5 s). Un fallo conserva la última
//! foto buena y se reintenta en el siguiente tick, sin backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::models::dashboard::DashboardSnapshot;
use crate::utils::errors::AppResult;

/// Origen de las fotos del tablero (motor local o backend remoto)
#[async_trait]
pub trait DashboardSource: Send + Sync {
    async fn fetch_snapshot(&self) -> AppResult<DashboardSnapshot>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollerStatus {
    pub snapshot: Option<DashboardSnapshot>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub polls: u64,
}

pub struct DashboardPoller {
    status: watch::Receiver<PollerStatus>,
    task: JoinHandle<()>,
}

impl DashboardPoller {
    pub fn spawn(source: Arc<dyn DashboardSource>, interval: Duration) -> Self {
        let (tx, status) = watch::channel(PollerStatus::default());
        let task = tokio::spawn(poll_loop(source, interval, tx));
        Self { status, task }
    }

    pub fn latest(&self) -> Option<DashboardSnapshot> {
        self.status.borrow().snapshot.clone()
    }

    pub fn status(&self) -> PollerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerStatus> {
        self.status.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DashboardPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    source: Arc<dyn DashboardSource>,
    interval: Duration,
    status: watch::Sender<PollerStatus>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let result = source.fetch_snapshot().await;
        status.send_modify(|current| {
            current.polls += 1;
            match result {
                Ok(snapshot) => {
                    debug!(
                        "🔄 Tablero actualizado: {} trayectos, {} ubicaciones",
                        snapshot.trayectos.len(),
                        snapshot.ubicaciones.len()
                    );
                    current.snapshot = Some(snapshot);
                    current.consecutive_failures = 0;
                    current.last_error = None;
                }
                Err(e) => {
                    current.consecutive_failures += 1;
                    warn!(
                        "⚠️ Fallo al refrescar el tablero ({} seguidos), se reintenta en {:?}: {}",
                        current.consecutive_failures, interval, e
                    );
                    current.last_error = Some(e.to_string());
                }
            }
        });
    }
}

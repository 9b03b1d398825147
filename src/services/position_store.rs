//! Store de posiciones en vivo
//!
//! Mantiene por conductor la última posición recibida y un recorrido acotado.
//! Cada conductor tiene su propio slot con su propio lock: las escrituras de
//! conductores distintos nunca compiten, y las lecturas toman una foto.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::models::position::{Position, PositionReport, PositionUpdate};
use crate::models::trip::DriverId;
use crate::utils::clock::{Clock, SharedClock};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct DriverSlot {
    latest: Option<Position>,
    trail: VecDeque<Position>,
}

pub struct PositionStore {
    slots: RwLock<HashMap<DriverId, Arc<RwLock<DriverSlot>>>>,
    trail_capacity: usize,
    updates: broadcast::Sender<PositionUpdate>,
    clock: SharedClock,
}

impl PositionStore {
    pub fn new(trail_capacity: usize, clock: SharedClock) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            slots: RwLock::new(HashMap::new()),
            trail_capacity: trail_capacity.max(1),
            updates,
            clock,
        }
    }

    pub fn trail_capacity(&self) -> usize {
        self.trail_capacity
    }

    /// Registra una muestra. Nunca falla: las muestras fuera de orden o
    /// duplicadas se agregan tal cual y la última en llegar es la que se muestra.
    pub async fn ingest(&self, report: PositionReport) -> Position {
        self.ingest_with(report, |_, _| {}).await
    }

    /// Igual que `ingest`; `on_latest` corre con el slot del conductor
    /// bloqueado, en el mismo orden en que se escriben las muestras.
    pub async fn ingest_with<F>(&self, report: PositionReport, on_latest: F) -> Position
    where
        F: FnOnce(DriverId, &Position),
    {
        let position = Position {
            coordinate: report.coordinate,
            captured_at: report.captured_at,
            received_at: self.clock.now(),
        };

        let slot = self.slot_for(report.driver_id).await;
        {
            let mut slot = slot.write().await;
            if slot.trail.len() >= self.trail_capacity {
                slot.trail.pop_front();
            }
            slot.trail.push_back(position);
            slot.latest = Some(position);
            on_latest(report.driver_id, &position);
        }

        debug!(
            "📍 Posición conductor {}: {} (captura {})",
            report.driver_id, position.coordinate, position.captured_at
        );

        // Sin suscriptores el envío falla; no es un error
        let _ = self.updates.send(PositionUpdate {
            driver_id: report.driver_id,
            position,
        });

        position
    }

    pub async fn current_position(&self, driver_id: DriverId) -> Option<Position> {
        let slot = self.existing_slot(driver_id).await?;
        let slot = slot.read().await;
        slot.latest
    }

    /// Recorrido en orden de llegada, del más antiguo al más reciente
    pub async fn trail(&self, driver_id: DriverId) -> Vec<Position> {
        match self.existing_slot(driver_id).await {
            Some(slot) => slot.read().await.trail.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Vacía el recorrido; la última posición se conserva
    pub async fn clear_trail(&self, driver_id: DriverId) {
        if let Some(slot) = self.existing_slot(driver_id).await {
            let mut slot = slot.write().await;
            let cleared = slot.trail.len();
            slot.trail.clear();
            debug!("🧹 Recorrido del conductor {} limpiado ({} puntos)", driver_id, cleared);
        }
    }

    /// Foto de la última posición de cada conductor
    pub async fn snapshot(&self) -> HashMap<DriverId, Position> {
        let slots: Vec<(DriverId, Arc<RwLock<DriverSlot>>)> = {
            let slots = self.slots.read().await;
            slots.iter().map(|(id, slot)| (*id, Arc::clone(slot))).collect()
        };

        let mut positions = HashMap::with_capacity(slots.len());
        for (driver_id, slot) in slots {
            if let Some(latest) = slot.read().await.latest {
                positions.insert(driver_id, latest);
            }
        }
        positions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PositionUpdate> {
        self.updates.subscribe()
    }

    async fn existing_slot(&self, driver_id: DriverId) -> Option<Arc<RwLock<DriverSlot>>> {
        self.slots.read().await.get(&driver_id).cloned()
    }

    async fn slot_for(&self, driver_id: DriverId) -> Arc<RwLock<DriverSlot>> {
        if let Some(slot) = self.existing_slot(driver_id).await {
            return slot;
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(driver_id).or_default())
    }
}

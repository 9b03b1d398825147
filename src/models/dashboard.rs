//! Vistas agregadas del tablero de despacho

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::incident::IncidentStats;
use crate::models::position::ActivePositionResponse;
use crate::models::trip::TripResponse;

/// Resumen de la flota: `GET /dashboard/resumen`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FleetSummary {
    pub programados: usize,
    pub en_curso: usize,
    pub completados_hoy: usize,
    pub cancelados: usize,
    pub atrasados: usize,
    pub conductores_activos: usize,
    pub novedades_hoy: usize,
    pub pasajeros_hoy: u64,
    pub generado_en: DateTime<Utc>,
}

/// Lo que el tablero refresca en cada tick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardSnapshot {
    pub trayectos: Vec<TripResponse>,
    pub ubicaciones: Vec<ActivePositionResponse>,
    pub novedades: IncidentStats,
    pub obtenido_en: DateTime<Utc>,
}

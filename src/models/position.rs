//! Modelo de posiciones GPS
//!
//! Reportes de posición de los conductores y las vistas que se exponen
//! para monitoreo (posiciones activas y recorridos).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::trip::{DriverId, RouteId, TripId};
use crate::utils::geo::Coordinate;

/// Una muestra GPS del dispositivo de un conductor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub driver_id: DriverId,
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
}

/// Posición almacenada: la muestra más el instante de llegada
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Notificación emitida por el store a los suscriptores
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PositionUpdate {
    pub driver_id: DriverId,
    pub position: Position,
}

/// Request del dispositivo: `POST /trayectos/ubicacion`
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LocationUpdateRequest {
    #[validate(range(min = 1))]
    pub conductor_id: i64,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Filtro de la vista de monitoreo por ruta
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LocationFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruta_id: Option<RouteId>,
}

/// Posición activa de un conductor con trayecto en curso
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivePositionResponse {
    pub conductor_id: DriverId,
    pub trayecto_id: TripId,
    pub ruta_id: RouteId,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub nombre_ruta: Option<String>,
    pub nombre_conductor: Option<String>,
    pub placa_vehiculo: Option<String>,
}

/// Punto del recorrido de un conductor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrailPointResponse {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Position> for TrailPointResponse {
    fn from(position: &Position) -> Self {
        Self {
            lat: position.coordinate.latitude,
            lng: position.coordinate.longitude,
            timestamp: position.captured_at,
        }
    }
}

//! Modelo de Trip (trayecto)
//!
//! Este módulo contiene el struct Trip, su máquina de estados a nivel de tipo
//! y las variantes de request/response que viajan por la API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub type TripId = i64;
pub type DriverId = i64;
pub type RouteId = i64;
pub type VehicleId = i64;

/// Estado del trayecto - nombres de wire iguales a los del backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TripStatus {
    #[serde(rename = "programado", alias = "PROGRAMADO")]
    Scheduled,
    #[serde(rename = "en_curso", alias = "EN_CURSO")]
    InProgress,
    #[serde(rename = "completado", alias = "COMPLETADO")]
    Completed,
    #[serde(rename = "cancelado", alias = "CANCELADO")]
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "programado",
            TripStatus::InProgress => "en_curso",
            TripStatus::Completed => "completado",
            TripStatus::Cancelled => "cancelado",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    /// Transiciones permitidas; nunca se vuelve a `Scheduled`
    pub fn can_transition_to(&self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (TripStatus::Scheduled, TripStatus::InProgress)
                | (TripStatus::Scheduled, TripStatus::Cancelled)
                | (TripStatus::InProgress, TripStatus::Completed)
                | (TripStatus::InProgress, TripStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trayecto: una corrida de un vehículo sobre una ruta con un conductor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: TripId,
    pub route_id: RouteId,
    pub driver_id: DriverId,
    pub vehicle_id: VehicleId,
    pub status: TripStatus,
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: Option<u32>,
    pub passenger_count: Option<u32>,
    pub actual_duration_minutes: Option<i64>,
    pub driver_name: Option<String>,
    pub vehicle_plate: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn is_in_progress(&self) -> bool {
        self.status == TripStatus::InProgress
    }

    /// Minutos enteros transcurridos desde la salida (solo en curso)
    pub fn current_duration_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        match (self.status, self.departure_time) {
            (TripStatus::InProgress, Some(departure)) => {
                Some((now - departure).num_minutes().max(0))
            }
            _ => None,
        }
    }
}

/// Datos para programar un nuevo trayecto
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateTripRequest {
    #[serde(rename = "ruta_id")]
    #[validate(range(min = 1))]
    pub route_id: i64,

    #[serde(rename = "conductor_id")]
    #[validate(range(min = 1))]
    pub driver_id: i64,

    #[serde(rename = "vehiculo_id")]
    #[validate(range(min = 1))]
    pub vehicle_id: i64,

    #[serde(rename = "duracion_estimada_minutos", default)]
    #[validate(range(min = 1))]
    pub estimated_duration_minutes: Option<u32>,

    #[serde(rename = "nombre_conductor", default)]
    pub driver_name: Option<String>,

    #[serde(rename = "placa_vehiculo", default)]
    pub vehicle_plate: Option<String>,
}

/// Request para finalizar un trayecto
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FinishTripRequest {
    #[validate(range(min = 0))]
    pub cantidad_pasajeros: i64,
}

/// Filtros de listado de trayectos
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TripFilters {
    #[serde(rename = "estado", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TripStatus>,
    #[serde(rename = "conductor_id", default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<DriverId>,
    #[serde(rename = "ruta_id", default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<RouteId>,
}

impl TripFilters {
    pub fn matches(&self, trip: &Trip) -> bool {
        self.status.map_or(true, |status| trip.status == status)
            && self.driver_id.map_or(true, |id| trip.driver_id == id)
            && self.route_id.map_or(true, |id| trip.route_id == id)
    }
}

/// Response de trayecto para la API, con nombres desnormalizados
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripResponse {
    pub id: TripId,
    pub ruta_id: RouteId,
    pub conductor_id: DriverId,
    pub vehiculo_id: VehicleId,
    pub fecha_salida: Option<DateTime<Utc>>,
    pub fecha_llegada: Option<DateTime<Utc>>,
    pub cantidad_pasajeros: Option<u32>,
    pub estado: TripStatus,
    pub duracion_estimada_minutos: Option<u32>,
    pub duracion_minutos: Option<i64>,
    pub duracion_actual: Option<i64>,
    pub nombre_ruta: String,
    pub nombre_conductor: String,
    pub placa_vehiculo: String,
}

impl TripResponse {
    pub fn from_trip(trip: &Trip, route_name: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: trip.id,
            ruta_id: trip.route_id,
            conductor_id: trip.driver_id,
            vehiculo_id: trip.vehicle_id,
            fecha_salida: trip.departure_time,
            fecha_llegada: trip.arrival_time,
            cantidad_pasajeros: trip.passenger_count,
            estado: trip.status,
            duracion_estimada_minutos: trip.estimated_duration_minutes,
            duracion_minutos: trip.actual_duration_minutes,
            duracion_actual: trip.current_duration_minutes(now),
            nombre_ruta: route_name.unwrap_or("Sin ruta").to_string(),
            nombre_conductor: trip
                .driver_name
                .clone()
                .unwrap_or_else(|| "Sin conductor".to_string()),
            placa_vehiculo: trip
                .vehicle_plate
                .clone()
                .unwrap_or_else(|| "Sin vehículo".to_string()),
        }
    }
}

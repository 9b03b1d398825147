//! Modelo de Route
//!
//! Datos de referencia de rutas. Los administra el CRUD externo; el motor
//! solo los lee (nombre para vistas y tiempo estimado como respaldo).

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Route {
    #[validate(range(min = 1))]
    pub id: i64,
    #[serde(rename = "nombre")]
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(rename = "origen", default)]
    pub origin: String,
    #[serde(rename = "destino", default)]
    pub destination: String,
    #[serde(rename = "distancia", default)]
    pub distance_km: f64,
    #[serde(rename = "tiempo_estimado", default)]
    pub estimated_time_minutes: Option<u32>,
    #[serde(rename = "activa", default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

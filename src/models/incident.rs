//! Modelo de Incident (novedad)
//!
//! Eventos operativos reportados sobre un trayecto en curso. No alteran el
//! estado del trayecto; son informativos y auditables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use crate::models::trip::{DriverId, TripId};

/// Tipo de novedad - nombres de wire iguales a los del backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IncidentType {
    #[serde(rename = "Accidente")]
    Accident,
    #[serde(rename = "Avería Mecánica")]
    MechanicalFailure,
    #[serde(rename = "Tráfico")]
    Traffic,
    #[serde(rename = "Problema de Ruta")]
    RouteProblem,
    #[serde(rename = "Otro")]
    Other,
}

impl IncidentType {
    pub const ALL: [IncidentType; 5] = [
        IncidentType::Accident,
        IncidentType::MechanicalFailure,
        IncidentType::Traffic,
        IncidentType::RouteProblem,
        IncidentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Accident => "Accidente",
            IncidentType::MechanicalFailure => "Avería Mecánica",
            IncidentType::Traffic => "Tráfico",
            IncidentType::RouteProblem => "Problema de Ruta",
            IncidentType::Other => "Otro",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    pub id: Uuid,
    pub trip_id: TripId,
    pub driver_id: DriverId,
    pub incident_type: IncidentType,
    pub notes: Option<String>,
    pub reported_at: DateTime<Utc>,
}

/// Request para reportar una novedad: `POST /novedades`
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateIncidentRequest {
    #[validate(range(min = 1))]
    pub trayecto_id: i64,
    pub tipo: IncidentType,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub notas: Option<String>,
    #[validate(range(min = 1))]
    pub conductor_id: i64,
}

/// Filtros del listado de novedades
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IncidentFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trayecto_id: Option<TripId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conductor_id: Option<DriverId>,
}

impl IncidentFilters {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.trayecto_id.map_or(true, |id| incident.trip_id == id)
            && self.conductor_id.map_or(true, |id| incident.driver_id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentResponse {
    pub id: Uuid,
    pub trayecto_id: TripId,
    pub conductor_id: DriverId,
    pub tipo: IncidentType,
    pub notas: Option<String>,
    pub fecha_reporte: DateTime<Utc>,
}

impl From<&Incident> for IncidentResponse {
    fn from(incident: &Incident) -> Self {
        Self {
            id: incident.id,
            trayecto_id: incident.trip_id,
            conductor_id: incident.driver_id,
            tipo: incident.incident_type,
            notas: incident.notes.clone(),
            fecha_reporte: incident.reported_at,
        }
    }
}

/// Estadísticas agregadas de novedades: `GET /novedades/stats`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IncidentStats {
    pub total: usize,
    pub por_tipo: BTreeMap<String, usize>,
    pub hoy: usize,
}

impl IncidentStats {
    /// Calcula las estadísticas; "hoy" se evalúa en la fecha UTC de `now`
    pub fn compute<'a>(incidents: impl IntoIterator<Item = &'a Incident>, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let mut stats = IncidentStats::default();
        for incident in incidents {
            stats.total += 1;
            *stats
                .por_tipo
                .entry(incident.incident_type.as_str().to_string())
                .or_insert(0) += 1;
            if incident.reported_at.date_naive() == today {
                stats.hoy += 1;
            }
        }
        stats
    }
}

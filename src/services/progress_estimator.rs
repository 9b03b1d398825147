//! Estimador de progreso y ETA
//!
//! Cálculos puros sobre `now`: nada se guarda entre llamadas, el tiempo
//! transcurrido siempre sale del reloj al momento de la consulta.
//! Duración estimada: la del trayecto, luego la de la ruta, luego 60 min.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::route::Route;
use crate::models::trip::{DriverId, RouteId, Trip, TripId, TripStatus};
use crate::utils::errors::{AppError, AppResult};

pub const DEFAULT_TRIP_DURATION_MINUTES: u32 = 60;

/// De dónde salió la duración estimada
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationSource {
    Trip,
    Route,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationEstimate {
    pub minutes: u32,
    pub source: DurationSource,
}

/// Progreso de un trayecto en curso
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripProgress {
    #[serde(rename = "trayecto_id")]
    pub trip_id: TripId,
    #[serde(rename = "conductor_id")]
    pub driver_id: DriverId,
    #[serde(rename = "ruta_id")]
    pub route_id: RouteId,
    #[serde(rename = "fecha_salida")]
    pub departure_time: DateTime<Utc>,
    #[serde(rename = "duracion_estimada_minutos")]
    pub estimated_duration_minutes: u32,
    #[serde(rename = "fuente_duracion")]
    pub duration_source: DurationSource,
    #[serde(rename = "minutos_transcurridos")]
    pub elapsed_minutes: f64,
    #[serde(rename = "porcentaje_progreso")]
    pub progress_percent: f64,
    #[serde(rename = "minutos_restantes")]
    pub remaining_minutes: f64,
    #[serde(rename = "llegada_estimada")]
    pub eta: DateTime<Utc>,
    #[serde(rename = "atrasado")]
    pub is_overdue: bool,
}

/// Trayecto atrasado con su exceso en minutos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueTrip {
    #[serde(flatten)]
    pub progress: TripProgress,
    #[serde(rename = "minutos_excedidos")]
    pub overrun_minutes: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressEstimator {
    default_duration_minutes: u32,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_TRIP_DURATION_MINUTES)
    }
}

impl ProgressEstimator {
    pub fn new(default_duration_minutes: u32) -> Self {
        Self {
            default_duration_minutes: default_duration_minutes.max(1),
        }
    }

    /// Cadena trayecto → ruta → defecto; los valores no positivos se saltan
    pub fn resolve_duration(&self, trip: &Trip, route: Option<&Route>) -> DurationEstimate {
        if let Some(minutes) = trip.estimated_duration_minutes.filter(|m| *m > 0) {
            return DurationEstimate {
                minutes,
                source: DurationSource::Trip,
            };
        }
        if let Some(minutes) = route.and_then(|r| r.estimated_time_minutes).filter(|m| *m > 0) {
            return DurationEstimate {
                minutes,
                source: DurationSource::Route,
            };
        }
        DurationEstimate {
            minutes: self.default_duration_minutes,
            source: DurationSource::Default,
        }
    }

    /// Minutos fraccionarios desde la salida, nunca negativos
    pub fn elapsed_minutes(departure: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let elapsed_ms = (now - departure).num_milliseconds().max(0);
        elapsed_ms as f64 / 60_000.0
    }

    pub fn progress_percent(elapsed_minutes: f64, estimated_minutes: u32) -> f64 {
        (100.0 * elapsed_minutes / f64::from(estimated_minutes.max(1))).min(100.0)
    }

    /// Estrictamente después de salida + estimado
    pub fn is_overdue(departure: DateTime<Utc>, estimated_minutes: u32, now: DateTime<Utc>) -> bool {
        now > departure + Duration::minutes(i64::from(estimated_minutes))
    }

    pub fn progress(&self, trip: &Trip, route: Option<&Route>, now: DateTime<Utc>) -> AppResult<TripProgress> {
        let departure = match (trip.status, trip.departure_time) {
            (TripStatus::InProgress, Some(departure)) => departure,
            _ => {
                return Err(AppError::InvalidState(format!(
                    "Progress is only available for trips in progress (trip {} is {})",
                    trip.id, trip.status
                )))
            }
        };

        let estimate = self.resolve_duration(trip, route);
        let elapsed = Self::elapsed_minutes(departure, now);

        Ok(TripProgress {
            trip_id: trip.id,
            driver_id: trip.driver_id,
            route_id: trip.route_id,
            departure_time: departure,
            estimated_duration_minutes: estimate.minutes,
            duration_source: estimate.source,
            elapsed_minutes: elapsed,
            progress_percent: Self::progress_percent(elapsed, estimate.minutes),
            remaining_minutes: (f64::from(estimate.minutes) - elapsed).max(0.0),
            eta: departure + Duration::minutes(i64::from(estimate.minutes)),
            is_overdue: Self::is_overdue(departure, estimate.minutes, now),
        })
    }

    /// Trayectos en curso atrasados, del mayor exceso al menor
    pub fn overdue_trips<'a, F>(
        &self,
        trips: impl IntoIterator<Item = &'a Trip>,
        route_lookup: F,
        now: DateTime<Utc>,
    ) -> Vec<OverdueTrip>
    where
        F: Fn(RouteId) -> Option<Route>,
    {
        let mut overdue: Vec<OverdueTrip> = trips
            .into_iter()
            .filter(|trip| trip.is_in_progress())
            .filter_map(|trip| {
                let route = route_lookup(trip.route_id);
                self.progress(trip, route.as_ref(), now).ok()
            })
            .filter(|progress| progress.is_overdue)
            .map(|progress| OverdueTrip {
                overrun_minutes: progress.elapsed_minutes - f64::from(progress.estimated_duration_minutes),
                progress,
            })
            .collect();

        overdue.sort_by(|a, b| b.overrun_minutes.total_cmp(&a.overrun_minutes));
        overdue
    }
}

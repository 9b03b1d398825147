//! Configuración del seguimiento
//!
//! Este módulo contiene los parámetros del motor de seguimiento en vivo.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuración del seguimiento
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingConfig {
    pub trail_capacity: usize,
    pub animation_window_ms: u64,
    pub animation_frame_ms: u64,
    pub default_trip_duration_minutes: u32,
    pub poll_interval_secs: u64,
    pub geolocation_fallback_secs: u64,
    pub geolocation_max_age_secs: u64,
    pub geolocation_high_accuracy: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            trail_capacity: 500,
            animation_window_ms: 5_000,
            animation_frame_ms: 50,
            default_trip_duration_minutes: 60,
            poll_interval_secs: 5,
            geolocation_fallback_secs: 10,
            geolocation_max_age_secs: 30,
            geolocation_high_accuracy: true,
        }
    }
}

impl TrackingConfig {
    pub fn animation_window(&self) -> Duration {
        Duration::from_millis(self.animation_window_ms)
    }

    pub fn animation_frame(&self) -> Duration {
        Duration::from_millis(self.animation_frame_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn geolocation_fallback(&self) -> Duration {
        Duration::from_secs(self.geolocation_fallback_secs.max(1))
    }

    pub fn geolocation_max_age(&self) -> Duration {
        Duration::from_secs(self.geolocation_max_age_secs)
    }
}

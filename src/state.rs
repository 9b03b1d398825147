//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use std::sync::Arc;

use crate::config::environment::EnvironmentConfig;
use crate::services::tracking_engine::TrackingEngine;
use crate::utils::clock::SharedClock;

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub engine: Arc<TrackingEngine>,
}

impl AppState {
    pub fn new(config: EnvironmentConfig) -> Self {
        let engine = TrackingEngine::with_system_clock(config.tracking.clone());
        Self::with_engine(config, Arc::new(engine))
    }

    /// Estado con un reloj inyectado (tests y simulaciones)
    pub fn with_clock(config: EnvironmentConfig, clock: SharedClock) -> Self {
        let engine = TrackingEngine::new(config.tracking.clone(), clock);
        Self::with_engine(config, Arc::new(engine))
    }

    pub fn with_engine(config: EnvironmentConfig, engine: Arc<TrackingEngine>) -> Self {
        Self { config, engine }
    }
}

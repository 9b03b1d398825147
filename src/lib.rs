//! Motor de ciclo de vida y seguimiento en vivo de trayectos
//!
//! Programación, inicio, finalización y cancelación de trayectos, ingesta
//! de posiciones GPS, progreso/ETA, animación de marcadores y captura de
//! geolocalización del lado del conductor, expuestos por una API axum.

pub mod api;
pub mod client;
pub mod config;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

pub use client::BackendClient;
pub use config::EnvironmentConfig;
pub use services::TrackingEngine;
pub use state::AppState;
pub use utils::errors::{AppError, AppResult};

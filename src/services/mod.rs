//! Services module
//!
//! Este módulo contiene la lógica de negocio del seguimiento de trayectos.
//! `TrackingEngine` es la fachada; el resto son piezas que se pueden usar
//! y probar por separado.

pub mod animation_driver;
pub mod authorization_service;
pub mod dashboard_poller;
pub mod geolocation;
pub mod interpolation;
pub mod overdue_monitor;
pub mod position_store;
pub mod progress_estimator;
pub mod route_catalog;
pub mod tracking_engine;
pub mod trip_state_machine;

pub use authorization_service::AuthorizationService;
pub use tracking_engine::TrackingEngine;

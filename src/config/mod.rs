//! Configuración del proyecto
//!
//! Este módulo contiene las variables de entorno y la configuración
//! del motor de seguimiento.

pub mod environment;
pub mod tracking;

pub use environment::*;
pub use tracking::TrackingConfig;

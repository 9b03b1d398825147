//! Utilidades del sistema
//!
//! Este módulo contiene utilidades para manejo de errores, validación,
//! geometría y reloj.

pub mod clock;
pub mod errors;
pub mod geo;
pub mod validation;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use errors::{AppError, AppResult};
pub use geo::Coordinate;

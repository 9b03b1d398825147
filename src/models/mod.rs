//! Modelos del sistema
//!
//! Este módulo contiene los modelos del dominio de trayectos y seguimiento,
//! junto con sus requests y responses de la API.

pub mod auth;
pub mod dashboard;
pub mod incident;
pub mod position;
pub mod route;
pub mod trip;

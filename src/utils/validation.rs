//! Utilidades de validación
//!
//! Este módulo contiene funciones helper para validación de datos
//! de entrada del motor (coordenadas, conteo de pasajeros, identificadores).

use validator::ValidationError;

use crate::utils::errors::AppError;

/// Validar longitud máxima de un texto libre
pub fn validate_max_length(value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        let mut error = ValidationError::new("length");
        error.add_param("max".into(), &max);
        error.add_param("actual".into(), &len);
        return Err(error);
    }
    Ok(())
}

/// Validar formato de coordenadas GPS
pub fn validate_coordinates(lat: f64, lng: f64) -> Result<(), ValidationError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        let mut error = ValidationError::new("latitude");
        error.add_param("value".into(), &lat.to_string());
        error.add_param("range".into(), &"-90.0 to 90.0".to_string());
        return Err(error);
    }

    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        let mut error = ValidationError::new("longitude");
        error.add_param("value".into(), &lng.to_string());
        error.add_param("range".into(), &"-180.0 to 180.0".to_string());
        return Err(error);
    }

    Ok(())
}

/// Validar el conteo de pasajeros ingresado por el operador
pub fn validate_passenger_count(value: i64) -> Result<u32, ValidationError> {
    if value < 0 || value > u32::MAX as i64 {
        let mut error = ValidationError::new("non_negative");
        error.add_param("value".into(), &value);
        return Err(error);
    }
    Ok(value as u32)
}

/// Validar que un identificador sea positivo
pub fn validate_positive_id(value: i64) -> Result<(), ValidationError> {
    if value <= 0 {
        let mut error = ValidationError::new("positive");
        error.add_param("value".into(), &value);
        return Err(error);
    }
    Ok(())
}

/// Convertir un `ValidationError` en el error de la aplicación
pub fn into_app_error(field: &str, error: ValidationError) -> AppError {
    AppError::Validation(format!("{}: {}", field, error.code))
}

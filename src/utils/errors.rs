//! Sistema de manejo de errores
//!
//! Este módulo define todos los tipos de errores del motor de seguimiento
//! y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errores principales de la aplicación
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl AppError {
    /// Código estable usado por los clientes para distinguir errores
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
            AppError::Unsupported(_) => "UNSUPPORTED",
            AppError::TransientNetwork(_) => "TRANSIENT_NETWORK_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition(_) | AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PermissionDenied(_) | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::TransientNetwork(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Los errores de red son reintentables en el siguiente tick
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientNetwork(_))
    }

    /// Reconstruir un error a partir del cuerpo `{code, message}` de la API
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "NOT_FOUND" => AppError::NotFound(message),
            "INVALID_TRANSITION" => AppError::InvalidTransition(message),
            "INVALID_STATE" => AppError::InvalidState(message),
            "VALIDATION_ERROR" => AppError::Validation(message),
            "PERMISSION_DENIED" => AppError::PermissionDenied(message),
            "UNSUPPORTED" => AppError::Unsupported(message),
            "TRANSIENT_NETWORK_ERROR" => AppError::TransientNetwork(message),
            "UNAUTHORIZED" => AppError::Unauthorized(message),
            "FORBIDDEN" => AppError::Forbidden(message),
            _ => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let (error, message, details) = match self {
            AppError::NotFound(msg) => {
                tracing::debug!("Resource not found: {}", msg);
                ("Not Found", msg, None)
            }
            AppError::InvalidTransition(msg) => {
                tracing::debug!("Invalid transition: {}", msg);
                ("Invalid Transition", msg, None)
            }
            AppError::InvalidState(msg) => {
                tracing::debug!("Invalid state: {}", msg);
                ("Invalid State", msg, None)
            }
            AppError::Validation(msg) => {
                tracing::debug!("Validation error: {}", msg);
                ("Validation Error", "The provided data is invalid".to_string(), Some(json!({ "reason": msg })))
            }
            AppError::PermissionDenied(msg) => ("Permission Denied", msg, None),
            AppError::Unsupported(msg) => ("Unsupported", msg, None),
            AppError::TransientNetwork(msg) => {
                tracing::warn!("External API error: {}", msg);
                (
                    "Transient Network Error",
                    "An error occurred while communicating with external service".to_string(),
                    Some(json!({ "external_api_error": msg })),
                )
            }
            AppError::Unauthorized(msg) => {
                tracing::debug!("Unauthorized access: {}", msg);
                ("Unauthorized", msg, None)
            }
            AppError::Forbidden(msg) => {
                tracing::debug!("Forbidden access: {}", msg);
                ("Forbidden", msg, None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    "Internal Server Error",
                    "An unexpected error occurred".to_string(),
                    Some(json!({ "internal_error": msg })),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
            details,
            code: Some(code.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::TransientNetwork(error.to_string())
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

/// Función helper para crear errores de acceso prohibido
pub fn forbidden_error(operation: &str, reason: &str) -> AppError {
    AppError::Forbidden(format!("Cannot {}: {}", operation, reason))
}

/// Función helper para crear errores de validación
pub fn validation_error(field: &str, message: &str) -> AppError {
    AppError::Validation(format!("{}: {}", field, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(not_found_error("Trip", 7).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InvalidTransition("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(validation_error("lat", "out of range").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::TransientNetwork("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(AppError::TransientNetwork("down".into()).is_transient());
        assert!(!AppError::Internal("boom".into()).is_transient());
        assert!(!forbidden_error("cancel trip", "driver role").is_transient());
    }
}

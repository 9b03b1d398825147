use serde::{Deserialize, Serialize};

use crate::models::trip::DriverId;

/// Roles del sistema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Administrador,
    Supervisor,
    Conductor,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Administrador => "administrador",
            UserRole::Supervisor => "supervisor",
            UserRole::Conductor => "conductor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "administrador" => Some(UserRole::Administrador),
            "supervisor" => Some(UserRole::Supervisor),
            "conductor" => Some(UserRole::Conductor),
            _ => None,
        }
    }

    /// Administradores y supervisores operan sobre toda la flota
    pub fn is_dispatcher(&self) -> bool {
        matches!(self, UserRole::Administrador | UserRole::Supervisor)
    }
}

/// Contexto explícito que acompaña cada comando del motor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: String,
    pub role: UserRole,
    pub driver_id: Option<DriverId>, // Solo para conductores
}

impl AuthContext {
    pub fn dispatcher(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Administrador,
            driver_id: None,
        }
    }

    pub fn driver(driver_id: DriverId) -> Self {
        Self {
            user_id: driver_id.to_string(),
            role: UserRole::Conductor,
            driver_id: Some(driver_id),
        }
    }
}

/// Claims del JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String, // user_id
    pub role: String,
    #[serde(default)]
    pub conductor_id: Option<DriverId>,
    pub exp: i64, // expiration timestamp
    pub iat: i64, // issued at timestamp
}

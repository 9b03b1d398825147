use crate::models::auth::{AuthContext, UserRole};
use crate::models::trip::{DriverId, Trip};
use crate::utils::errors::{forbidden_error, AppResult};

/// Servicio de autorización para verificar roles sobre el contexto explícito
/// que acompaña cada comando
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationService;

impl AuthorizationService {
    pub fn new() -> Self {
        Self
    }

    /// Verifica si un usuario tiene un rol específico
    pub fn has_role(&self, ctx: &AuthContext, required_role: UserRole) -> bool {
        ctx.role == required_role
    }

    /// Verifica si un usuario tiene al menos uno de los roles requeridos
    pub fn has_any_role(&self, ctx: &AuthContext, required_roles: &[UserRole]) -> bool {
        required_roles.contains(&ctx.role)
    }

    /// Verifica si el contexto corresponde al conductor indicado
    pub fn is_driver(&self, ctx: &AuthContext, driver_id: DriverId) -> bool {
        ctx.role == UserRole::Conductor && ctx.driver_id == Some(driver_id)
    }

    /// Verifica si un usuario puede ver un trayecto
    pub fn can_view_trip(&self, ctx: &AuthContext, trip: &Trip) -> bool {
        match ctx.role {
            UserRole::Administrador | UserRole::Supervisor => true,
            UserRole::Conductor => self.is_driver(ctx, trip.driver_id),
        }
    }

    /// Verifica si un usuario puede iniciar, finalizar o reportar novedades
    pub fn can_operate_trip(&self, ctx: &AuthContext, trip: &Trip) -> bool {
        // El conductor solo opera sus propios trayectos
        self.can_view_trip(ctx, trip)
    }

    /// Cancelar, crear y eliminar trayectos es tarea del despacho
    pub fn can_manage_trips(&self, ctx: &AuthContext) -> bool {
        ctx.role.is_dispatcher()
    }

    /// Verifica si un usuario puede reportar la posición de un conductor
    pub fn can_report_position(&self, ctx: &AuthContext, driver_id: DriverId) -> bool {
        match ctx.role {
            UserRole::Administrador | UserRole::Supervisor => true,
            UserRole::Conductor => self.is_driver(ctx, driver_id),
        }
    }

    /// Mapa, recorridos y atrasos
    pub fn can_monitor_fleet(&self, ctx: &AuthContext) -> bool {
        ctx.role.is_dispatcher()
    }

    pub fn can_view_stats(&self, ctx: &AuthContext) -> bool {
        ctx.role.is_dispatcher()
    }

    pub fn can_manage_routes(&self, ctx: &AuthContext) -> bool {
        matches!(ctx.role, UserRole::Administrador)
    }

    /// Obtiene el nivel de acceso de un usuario
    pub fn get_access_level(&self, ctx: &AuthContext) -> AccessLevel {
        match ctx.role {
            UserRole::Administrador => AccessLevel::Full,
            UserRole::Supervisor => AccessLevel::Fleet,
            UserRole::Conductor => AccessLevel::OwnTrips,
        }
    }

    /// Convierte un chequeo fallido en `Forbidden`
    pub fn require(&self, allowed: bool, operation: &str, ctx: &AuthContext) -> AppResult<()> {
        if allowed {
            Ok(())
        } else {
            tracing::debug!("🚫 {} denegado para {} ({})", operation, ctx.user_id, ctx.role.as_str());
            Err(forbidden_error(operation, &format!("role '{}' is not allowed", ctx.role.as_str())))
        }
    }
}

/// Niveles de acceso del sistema
#[derive(Debug, Clone, PartialEq)]
pub enum AccessLevel {
    /// Acceso completo al sistema
    Full,
    /// Toda la flota, sin administración de rutas
    Fleet,
    /// Solo los trayectos propios
    OwnTrips,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Full => "full",
            AccessLevel::Fleet => "fleet",
            AccessLevel::OwnTrips => "own_trips",
        }
    }
}

//! Middleware de autenticación JWT
//!
//! Este módulo maneja la autenticación JWT: extrae el token Bearer, lo
//! valida y deja el `AuthContext` en las extensions de la request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::{
    config::EnvironmentConfig,
    models::auth::{AuthContext, JwtClaims, UserRole},
    models::trip::DriverId,
    state::AppState,
    utils::errors::AppError,
};

/// Middleware de autenticación JWT
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Extraer token del header Authorization
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_str| auth_str.to_str().ok())
        .and_then(|auth_str| auth_str.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Token de autorización requerido".to_string()))?;

    let ctx = decode_token(token, &state.config.jwt_secret)?;

    // Inyectar el contexto en las extensions
    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}

/// Decodificar y validar un JWT, devolviendo el contexto del usuario
pub fn decode_token(token: &str, secret: &str) -> Result<AuthContext, AppError> {
    let token_data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Token inválido".to_string()))?;

    let claims = token_data.claims;
    let role = UserRole::from_str(&claims.role)
        .ok_or_else(|| AppError::Unauthorized(format!("Rol desconocido: {}", claims.role)))?;

    if role == UserRole::Conductor && claims.conductor_id.is_none() {
        return Err(AppError::Unauthorized(
            "Token de conductor sin conductor_id".to_string(),
        ));
    }

    Ok(AuthContext {
        user_id: claims.sub,
        role,
        driver_id: claims.conductor_id,
    })
}

/// Función para generar JWT token
pub fn generate_jwt_token(
    user_id: &str,
    role: UserRole,
    driver_id: Option<DriverId>,
    config: &EnvironmentConfig,
) -> Result<String, AppError> {
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::seconds(config.jwt_expiration as i64);

    let claims = JwtClaims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        conductor_id: driver_id,
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
    };

    let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_ref());

    encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| AppError::Internal(format!("Error generando JWT: {}", e)))
}

//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y variables de configuración.
//! Las variables ausentes toman su valor por defecto; las mal formadas fallan.

use std::env;
use std::str::FromStr;

use thiserror::Error;

use super::tracking::TrackingConfig;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected} (got '{value}')")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub cors_origins: Vec<String>,
    pub backend_url: Option<String>,
    pub log_level: String,
    pub tracking: TrackingConfig,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration: 86_400,
            cors_origins: Vec::new(),
            backend_url: None,
            log_level: "info".to_string(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl EnvironmentConfig {
    /// Leer la configuración desde el entorno (después de `dotenvy::dotenv()`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables inyectable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let tracking_defaults = TrackingConfig::default();

        let tracking = TrackingConfig {
            trail_capacity: parse_or(&lookup, "TRAIL_CAPACITY", tracking_defaults.trail_capacity)?,
            animation_window_ms: parse_or(
                &lookup,
                "ANIMATION_WINDOW_MS",
                tracking_defaults.animation_window_ms,
            )?,
            animation_frame_ms: parse_or(
                &lookup,
                "ANIMATION_FRAME_MS",
                tracking_defaults.animation_frame_ms,
            )?,
            default_trip_duration_minutes: parse_or(
                &lookup,
                "DEFAULT_TRIP_DURATION_MINUTES",
                tracking_defaults.default_trip_duration_minutes,
            )?,
            poll_interval_secs: parse_or(
                &lookup,
                "POLL_INTERVAL_SECS",
                tracking_defaults.poll_interval_secs,
            )?,
            geolocation_fallback_secs: parse_or(
                &lookup,
                "GEOLOCATION_FALLBACK_SECS",
                tracking_defaults.geolocation_fallback_secs,
            )?,
            geolocation_max_age_secs: parse_or(
                &lookup,
                "GEOLOCATION_MAX_AGE_SECS",
                tracking_defaults.geolocation_max_age_secs,
            )?,
            geolocation_high_accuracy: parse_or(
                &lookup,
                "GEOLOCATION_HIGH_ACCURACY",
                tracking_defaults.geolocation_high_accuracy,
            )?,
        };

        Ok(Self {
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            host: lookup("HOST").unwrap_or(defaults.host),
            jwt_secret: lookup("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_expiration: parse_or(&lookup, "JWT_EXPIRATION", defaults.jwt_expiration)?,
            cors_origins: lookup("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            backend_url: lookup("BACKEND_URL").filter(|url| !url.trim().is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            tracking,
        })
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Obtener la URL del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            expected: std::any::type_name::<T>(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EnvironmentConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.tracking.trail_capacity, 500);
        assert_eq!(config.tracking.default_trip_duration_minutes, 60);
        assert!(config.is_development());
    }

    #[test]
    fn test_overrides_and_origins() {
        let config = EnvironmentConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("CORS_ORIGINS", "http://a.test, http://b.test"),
            ("TRAIL_CAPACITY", "50"),
            ("ENVIRONMENT", "production"),
        ]))
        .unwrap();
        assert_eq!(config.server_url(), "0.0.0.0:8080");
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.tracking.trail_capacity, 50);
        assert!(config.is_production());
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let result = EnvironmentConfig::from_lookup(lookup_from(&[("POLL_INTERVAL_SECS", "five")]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { name: "POLL_INTERVAL_SECS", .. })
        ));
    }
}

//! Geometría sobre la esfera terrestre
//!
//! Distancias haversine e interpolación a lo largo del círculo máximo,
//! usadas por la animación de marcadores.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}, {}", self.latitude, self.longitude))
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Distancia haversine en kilómetros
    pub fn distance_km(&self, coord: &Self) -> f64 {
        EARTH_RADIUS_KM * self.central_angle(coord)
    }

    /// Ángulo central (radianes) entre dos puntos
    fn central_angle(&self, coord: &Self) -> f64 {
        let dist_lat = f64::to_radians(coord.latitude - self.latitude);
        let dist_lon = f64::to_radians(coord.longitude - self.longitude);
        let a = f64::powi(f64::sin(dist_lat / 2.0), 2)
            + f64::cos(f64::to_radians(self.latitude))
                * f64::cos(f64::to_radians(coord.latitude))
                * f64::powi(f64::sin(dist_lon / 2.0), 2);
        2.0 * f64::atan2(f64::sqrt(a), f64::sqrt(1.0 - a))
    }

    /// Punto a la fracción `fraction` del círculo máximo entre `self` y `to`.
    ///
    /// `fraction` se acota a [0, 1]; en 0 devuelve `self` y en 1 devuelve
    /// exactamente `to`.
    pub fn great_circle_point(&self, to: &Self, fraction: f64) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= 0.0 {
            return *self;
        }
        if fraction >= 1.0 {
            return *to;
        }

        let delta = self.central_angle(to);
        if delta < 1e-12 {
            return *to;
        }

        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();
        let lat2 = to.latitude.to_radians();
        let lon2 = to.longitude.to_radians();

        let a = f64::sin((1.0 - fraction) * delta) / f64::sin(delta);
        let b = f64::sin(fraction * delta) / f64::sin(delta);

        let x = a * lat1.cos() * lon1.cos() + b * lat2.cos() * lon2.cos();
        let y = a * lat1.cos() * lon1.sin() + b * lat2.cos() * lon2.sin();
        let z = a * lat1.sin() + b * lat2.sin();

        Self {
            latitude: f64::atan2(z, f64::sqrt(x * x + y * y)).to_degrees(),
            longitude: f64::atan2(y, x).to_degrees(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_test() {
        let paris = Coordinate::new(48.858_009, 2.351_435);
        let london = Coordinate::new(51.505_238, -0.124_954);
        let d = paris.distance_km(&london);
        assert!((d - 343.0).abs() < 5.0);
    }

    #[test]
    fn great_circle_endpoints_are_exact() {
        let from = Coordinate::new(5.07, -75.51);
        let to = Coordinate::new(5.08, -75.52);
        assert_eq!(from.great_circle_point(&to, 0.0), from);
        assert_eq!(from.great_circle_point(&to, 1.0), to);
        assert_eq!(from.great_circle_point(&to, 2.0), to);
    }

    #[test]
    fn great_circle_midpoint() {
        let from = Coordinate::new(5.07, -75.51);
        let to = Coordinate::new(5.08, -75.52);
        let mid = from.great_circle_point(&to, 0.5);
        assert!((mid.latitude - 5.075).abs() < 1e-4);
        assert!((mid.longitude + 75.515).abs() < 1e-4);
        let half = from.distance_km(&to) / 2.0;
        assert!((from.distance_km(&mid) - half).abs() < 1e-6);
    }

    #[test]
    fn great_circle_same_point() {
        let here = Coordinate::new(5.07, -75.51);
        assert_eq!(here.great_circle_point(&here, 0.3), here);
    }
}

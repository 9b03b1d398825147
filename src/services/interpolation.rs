//! Interpolación de marcadores
//!
//! Modelo puro de la animación de un marcador: dado el instante, devuelve la
//! posición mostrada. La ventana de animación es la configurada (5 s) o el
//! tiempo desde el reporte anterior si es menor, para que el marcador no se
//! quede atrás de la cadencia de reportes.

use std::time::Duration;

use tokio::time::Instant;

use crate::utils::geo::Coordinate;

/// Un tramo animado sobre el círculo máximo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    pub from: Coordinate,
    pub to: Coordinate,
    pub started_at: Instant,
    pub window: Duration,
}

impl Animation {
    /// `min(transcurrido / ventana, 1)`
    pub fn fraction_at(&self, at: Instant) -> f64 {
        if self.window.is_zero() {
            return 1.0;
        }
        let elapsed = at.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.window.as_secs_f64()).min(1.0)
    }

    pub fn position_at(&self, at: Instant) -> Coordinate {
        self.from.great_circle_point(&self.to, self.fraction_at(at))
    }

    pub fn is_finished(&self, at: Instant) -> bool {
        self.fraction_at(at) >= 1.0
    }
}

/// Estado de la animación de un marcador
#[derive(Debug, Clone)]
pub struct MarkerAnimator {
    max_window: Duration,
    displayed: Option<Coordinate>,
    animation: Option<Animation>,
    last_report_at: Option<Instant>,
}

impl MarkerAnimator {
    pub fn new(max_window: Duration) -> Self {
        Self {
            max_window,
            displayed: None,
            animation: None,
            last_report_at: None,
        }
    }

    /// Nuevo reporte: abandona la animación en curso y arranca otra desde la
    /// posición mostrada. Sin posición previa el marcador aparece directo.
    pub fn on_report(&mut self, target: Coordinate, at: Instant) -> Option<Animation> {
        let current = self.displayed_at(at);
        let since_previous = self
            .last_report_at
            .map(|previous| at.saturating_duration_since(previous));
        self.last_report_at = Some(at);

        let (Some(from), Some(since_previous)) = (current, since_previous) else {
            self.displayed = Some(target);
            self.animation = None;
            return None;
        };

        let window = self.max_window.min(since_previous);
        if window.is_zero() || from == target {
            self.displayed = Some(target);
            self.animation = None;
            return None;
        }

        let animation = Animation {
            from,
            to: target,
            started_at: at,
            window,
        };
        self.displayed = Some(from);
        self.animation = Some(animation);
        Some(animation)
    }

    pub fn displayed_at(&self, at: Instant) -> Option<Coordinate> {
        match self.animation {
            Some(animation) => Some(animation.position_at(at)),
            None => self.displayed,
        }
    }

    pub fn animation(&self) -> Option<Animation> {
        self.animation
    }

    /// Destino final, tenga o no animación en curso
    pub fn target(&self) -> Option<Coordinate> {
        self.animation.map(|a| a.to).or(self.displayed)
    }

    pub fn is_animating(&self, at: Instant) -> bool {
        self.animation.map_or(false, |a| !a.is_finished(at))
    }
}

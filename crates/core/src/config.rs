//! Numeric constants of the canvas core.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables used by the phase classifier, viewport controller and
/// reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Gap between windows (and at both outer edges) in pixels.
    pub spacing: i32,
    /// Width of the expanded canvas as a multiple of the work-area width.
    pub expansion_ratio: f64,
    /// How far the viewport may pan left, as a fraction of work-area width.
    pub pan_left_ratio: f64,
    /// How far the viewport may pan right, as a fraction of work-area width.
    pub pan_right_ratio: f64,
    /// Pixel step for `scroll_left` / `scroll_right`.
    pub scroll_step: i32,
    /// Duration of an animated scroll.
    pub animation_duration_ms: u64,
    /// Interval between scroll animation ticks (~60 FPS).
    pub animation_tick_ms: u64,
    /// Fallback delay for applying a deferred clip.
    pub clip_fallback_ms: u64,
    /// Move discrepancies up to this many pixels are treated as rounding.
    pub correction_tolerance: i32,
    /// Delay used to coalesce retile requests.
    pub retile_delay_ms: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            spacing: 8,
            expansion_ratio: 2.0,
            pan_left_ratio: 0.5,
            pan_right_ratio: 0.5,
            scroll_step: 20,
            animation_duration_ms: 250,
            animation_tick_ms: 16,
            clip_fallback_ms: 50,
            correction_tolerance: 2,
            retile_delay_ms: 0,
        }
    }
}

impl CanvasConfig {
    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_duration_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.animation_tick_ms.max(1))
    }

    pub fn clip_fallback(&self) -> Duration {
        Duration::from_millis(self.clip_fallback_ms)
    }

    pub fn retile_delay(&self) -> Duration {
        Duration::from_millis(self.retile_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CanvasConfig::default();
        assert_eq!(config.spacing, 8);
        assert_eq!(config.expansion_ratio, 2.0);
        assert_eq!(config.scroll_step, 20);
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
        assert_eq!(config.clip_fallback(), Duration::from_millis(50));
    }

    #[test]
    fn test_zero_tick_never_schedules_busy_loop() {
        let config = CanvasConfig {
            animation_tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CanvasConfig = serde_json::from_str(r#"{"spacing": 12}"#).unwrap();
        assert_eq!(config.spacing, 12);
        assert_eq!(config.pan_left_ratio, 0.5);
        assert_eq!(config.animation_duration_ms, 250);
    }
}

//! Viewport math: pan limits, scroll animation and visibility tests.
//!
//! The viewport offset is the viewport's displacement over the canvas:
//! `0` shows the work area itself, positive values look further right.
//! A canvas-space x maps to screen x as `canvas_x - offset`.

use crate::config::CanvasConfig;
use crate::system::TimerId;
use crate::Rect;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum pan to the left and to the right, both as positive magnitudes.
pub fn pan_limits(work_area: Rect, config: &CanvasConfig) -> (f64, f64) {
    let width = f64::from(work_area.width.max(0));
    (
        width * config.pan_left_ratio.max(0.0),
        width * config.pan_right_ratio.max(0.0),
    )
}

/// Clamp an offset to `[-pan_left, +pan_right]`.
///
/// Non-finite input resets to the neutral offset.
pub fn clamp(offset: f64, work_area: Rect, config: &CanvasConfig) -> f64 {
    if !offset.is_finite() {
        return 0.0;
    }
    let (left, right) = pan_limits(work_area, config);
    offset.max(-left).min(right)
}

/// Ease-out quadratic: fast start, gentle arrival.
pub fn ease_out_quad(progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - p) * (1.0 - p)
}

/// Visible part of the canvas for a work area and offset, in canvas space.
pub fn viewport_bounds(work_area: Rect, offset: f64) -> Rect {
    work_area.shifted_x(offset.floor() as i32)
}

/// Offset that brings `window` (canvas space) into view, or `None` when it
/// already is.
///
/// Windows sticking out on the left align their left edge with the viewport,
/// windows sticking out on the right align their right edge. The result is
/// not clamped.
pub fn ensure_visible_target(window: Rect, work_area: Rect, offset: f64) -> Option<f64> {
    let bounds = viewport_bounds(work_area, offset);
    if window.x < bounds.x {
        Some(f64::from(window.x) - f64::from(work_area.x))
    } else if window.right() > bounds.right() {
        Some(f64::from(window.right()) - f64::from(work_area.right()))
    } else {
        None
    }
}

/// Where a window sits relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Entirely inside the viewport.
    Full,
    /// Straddles a viewport edge.
    Partial,
    /// Entirely left of the viewport.
    OffScreenLeft,
    /// Entirely right of the viewport.
    OffScreenRight,
}

impl Visibility {
    /// Horizontal visibility of `window` against `viewport`.
    pub fn of(window: Rect, viewport: Rect) -> Self {
        if window.right() <= viewport.x {
            Visibility::OffScreenLeft
        } else if window.x >= viewport.right() {
            Visibility::OffScreenRight
        } else if window.x >= viewport.x && window.right() <= viewport.right() {
            Visibility::Full
        } else {
            Visibility::Partial
        }
    }

    pub fn is_full(self) -> bool {
        self == Visibility::Full
    }

    /// Whether any part of the window is on screen.
    pub fn is_any(self) -> bool {
        matches!(self, Visibility::Full | Visibility::Partial)
    }
}

/// Result of advancing a scroll animation by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimationStep {
    Running(f64),
    Finished(f64),
}

/// An in-flight animated scroll owned by one canvas.
///
/// Time advances in whole ticks rather than by reading a clock, so a run of
/// ticks is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollAnimation {
    from: f64,
    to: f64,
    elapsed: Duration,
    duration: Duration,
    timer: TimerId,
}

impl ScrollAnimation {
    pub fn new(from: f64, to: f64, duration: Duration, timer: TimerId) -> Self {
        Self {
            from,
            to,
            elapsed: Duration::ZERO,
            duration,
            timer,
        }
    }

    pub fn target(&self) -> f64 {
        self.to
    }

    /// Timer currently armed for the next tick.
    pub fn timer(&self) -> TimerId {
        self.timer
    }

    pub fn rearm(&mut self, timer: TimerId) {
        self.timer = timer;
    }

    pub fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        self.elapsed.as_secs_f64() / self.duration.as_secs_f64()
    }

    pub fn advance(&mut self, tick: Duration) -> AnimationStep {
        self.elapsed += tick;
        let progress = self.progress();
        if progress >= 1.0 {
            AnimationStep::Finished(self.to)
        } else {
            let eased = ease_out_quad(progress);
            AnimationStep::Running(self.from + (self.to - self.from) * eased)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_area() -> Rect {
        Rect::new(0, 0, 1280, 720)
    }

    #[test]
    fn test_pan_limits_follow_ratios() {
        let config = CanvasConfig::default();
        assert_eq!(pan_limits(work_area(), &config), (640.0, 640.0));

        let lopsided = CanvasConfig {
            pan_left_ratio: 0.25,
            pan_right_ratio: 1.0,
            ..Default::default()
        };
        assert_eq!(pan_limits(work_area(), &lopsided), (320.0, 1280.0));
    }

    #[test]
    fn test_clamp_bounds_and_idempotence() {
        let config = CanvasConfig::default();
        let mut x = -5000.0;
        while x <= 5000.0 {
            let once = clamp(x, work_area(), &config);
            assert!((-640.0..=640.0).contains(&once));
            assert_eq!(clamp(once, work_area(), &config), once);
            x += 37.5;
        }
    }

    #[test]
    fn test_clamp_non_finite() {
        let config = CanvasConfig::default();
        assert_eq!(clamp(f64::NAN, work_area(), &config), 0.0);
        assert_eq!(clamp(f64::INFINITY, work_area(), &config), 0.0);
    }

    #[test]
    fn test_ease_out_quad_endpoints() {
        assert_eq!(ease_out_quad(0.0), 0.0);
        assert_eq!(ease_out_quad(1.0), 1.0);
        assert_eq!(ease_out_quad(0.5), 0.75);
        assert_eq!(ease_out_quad(2.0), 1.0);
    }

    #[test]
    fn test_animation_converges_exactly() {
        let mut anim =
            ScrollAnimation::new(-123.0, 417.0, Duration::from_millis(250), TimerId(1));
        let mut last = -123.0;
        let mut ticks = 0;
        loop {
            ticks += 1;
            match anim.advance(Duration::from_millis(16)) {
                AnimationStep::Running(offset) => {
                    assert!(offset >= last, "ease-out must be monotonic");
                    last = offset;
                }
                AnimationStep::Finished(offset) => {
                    assert_eq!(offset, 417.0);
                    break;
                }
            }
        }
        // ceil(250 / 16)
        assert_eq!(ticks, 16);
    }

    #[test]
    fn test_zero_duration_finishes_on_first_tick() {
        let mut anim = ScrollAnimation::new(0.0, 50.0, Duration::ZERO, TimerId(1));
        assert_eq!(
            anim.advance(Duration::from_millis(16)),
            AnimationStep::Finished(50.0)
        );
    }

    #[test]
    fn test_ensure_visible_target() {
        let wa = work_area();
        // Left of the viewport
        assert_eq!(
            ensure_visible_target(Rect::new(-300, 0, 400, 100), wa, 0.0),
            Some(-300.0)
        );
        // Right of the viewport: align right edges
        assert_eq!(
            ensure_visible_target(Rect::new(1100, 0, 400, 100), wa, 0.0),
            Some(220.0)
        );
        // Already visible
        assert_eq!(ensure_visible_target(Rect::new(100, 0, 400, 100), wa, 0.0), None);
        // Visible once panned
        assert_eq!(
            ensure_visible_target(Rect::new(1100, 0, 400, 100), wa, 220.0),
            None
        );
    }

    #[test]
    fn test_visibility_classification() {
        let viewport = Rect::new(0, 0, 1280, 720);
        assert_eq!(Visibility::of(Rect::new(10, 0, 100, 10), viewport), Visibility::Full);
        assert_eq!(Visibility::of(Rect::new(-50, 0, 100, 10), viewport), Visibility::Partial);
        assert_eq!(
            Visibility::of(Rect::new(-100, 0, 100, 10), viewport),
            Visibility::OffScreenLeft
        );
        assert_eq!(
            Visibility::of(Rect::new(1280, 0, 100, 10), viewport),
            Visibility::OffScreenRight
        );
        assert!(Visibility::Partial.is_any());
        assert!(!Visibility::Partial.is_full());
    }
}

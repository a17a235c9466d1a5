//! Visual reconciliation: make a window look like it sits at its target even
//! when its frame cannot be put there.
//!
//! The window system only accepts frames it considers reachable, so a window
//! whose target starts left of the viewport is placed with its left edge on
//! the viewport edge. Its rendered surface is then translated back to the
//! target position and clipped to the viewport.
//!
//! Right-edge overflow does not clamp the frame. It is only clipped.

use crate::system::{SurfaceId, SurfaceResult, WindowSystem};
use crate::tile_info::TileRect;
use crate::{Point, Rect};

/// The screen-space viewport a pass reconciles against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileViewport {
    /// Visible work area in screen space.
    pub bounds: Rect,
    /// Horizontal shift applied to canvas-space targets: the negated
    /// viewport offset.
    pub shift: f64,
}

impl ReconcileViewport {
    pub fn new(bounds: Rect, viewport_offset: f64) -> Self {
        Self {
            bounds,
            shift: -viewport_offset,
        }
    }
}

/// Clip to apply to a surface, in the surface's own coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipAction {
    /// Nothing is visible: zero-size clip.
    Hide,
    /// The whole surface is visible: no clip.
    Clear,
    Set(Rect),
}

/// How the rendered surface has to be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Frame and surface coincide with the target; any clip or translation
    /// left over from earlier passes is removed.
    Direct,
    /// The surface is shifted away from its frame and clipped.
    Shifted { translation: Point, clip: ClipAction },
}

/// Outcome of planning one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualPlan {
    /// Frame to request from the window system.
    pub frame: Rect,
    /// Offset of the rendered buffer from the frame.
    pub buffer_offset: Point,
    pub presentation: Presentation,
}

impl VisualPlan {
    /// Where the frame was asked to go.
    pub fn frame_position(&self) -> Point {
        self.frame.origin()
    }
}

/// Discrepancy between a requested frame position and where the window
/// system actually put the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionCorrection {
    pub dx: i32,
    pub dy: i32,
}

impl PositionCorrection {
    /// Compare a request with its result. Differences within `tolerance` on
    /// both axes are rounding and yield `None`.
    pub fn observe(requested: Point, actual: Point, tolerance: i32) -> Option<Self> {
        let dx = requested.x.saturating_sub(actual.x);
        let dy = requested.y.saturating_sub(actual.y);
        if dx.saturating_abs() > tolerance || dy.saturating_abs() > tolerance {
            Some(Self { dx, dy })
        } else {
            None
        }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Plan the frame request and surface presentation for one window.
///
/// `frame` and `buffer` are the window's current geometry; only their
/// relative offset and size difference are used, so a pending resize keeps
/// the same decoration margins.
pub fn plan(
    target: &TileRect,
    viewport: ReconcileViewport,
    frame: Rect,
    buffer: Rect,
    correction: PositionCorrection,
) -> VisualPlan {
    let target_left = (target.x + viewport.shift).floor() as i32;
    let target_width = target.width.floor() as i32;
    let target_right = target_left.saturating_add(target_width);
    let target_top = target.y.floor() as i32;
    let target_height = target.height.floor() as i32;

    let viewport_left = viewport.bounds.x;
    let viewport_right = viewport.bounds.right();

    let clamped_left = if target_left < viewport_left {
        viewport_left
    } else {
        target_left
    };
    let translation = target_left.saturating_sub(clamped_left);

    let requested = Rect::new(clamped_left, target_top, target_width, target_height);
    let buffer_offset = Point::new(
        buffer.x.saturating_sub(frame.x),
        buffer.y.saturating_sub(frame.y),
    );

    if translation == 0 && target_right <= viewport_right {
        return VisualPlan {
            frame: requested,
            buffer_offset,
            presentation: Presentation::Direct,
        };
    }

    let buffer_width = target_width.saturating_add(buffer.width.saturating_sub(frame.width));
    let buffer_height = target_height.saturating_add(buffer.height.saturating_sub(frame.height));

    let visual_left = clamped_left
        .saturating_add(buffer_offset.x)
        .saturating_add(translation);
    let visual_right = visual_left.saturating_add(buffer_width);
    let visible_left = visual_left.max(viewport_left);
    let visible_right = visual_right.min(viewport_right);
    let clip_width = visible_right.saturating_sub(visible_left);

    let clip = if clip_width <= 0 {
        ClipAction::Hide
    } else if visible_left == visual_left && clip_width >= buffer_width {
        ClipAction::Clear
    } else {
        ClipAction::Set(Rect::new(
            visible_left.saturating_sub(visual_left),
            0,
            clip_width,
            buffer_height,
        ))
    };

    VisualPlan {
        frame: requested,
        buffer_offset,
        presentation: Presentation::Shifted {
            translation: Point::new(translation.saturating_add(correction.dx), correction.dy),
            clip,
        },
    }
}

/// Apply a plan's presentation to a surface whose frame currently sits at
/// `frame`.
///
/// A direct presentation snaps the surface onto the live frame, not onto the
/// planned one.
pub fn apply<W: WindowSystem + ?Sized>(
    system: &mut W,
    surface: SurfaceId,
    plan: &VisualPlan,
    frame: Point,
) -> SurfaceResult<()> {
    match plan.presentation {
        Presentation::Direct => {
            system.cancel_transitions(surface)?;
            system.clear_clip(surface)?;
            system.set_translation(surface, Point::ORIGIN)?;
            system.set_surface_position(surface, frame.offset(plan.buffer_offset))?;
        }
        Presentation::Shifted { translation, clip } => {
            match clip {
                ClipAction::Hide => system.set_clip(surface, Rect::default())?,
                ClipAction::Clear => system.clear_clip(surface)?,
                ClipAction::Set(rect) => system.set_clip(surface, rect)?,
            }
            system.set_translation(surface, translation)?;
        }
    }
    system.queue_relayout(surface)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Rect = Rect {
        x: 0,
        y: 0,
        width: 1280,
        height: 720,
    };

    fn unpanned() -> ReconcileViewport {
        ReconcileViewport::new(VIEWPORT, 0.0)
    }

    #[test]
    fn test_inside_viewport_is_direct() {
        let frame = Rect::new(50, 0, 400, 700);
        let plan = plan(
            &TileRect::new(100.0, 10.0, 400.0, 700.0),
            unpanned(),
            frame,
            frame,
            PositionCorrection::default(),
        );
        assert_eq!(plan.presentation, Presentation::Direct);
        assert_eq!(plan.frame_position(), Point::new(100, 10));
        assert_eq!(plan.frame, Rect::new(100, 10, 400, 700));
    }

    #[test]
    fn test_left_overflow_clamps_translates_and_clips() {
        let frame = Rect::new(0, 0, 400, 700);
        let plan = plan(
            &TileRect::new(-300.0, 0.0, 400.0, 700.0),
            unpanned(),
            frame,
            frame,
            PositionCorrection::default(),
        );
        assert_eq!(plan.frame_position(), Point::new(0, 0));
        assert_eq!(
            plan.presentation,
            Presentation::Shifted {
                translation: Point::new(-300, 0),
                clip: ClipAction::Set(Rect::new(300, 0, 100, 700)),
            }
        );
    }

    #[test]
    fn test_fully_left_of_viewport_hides() {
        let frame = Rect::new(0, 0, 400, 700);
        let plan = plan(
            &TileRect::new(-500.0, 0.0, 400.0, 700.0),
            unpanned(),
            frame,
            frame,
            PositionCorrection::default(),
        );
        assert_eq!(plan.frame_position(), Point::new(0, 0));
        assert_eq!(
            plan.presentation,
            Presentation::Shifted {
                translation: Point::new(-500, 0),
                clip: ClipAction::Hide,
            }
        );
    }

    #[test]
    fn test_right_overflow_is_clipped_not_clamped() {
        let frame = Rect::new(0, 0, 400, 700);
        let plan = plan(
            &TileRect::new(1000.0, 0.0, 400.0, 700.0),
            unpanned(),
            frame,
            frame,
            PositionCorrection::default(),
        );
        assert_eq!(plan.frame_position(), Point::new(1000, 0));
        assert_eq!(
            plan.presentation,
            Presentation::Shifted {
                translation: Point::new(0, 0),
                clip: ClipAction::Set(Rect::new(0, 0, 280, 700)),
            }
        );
    }

    #[test]
    fn test_out_of_range_target_saturates() {
        let frame = Rect::new(0, 0, 400, 700);
        let plan = plan(
            &TileRect::new(2e9, 0.0, 2e9, 700.0),
            unpanned(),
            frame,
            frame,
            PositionCorrection::default(),
        );
        assert_eq!(plan.frame_position(), Point::new(i32::MAX, 0));
        assert_eq!(
            plan.presentation,
            Presentation::Shifted {
                translation: Point::new(0, 0),
                clip: ClipAction::Hide,
            }
        );
    }

    #[test]
    fn test_direct_presentation_follows_live_frame() {
        use crate::headless::HeadlessWindowSystem;

        let mut system = HeadlessWindowSystem::new();
        let surface = system.add_window(1, 0, 0, Rect::new(110, 0, 400, 700));
        system.set_translation(surface, Point::new(-40, 0)).unwrap();
        system.set_clip(surface, Rect::new(40, 0, 360, 700)).unwrap();

        let frame = Rect::new(0, 0, 400, 700);
        let plan = plan(
            &TileRect::new(100.0, 0.0, 400.0, 700.0),
            unpanned(),
            frame,
            frame,
            PositionCorrection::default(),
        );
        assert_eq!(plan.presentation, Presentation::Direct);

        apply(&mut system, surface, &plan, Point::new(110, 0)).unwrap();
        let shown = system.surface(surface).unwrap();
        assert_eq!(shown.position, Point::new(110, 0));
        assert_eq!(shown.translation, Point::ORIGIN);
        assert_eq!(shown.clip, None);
    }

    #[test]
    fn test_viewport_shift_moves_target() {
        // Panned 200px right: canvas x=100 lands at screen x=-100
        let frame = Rect::new(0, 0, 400, 700);
        let plan = plan(
            &TileRect::new(100.0, 0.0, 400.0, 700.0),
            ReconcileViewport::new(VIEWPORT, 200.0),
            frame,
            frame,
            PositionCorrection::default(),
        );
        assert_eq!(plan.frame_position(), Point::new(0, 0));
        assert_eq!(
            plan.presentation,
            Presentation::Shifted {
                translation: Point::new(-100, 0),
                clip: ClipAction::Set(Rect::new(100, 0, 300, 700)),
            }
        );
    }

    #[test]
    fn test_buffer_offset_shifts_clip_origin() {
        // Buffer has a 10px shadow margin on every side
        let frame = Rect::new(0, 0, 400, 700);
        let buffer = Rect::new(-10, -10, 420, 720);
        let plan = plan(
            &TileRect::new(-300.0, 0.0, 400.0, 700.0),
            unpanned(),
            frame,
            buffer,
            PositionCorrection::default(),
        );
        assert_eq!(plan.buffer_offset, Point::new(-10, -10));
        // Visual buffer spans [-310, 110); visible [0, 110)
        assert_eq!(
            plan.presentation,
            Presentation::Shifted {
                translation: Point::new(-300, 0),
                clip: ClipAction::Set(Rect::new(310, 0, 110, 720)),
            }
        );
    }

    #[test]
    fn test_correction_is_added_to_translation() {
        let frame = Rect::new(0, 0, 400, 700);
        let plan = plan(
            &TileRect::new(-300.0, 0.0, 400.0, 700.0),
            unpanned(),
            frame,
            frame,
            PositionCorrection { dx: -12, dy: 4 },
        );
        match plan.presentation {
            Presentation::Shifted { translation, .. } => {
                assert_eq!(translation, Point::new(-312, 4));
            }
            other => panic!("expected shifted presentation, got {:?}", other),
        }
    }

    #[test]
    fn test_fractional_targets_are_floored() {
        let frame = Rect::new(0, 0, 400, 700);
        let plan = plan(
            &TileRect::new(10.9, 5.5, 400.9, 700.2),
            unpanned(),
            frame,
            frame,
            PositionCorrection::default(),
        );
        assert_eq!(plan.frame, Rect::new(10, 5, 400, 700));
    }

    #[test]
    fn test_observe_correction_tolerance() {
        let requested = Point::new(0, 0);
        assert_eq!(PositionCorrection::observe(requested, Point::new(2, -2), 2), None);
        assert_eq!(
            PositionCorrection::observe(requested, Point::new(30, 0), 2),
            Some(PositionCorrection { dx: -30, dy: 0 })
        );
        assert!(PositionCorrection::default().is_zero());
    }
}

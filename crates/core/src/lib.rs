//! widedesk core
//!
//! Layout/viewport core of a scrollable tiling desktop.
//!
//! Windows are arranged on a canvas up to twice as wide as the visible work
//! area. The monitor shows a 100%-wide slice of that canvas (the viewport),
//! and windows that straddle or leave the viewport are presented through
//! clipping and translation of their rendered surfaces instead of being
//! moved off-screen.
//!
//! This crate keeps three models in sync:
//! - the intended layout (target rectangles produced by an external tiler),
//! - the frame geometry the window system actually applied,
//! - the visual state of each rendered surface (position, clip, translation).
//!
//! The window system, timer scheduling and the tiler are reached through the
//! [`WindowSystem`], [`Scheduler`] and [`Tiler`] traits, so the crate performs
//! no I/O of its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aux_state;
pub mod canvas;
pub mod clones;
pub mod config;
pub mod engine;
pub mod headless;
pub mod phase;
pub mod reconcile;
pub mod retile;
pub mod system;
pub mod tile_info;
pub mod viewport;

pub use aux_state::AuxStore;
pub use canvas::{CanvasKey, CanvasRegistry, CanvasState};
pub use clones::{CloneManager, CloneProxy};
pub use config::CanvasConfig;
pub use engine::{CanvasEngine, LayoutFrame, PassReport};
pub use phase::{classify, effective_work_area, Phase};
pub use reconcile::{ClipAction, PositionCorrection, Presentation, ReconcileViewport, VisualPlan};
pub use retile::{RetileRequest, RetileTarget, RetileTrigger, Tiler};
pub use system::{
    Scheduler, SubscriptionId, SurfaceError, SurfaceId, SurfaceResult, TimerId, TimerTask,
    WindowSystem,
};
pub use tile_info::{TileDescriptor, TileInfo, TileLevel, TileRect};
pub use viewport::Visibility;

/// Unique identifier for a window, stable for the window's lifetime.
pub type WindowId = u64;

/// Index of a monitor as reported by the window system.
pub type MonitorIndex = usize;

/// Index of a workspace as reported by the window system.
pub type WorkspaceIndex = usize;

/// Errors that abort a canvas operation instead of partially applying it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CanvasError {
    #[error("No usable work area for monitor {monitor}, workspace {workspace}")]
    MissingWorkArea {
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
    },

    #[error("Invalid geometry: {0:?}")]
    InvalidGeometry(Rect),

    #[error("Window {0} is not known to the window system")]
    UnknownWindow(WindowId),
}

/// A point in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate this point by another point used as a delta.
    pub fn offset(self, delta: Point) -> Self {
        Self::new(self.x.saturating_add(delta.x), self.y.saturating_add(delta.y))
    }
}

/// A rectangle in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check if this rectangle intersects with another.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Check if `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.right() <= self.right()
            && other.y >= self.y
            && other.bottom() <= self.bottom()
    }

    /// Get the right edge x-coordinate.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Get the bottom edge y-coordinate.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Whether the rectangle has a positive area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Same size, moved horizontally by `dx`.
    pub fn shifted_x(&self, dx: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y, self.width, self.height)
    }
}

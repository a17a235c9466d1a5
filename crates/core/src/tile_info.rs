//! Layout produced by the external tiler.
//!
//! A [`TileInfo`] is read-only to the core. It is consumed once per
//! reconciliation pass, and only the per-window lookup table derived from it
//! lives for the duration of that pass.

use crate::{Rect, WindowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest coordinate magnitude accepted from the tiler. Leaves headroom
/// for viewport shifts in `i32` pixel space.
pub const COORDINATE_LIMIT: i32 = 1 << 30;

/// A target rectangle in canvas space. Fractional values are floored when
/// reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TileRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl TileRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle is finite, has no negative extent and keeps
    /// both of its edges within [`COORDINATE_LIMIT`].
    pub fn is_representable(&self) -> bool {
        let limit = f64::from(COORDINATE_LIMIT);
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
            && self.x.abs() + self.width <= limit
            && self.y.abs() + self.height <= limit
    }

    /// Integer rectangle with every component floored.
    pub fn floor(&self) -> Rect {
        Rect::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.width.floor() as i32,
            self.height.floor() as i32,
        )
    }
}

impl From<Rect> for TileRect {
    fn from(rect: Rect) -> Self {
        Self::new(
            f64::from(rect.x),
            f64::from(rect.y),
            f64::from(rect.width),
            f64::from(rect.height),
        )
    }
}

/// Where the tiler wants one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub id: WindowId,
    pub target_x: f64,
    pub target_y: f64,
    pub width: f64,
    pub height: f64,
}

impl TileDescriptor {
    pub fn new(id: WindowId, target: TileRect) -> Self {
        Self {
            id,
            target_x: target.x,
            target_y: target.y,
            width: target.width,
            height: target.height,
        }
    }

    pub fn rect(&self) -> TileRect {
        TileRect::new(self.target_x, self.target_y, self.width, self.height)
    }
}

/// One row of the tiler's output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileLevel {
    pub windows: Vec<TileDescriptor>,
}

/// The tiler's output for one workspace on one monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    pub levels: Vec<TileLevel>,
}

impl TileInfo {
    pub fn new(levels: Vec<TileLevel>) -> Self {
        Self { levels }
    }

    /// A layout with a single level.
    pub fn single_level(windows: Vec<TileDescriptor>) -> Self {
        Self {
            levels: vec![TileLevel { windows }],
        }
    }

    /// All descriptors, level by level.
    pub fn descriptors(&self) -> impl Iterator<Item = &TileDescriptor> + '_ {
        self.levels.iter().flat_map(|level| level.windows.iter())
    }

    /// Lookup table by window id. A window listed twice keeps its last entry.
    pub fn by_window(&self) -> HashMap<WindowId, TileRect> {
        self.descriptors().map(|d| (d.id, d.rect())).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors().next().is_none()
    }
}

//! Canvas state per (workspace, monitor) pair.

use crate::config::CanvasConfig;
use crate::phase::Phase;
use crate::system::WindowSystem;
use crate::viewport::{self, ScrollAnimation};
use crate::{CanvasError, MonitorIndex, Rect, WorkspaceIndex};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// Key of a canvas: one per workspace per monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanvasKey {
    pub workspace: WorkspaceIndex,
    pub monitor: MonitorIndex,
}

impl CanvasKey {
    pub fn new(monitor: MonitorIndex, workspace: WorkspaceIndex) -> Self {
        Self { workspace, monitor }
    }
}

/// Viewport and phase of one canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasState {
    /// Work area last reported by the window system.
    pub work_area: Rect,
    /// Viewport displacement over the canvas. Always within the pan limits.
    pub viewport_offset: f64,
    pub phase: Phase,
    pub(crate) animation: Option<ScrollAnimation>,
}

impl CanvasState {
    pub fn new(work_area: Rect) -> Self {
        Self {
            work_area,
            viewport_offset: 0.0,
            phase: Phase::Fits,
            animation: None,
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Offset the running animation is heading to, if any.
    pub fn animation_target(&self) -> Option<f64> {
        self.animation.as_ref().map(ScrollAnimation::target)
    }

    /// The visible slice of the canvas, in canvas space.
    pub fn viewport_bounds(&self) -> Rect {
        viewport::viewport_bounds(self.work_area, self.viewport_offset)
    }

    /// Replace the work area and pull the offset back inside the new limits.
    pub(crate) fn set_work_area(&mut self, work_area: Rect, config: &CanvasConfig) {
        self.work_area = work_area;
        self.viewport_offset = viewport::clamp(self.viewport_offset, work_area, config);
    }
}

/// Lazily populated registry of canvases.
///
/// Entries are created on first access and live until [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct CanvasRegistry {
    states: HashMap<CanvasKey, CanvasState>,
}

impl CanvasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a canvas, creating it from the live work area if needed.
    ///
    /// The work area is refreshed from the window system on every access.
    /// If the window system has no usable work area, an existing canvas keeps
    /// its last known one and a missing canvas is an error.
    pub fn get<W: WindowSystem + ?Sized>(
        &mut self,
        system: &W,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
        config: &CanvasConfig,
    ) -> Result<&mut CanvasState, CanvasError> {
        let live = system
            .work_area(monitor, workspace)
            .filter(|work_area| !work_area.is_empty());

        match self.states.entry(CanvasKey::new(monitor, workspace)) {
            Entry::Occupied(entry) => {
                let state = entry.into_mut();
                if let Some(work_area) = live {
                    if work_area != state.work_area {
                        debug!(
                            "Work area of monitor {} workspace {} changed: {:?} -> {:?}",
                            monitor, workspace, state.work_area, work_area
                        );
                        state.set_work_area(work_area, config);
                    }
                }
                Ok(state)
            }
            Entry::Vacant(entry) => {
                let work_area =
                    live.ok_or(CanvasError::MissingWorkArea { monitor, workspace })?;
                debug!(
                    "Created canvas for monitor {} workspace {} ({:?})",
                    monitor, workspace, work_area
                );
                Ok(entry.insert(CanvasState::new(work_area)))
            }
        }
    }

    /// Look up a canvas without creating or refreshing it.
    pub fn peek(&self, key: CanvasKey) -> Option<&CanvasState> {
        self.states.get(&key)
    }

    pub fn peek_mut(&mut self, key: CanvasKey) -> Option<&mut CanvasState> {
        self.states.get_mut(&key)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&CanvasKey, &mut CanvasState)> + '_ {
        self.states.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop every canvas, returning them for final cleanup.
    pub fn clear(&mut self) -> Vec<(CanvasKey, CanvasState)> {
        self.states.drain().collect()
    }
}

//! Collaborator interfaces: the window system and the timer scheduler.
//!
//! The core never owns windows or surfaces. It observes them and requests
//! changes through [`WindowSystem`], and it never sleeps: delayed work is
//! handed to a [`Scheduler`] which later reports back through
//! [`CanvasEngine::on_timer`](crate::CanvasEngine::on_timer).

use crate::canvas::CanvasKey;
use crate::{MonitorIndex, Point, Rect, WindowId, WorkspaceIndex};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Handle to a rendered surface (a window's actor or a clone of it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

/// Handle to a "frame position changed" subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Handle to a scheduled one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Failures talking to externally owned surfaces.
///
/// None of these are fatal. The surface is treated as gone, its tracking
/// state is pruned, and the current pass moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Surface {0:?} has been disposed")]
    Gone(SurfaceId),

    #[error("Window {0} has no rendered surface")]
    NoSurface(WindowId),

    #[error("Window {0} no longer exists")]
    WindowGone(WindowId),
}

pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// The window system as seen by the core.
///
/// Queries return `None` for windows the window system no longer knows.
/// Surface operations return [`SurfaceError::Gone`] when the surface was
/// disposed underneath us.
pub trait WindowSystem {
    /// Logical frame rectangle enforced by the window system.
    fn frame_rect(&self, window: WindowId) -> Option<Rect>;

    /// Rectangle of the rendered buffer; may be offset from the frame.
    fn buffer_rect(&self, window: WindowId) -> Option<Rect>;

    fn monitor_of(&self, window: WindowId) -> Option<MonitorIndex>;

    fn workspace_of(&self, window: WindowId) -> Option<WorkspaceIndex>;

    /// The window's rendered surface, if it currently has one.
    fn surface_of(&self, window: WindowId) -> Option<SurfaceId>;

    fn work_area(&self, monitor: MonitorIndex, workspace: WorkspaceIndex) -> Option<Rect>;

    /// Ask the window system to move/resize a window's frame.
    ///
    /// There is no synchronous result; the effect is observed later through
    /// [`frame_rect`](Self::frame_rect) or a frame-moved notification.
    fn request_frame(&mut self, window: WindowId, frame: Rect);

    fn surface_position(&self, surface: SurfaceId) -> SurfaceResult<Point>;
    fn set_surface_position(&mut self, surface: SurfaceId, position: Point) -> SurfaceResult<()>;

    fn clip(&self, surface: SurfaceId) -> SurfaceResult<Option<Rect>>;
    fn set_clip(&mut self, surface: SurfaceId, clip: Rect) -> SurfaceResult<()>;
    fn clear_clip(&mut self, surface: SurfaceId) -> SurfaceResult<()>;

    fn translation(&self, surface: SurfaceId) -> SurfaceResult<Point>;
    fn set_translation(&mut self, surface: SurfaceId, translation: Point) -> SurfaceResult<()>;

    fn opacity(&self, surface: SurfaceId) -> SurfaceResult<u8>;
    fn set_opacity(&mut self, surface: SurfaceId, opacity: u8) -> SurfaceResult<()>;

    fn set_visible(&mut self, surface: SurfaceId, visible: bool) -> SurfaceResult<()>;

    /// Stop any in-flight visual transition on the surface.
    fn cancel_transitions(&mut self, surface: SurfaceId) -> SurfaceResult<()>;

    fn queue_relayout(&mut self, surface: SurfaceId) -> SurfaceResult<()>;

    /// Create a free-floating duplicate of `source`'s rendered content.
    fn create_clone(&mut self, source: SurfaceId) -> SurfaceResult<SurfaceId>;

    /// Dispose a surface previously returned by [`create_clone`](Self::create_clone).
    fn destroy_surface(&mut self, surface: SurfaceId) -> SurfaceResult<()>;

    /// Subscribe to the window's "frame position changed" notification.
    ///
    /// Returns `None` if the window cannot be subscribed to (already gone).
    fn subscribe_frame_moved(&mut self, window: WindowId) -> Option<SubscriptionId>;

    fn unsubscribe(&mut self, subscription: SubscriptionId);

    /// Liveness check for a surface.
    fn check_alive(&self, surface: SurfaceId) -> SurfaceResult<()> {
        self.opacity(surface).map(|_| ())
    }
}

/// Work the core asks to be called back for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerTask {
    /// Advance the scroll animation of one canvas by one tick.
    ScrollTick(CanvasKey),
    /// Apply a window's deferred clip if the frame-moved notification never came.
    ClipFallback(WindowId),
    /// Hand the coalesced retile requests to the tiler.
    RetileFlush,
}

/// One-shot timer scheduling on the host's event loop.
pub trait Scheduler {
    /// Arrange for `task` to be delivered after `delay`.
    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerId;

    /// Revoke a timer. Cancelling an already fired or unknown timer is a no-op.
    fn cancel(&mut self, timer: TimerId);
}

//! In-memory collaborators.
//!
//! [`HeadlessWindowSystem`] keeps frames and surfaces in memory and can be
//! told to refuse or bend move requests, the way a real window system
//! sometimes does. [`ManualScheduler`] fires timers only when its clock is
//! advanced. Both back the daemon's dry-run mode and the test suites.

use crate::engine::CanvasEngine;
use crate::retile::{RetileRequest, Tiler};
use crate::system::{
    Scheduler, SubscriptionId, SurfaceError, SurfaceId, SurfaceResult, TimerId, TimerTask,
    WindowSystem,
};
use crate::{MonitorIndex, Point, Rect, WindowId, WorkspaceIndex};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// How the headless window system answers move requests for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePolicy {
    /// Apply the requested frame exactly.
    #[default]
    Honor,
    /// Ignore move requests entirely.
    Ignore,
    /// Keep the frame horizontally inside the work area.
    ClampToWorkArea,
    /// Apply the request displaced by a fixed delta.
    Nudge(Point),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessWindow {
    pub monitor: MonitorIndex,
    pub workspace: WorkspaceIndex,
    pub frame: Rect,
    /// Buffer origin relative to the frame origin.
    pub buffer_offset: Point,
    pub surface: Option<SurfaceId>,
    pub policy: FramePolicy,
}

impl HeadlessWindow {
    pub fn buffer(&self) -> Rect {
        let origin = self.frame.origin().offset(self.buffer_offset);
        Rect::new(origin.x, origin.y, self.frame.width, self.frame.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessSurface {
    pub position: Point,
    pub clip: Option<Rect>,
    pub translation: Point,
    pub opacity: u8,
    pub visible: bool,
    pub clone_of: Option<SurfaceId>,
    pub relayouts: u32,
}

impl HeadlessSurface {
    fn at(position: Point) -> Self {
        Self {
            position,
            clip: None,
            translation: Point::ORIGIN,
            opacity: 255,
            visible: true,
            clone_of: None,
            relayouts: 0,
        }
    }
}

/// Window system that lives entirely in memory.
#[derive(Debug, Default)]
pub struct HeadlessWindowSystem {
    windows: BTreeMap<WindowId, HeadlessWindow>,
    surfaces: HashMap<SurfaceId, HeadlessSurface>,
    work_areas: HashMap<(MonitorIndex, WorkspaceIndex), Rect>,
    subscriptions: HashMap<SubscriptionId, WindowId>,
    notifications: Vec<WindowId>,
    move_requests: Vec<(WindowId, Rect)>,
    next_surface: u64,
    next_subscription: u64,
}

impl HeadlessWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_work_area(&mut self, monitor: MonitorIndex, workspace: WorkspaceIndex, area: Rect) {
        self.work_areas.insert((monitor, workspace), area);
    }

    pub fn clear_work_area(&mut self, monitor: MonitorIndex, workspace: WorkspaceIndex) {
        self.work_areas.remove(&(monitor, workspace));
    }

    /// Map a window with a rendered surface placed on its frame.
    pub fn add_window(
        &mut self,
        id: WindowId,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
        frame: Rect,
    ) -> SurfaceId {
        let surface = self.alloc_surface(HeadlessSurface::at(frame.origin()));
        self.windows.insert(
            id,
            HeadlessWindow {
                monitor,
                workspace,
                frame,
                buffer_offset: Point::ORIGIN,
                surface: Some(surface),
                policy: FramePolicy::Honor,
            },
        );
        surface
    }

    /// Map a window that has no rendered surface yet.
    pub fn add_window_without_surface(
        &mut self,
        id: WindowId,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
        frame: Rect,
    ) {
        self.windows.insert(
            id,
            HeadlessWindow {
                monitor,
                workspace,
                frame,
                buffer_offset: Point::ORIGIN,
                surface: None,
                policy: FramePolicy::Honor,
            },
        );
    }

    /// Unmap a window, disposing its surface and subscriptions.
    pub fn remove_window(&mut self, id: WindowId) -> bool {
        let Some(window) = self.windows.remove(&id) else {
            return false;
        };
        if let Some(surface) = window.surface {
            self.surfaces.remove(&surface);
        }
        self.subscriptions.retain(|_, watched| *watched != id);
        self.notifications.retain(|&notified| notified != id);
        true
    }

    /// Dispose a surface behind the core's back.
    pub fn dispose_surface(&mut self, surface: SurfaceId) -> bool {
        self.surfaces.remove(&surface).is_some()
    }

    pub fn set_frame_policy(&mut self, id: WindowId, policy: FramePolicy) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.policy = policy;
        }
    }

    pub fn set_buffer_offset(&mut self, id: WindowId, offset: Point) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.buffer_offset = offset;
            if let Some(surface) = window.surface.and_then(|s| self.surfaces.get_mut(&s)) {
                surface.position = window.frame.origin().offset(offset);
            }
        }
    }

    pub fn window(&self, id: WindowId) -> Option<&HeadlessWindow> {
        self.windows.get(&id)
    }

    pub fn window_ids(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.windows.keys().copied()
    }

    pub fn surface(&self, surface: SurfaceId) -> Option<&HeadlessSurface> {
        self.surfaces.get(&surface)
    }

    /// Every move request received so far, in order.
    pub fn move_requests(&self) -> &[(WindowId, Rect)] {
        &self.move_requests
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drain queued frame-moved notifications for subscribed windows.
    pub fn take_frame_notifications(&mut self) -> Vec<WindowId> {
        std::mem::take(&mut self.notifications)
    }

    fn alloc_surface(&mut self, surface: HeadlessSurface) -> SurfaceId {
        self.next_surface += 1;
        let id = SurfaceId(self.next_surface);
        self.surfaces.insert(id, surface);
        id
    }

    fn surface_mut(&mut self, surface: SurfaceId) -> SurfaceResult<&mut HeadlessSurface> {
        self.surfaces
            .get_mut(&surface)
            .ok_or(SurfaceError::Gone(surface))
    }

    fn surface_ref(&self, surface: SurfaceId) -> SurfaceResult<&HeadlessSurface> {
        self.surfaces.get(&surface).ok_or(SurfaceError::Gone(surface))
    }
}

impl WindowSystem for HeadlessWindowSystem {
    fn frame_rect(&self, window: WindowId) -> Option<Rect> {
        self.windows.get(&window).map(|w| w.frame)
    }

    fn buffer_rect(&self, window: WindowId) -> Option<Rect> {
        self.windows.get(&window).map(HeadlessWindow::buffer)
    }

    fn monitor_of(&self, window: WindowId) -> Option<MonitorIndex> {
        self.windows.get(&window).map(|w| w.monitor)
    }

    fn workspace_of(&self, window: WindowId) -> Option<WorkspaceIndex> {
        self.windows.get(&window).map(|w| w.workspace)
    }

    fn surface_of(&self, window: WindowId) -> Option<SurfaceId> {
        self.windows.get(&window).and_then(|w| w.surface)
    }

    fn work_area(&self, monitor: MonitorIndex, workspace: WorkspaceIndex) -> Option<Rect> {
        self.work_areas.get(&(monitor, workspace)).copied()
    }

    fn request_frame(&mut self, window: WindowId, frame: Rect) {
        self.move_requests.push((window, frame));
        let Some(entry) = self.windows.get(&window) else {
            return;
        };
        let work_area = self.work_areas.get(&(entry.monitor, entry.workspace)).copied();

        let applied = match entry.policy {
            FramePolicy::Honor => frame,
            FramePolicy::Ignore => entry.frame,
            FramePolicy::ClampToWorkArea => match work_area {
                Some(area) => {
                    let max_x = area.right().saturating_sub(frame.width).max(area.x);
                    Rect::new(frame.x.clamp(area.x, max_x), frame.y, frame.width, frame.height)
                }
                None => frame,
            },
            FramePolicy::Nudge(delta) => {
                let origin = frame.origin().offset(delta);
                Rect::new(origin.x, origin.y, frame.width, frame.height)
            }
        };

        if applied == entry.frame {
            return;
        }

        let surface = entry.surface;
        let buffer_offset = entry.buffer_offset;
        if let Some(entry) = self.windows.get_mut(&window) {
            entry.frame = applied;
        }
        if let Some(surface) = surface.and_then(|s| self.surfaces.get_mut(&s)) {
            surface.position = applied.origin().offset(buffer_offset);
        }
        if self.subscriptions.values().any(|&watched| watched == window) {
            self.notifications.push(window);
        }
    }

    fn surface_position(&self, surface: SurfaceId) -> SurfaceResult<Point> {
        self.surface_ref(surface).map(|s| s.position)
    }

    fn set_surface_position(&mut self, surface: SurfaceId, position: Point) -> SurfaceResult<()> {
        self.surface_mut(surface)?.position = position;
        Ok(())
    }

    fn clip(&self, surface: SurfaceId) -> SurfaceResult<Option<Rect>> {
        self.surface_ref(surface).map(|s| s.clip)
    }

    fn set_clip(&mut self, surface: SurfaceId, clip: Rect) -> SurfaceResult<()> {
        self.surface_mut(surface)?.clip = Some(clip);
        Ok(())
    }

    fn clear_clip(&mut self, surface: SurfaceId) -> SurfaceResult<()> {
        self.surface_mut(surface)?.clip = None;
        Ok(())
    }

    fn translation(&self, surface: SurfaceId) -> SurfaceResult<Point> {
        self.surface_ref(surface).map(|s| s.translation)
    }

    fn set_translation(&mut self, surface: SurfaceId, translation: Point) -> SurfaceResult<()> {
        self.surface_mut(surface)?.translation = translation;
        Ok(())
    }

    fn opacity(&self, surface: SurfaceId) -> SurfaceResult<u8> {
        self.surface_ref(surface).map(|s| s.opacity)
    }

    fn set_opacity(&mut self, surface: SurfaceId, opacity: u8) -> SurfaceResult<()> {
        self.surface_mut(surface)?.opacity = opacity;
        Ok(())
    }

    fn set_visible(&mut self, surface: SurfaceId, visible: bool) -> SurfaceResult<()> {
        self.surface_mut(surface)?.visible = visible;
        Ok(())
    }

    fn cancel_transitions(&mut self, surface: SurfaceId) -> SurfaceResult<()> {
        // Nothing animates in memory; only liveness matters.
        self.surface_ref(surface).map(|_| ())
    }

    fn queue_relayout(&mut self, surface: SurfaceId) -> SurfaceResult<()> {
        self.surface_mut(surface)?.relayouts += 1;
        Ok(())
    }

    fn create_clone(&mut self, source: SurfaceId) -> SurfaceResult<SurfaceId> {
        let original = self.surface_ref(source)?;
        let mut clone = HeadlessSurface::at(original.position);
        clone.clone_of = Some(source);
        Ok(self.alloc_surface(clone))
    }

    fn destroy_surface(&mut self, surface: SurfaceId) -> SurfaceResult<()> {
        self.surfaces
            .remove(&surface)
            .map(|_| ())
            .ok_or(SurfaceError::Gone(surface))
    }

    fn subscribe_frame_moved(&mut self, window: WindowId) -> Option<SubscriptionId> {
        if !self.windows.contains_key(&window) {
            return None;
        }
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscriptions.insert(id, window);
        Some(id)
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.subscriptions.remove(&subscription);
    }
}

/// Scheduler driven by an explicit clock.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, (Duration, TimerTask)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn set_now(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    /// Number of timers still armed.
    pub fn armed(&self) -> usize {
        self.timers.len()
    }

    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.timers.contains_key(&timer)
    }

    pub fn armed_tasks(&self) -> Vec<TimerTask> {
        self.timers.values().map(|&(_, task)| task).collect()
    }

    /// Remove the earliest timer due at or before `until`, moving the clock
    /// to its deadline. Ties fire in scheduling order.
    pub fn pop_due(&mut self, until: Duration) -> Option<(TimerId, TimerTask)> {
        let (&timer, &(deadline, task)) = self
            .timers
            .iter()
            .min_by_key(|&(id, &(deadline, _))| (deadline, *id))?;
        if deadline > until {
            return None;
        }
        self.timers.remove(&timer);
        self.set_now(deadline);
        Some((timer, task))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerId {
        self.next_id += 1;
        let timer = TimerId(self.next_id);
        self.timers.insert(timer, (self.now + delay, task));
        timer
    }

    fn cancel(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }
}

/// Tiler that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingTiler {
    requests: Vec<RetileRequest>,
}

impl RecordingTiler {
    pub fn requests(&self) -> &[RetileRequest] {
        &self.requests
    }

    pub fn take_requests(&mut self) -> Vec<RetileRequest> {
        std::mem::take(&mut self.requests)
    }
}

impl Tiler for RecordingTiler {
    fn retile(&mut self, request: RetileRequest) {
        self.requests.push(request);
    }
}

impl<W: WindowSystem, T: Tiler> CanvasEngine<W, ManualScheduler, T> {
    /// Move the manual clock forward, firing due timers in deadline order.
    ///
    /// Timers armed by a firing timer fire too if they fall due in the window.
    pub fn advance(&mut self, by: Duration) {
        let until = self.scheduler().now() + by;
        while let Some((timer, task)) = self.scheduler_mut().pop_due(until) {
            self.on_timer(timer, task);
        }
        self.scheduler_mut().set_now(until);
    }
}

impl<S: Scheduler, T: Tiler> CanvasEngine<HeadlessWindowSystem, S, T> {
    /// Feed queued frame-moved notifications back into the engine.
    pub fn deliver_frame_notifications(&mut self) -> usize {
        let windows = self.system_mut().take_frame_notifications();
        for &window in &windows {
            self.on_frame_moved(window);
        }
        windows.len()
    }
}

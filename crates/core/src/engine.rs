//! The canvas engine.
//!
//! [`CanvasEngine`] owns every piece of per-canvas and per-window state and
//! is the only thing the host talks to. It is driven entirely from outside:
//! tiler passes come in through [`update_window_positions`], user scrolls
//! through the scroll methods, and delayed work comes back through
//! [`on_timer`] and [`on_frame_moved`].
//!
//! [`update_window_positions`]: CanvasEngine::update_window_positions
//! [`on_timer`]: CanvasEngine::on_timer
//! [`on_frame_moved`]: CanvasEngine::on_frame_moved

use crate::aux_state::AuxStore;
use crate::canvas::{CanvasKey, CanvasRegistry, CanvasState};
use crate::clones::CloneManager;
use crate::config::CanvasConfig;
use crate::phase::{self, Phase};
use crate::reconcile::{self, PositionCorrection, ReconcileViewport, VisualPlan};
use crate::retile::{RetileRequest, RetileTarget, RetileTrigger, Tiler};
use crate::system::{
    Scheduler, SubscriptionId, SurfaceError, SurfaceId, TimerId, TimerTask, WindowSystem,
};
use crate::tile_info::{TileInfo, TileRect};
use crate::viewport::{self, AnimationStep, ScrollAnimation, Visibility};
use crate::{CanvasError, MonitorIndex, Point, Rect, WindowId, WorkspaceIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

/// Geometry handed to the tiler before it lays a workspace out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutFrame {
    pub phase: Phase,
    /// The real work area.
    pub work_area: Rect,
    /// The area the tiler should lay out into.
    pub effective_work_area: Rect,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PassReport {
    /// Windows that were reconciled.
    pub placed: usize,
    /// Windows without a target or whose surface was unavailable.
    pub skipped: usize,
}

/// Canvas-space rectangle a window was last reconciled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LastTarget(Rect);

/// A clip waiting for the window system to settle the frame.
#[derive(Debug, Clone, Copy)]
struct PendingClip {
    surface: SurfaceId,
    subscription: Option<SubscriptionId>,
    timer: TimerId,
    plan: VisualPlan,
}

pub struct CanvasEngine<W, S, T> {
    config: CanvasConfig,
    system: W,
    scheduler: S,
    tiler: T,
    canvases: CanvasRegistry,
    aux: AuxStore,
    clones: CloneManager,
    retile: RetileTrigger,
    pending_clips: HashMap<WindowId, PendingClip>,
}

impl<W: WindowSystem, S: Scheduler, T: Tiler> CanvasEngine<W, S, T> {
    pub fn new(config: CanvasConfig, system: W, scheduler: S, tiler: T) -> Self {
        Self {
            config,
            system,
            scheduler,
            tiler,
            canvases: CanvasRegistry::new(),
            aux: AuxStore::new(),
            clones: CloneManager::new(),
            retile: RetileTrigger::new(),
            pending_clips: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// Swap the configuration, pulling every offset back inside the new limits.
    pub fn set_config(&mut self, config: CanvasConfig) {
        self.config = config;
        for (_, state) in self.canvases.iter_mut() {
            state.viewport_offset =
                viewport::clamp(state.viewport_offset, state.work_area, &self.config);
        }
    }

    pub fn system(&self) -> &W {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut W {
        &mut self.system
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn tiler(&self) -> &T {
        &self.tiler
    }

    pub fn tiler_mut(&mut self) -> &mut T {
        &mut self.tiler
    }

    pub fn aux(&self) -> &AuxStore {
        &self.aux
    }

    pub fn canvases(&self) -> &CanvasRegistry {
        &self.canvases
    }

    pub fn clones(&self) -> &CloneManager {
        &self.clones
    }

    /// Fetch (creating if needed) the canvas of a monitor and workspace.
    pub fn canvas(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
    ) -> Result<&CanvasState, CanvasError> {
        self.canvases
            .get(&self.system, monitor, workspace, &self.config)
            .map(|state| &*state)
    }

    // ========================================================================
    // Phase
    // ========================================================================

    /// Classify the windows about to be tiled and return the area to tile into.
    ///
    /// Leaving the expanded phase snaps the viewport back to neutral since
    /// there is no longer a wide canvas to pan over.
    pub fn prepare_layout(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
        widths: &[i32],
    ) -> Result<LayoutFrame, CanvasError> {
        let state = self
            .canvases
            .get(&self.system, monitor, workspace, &self.config)?;
        let phase = phase::classify(
            widths.iter().copied(),
            state.work_area.width,
            self.config.spacing,
            self.config.expansion_ratio,
        );

        if state.phase != phase {
            info!(
                "Monitor {} workspace {}: {:?} -> {:?} ({} windows)",
                monitor,
                workspace,
                state.phase,
                phase,
                widths.len()
            );
            if state.phase == Phase::Expanded {
                cancel_animation(state, &mut self.scheduler);
                state.viewport_offset = 0.0;
            }
            state.phase = phase;
        }

        let work_area = state.work_area;
        Ok(LayoutFrame {
            phase,
            work_area,
            effective_work_area: phase::effective_work_area(
                work_area,
                phase,
                self.config.expansion_ratio,
            ),
        })
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    pub fn scroll_left(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
    ) -> Result<f64, CanvasError> {
        self.scroll_by(monitor, workspace, -f64::from(self.config.scroll_step))
    }

    pub fn scroll_right(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
    ) -> Result<f64, CanvasError> {
        self.scroll_by(monitor, workspace, f64::from(self.config.scroll_step))
    }

    /// Pan immediately by `delta`, clamped. Any running animation is dropped.
    pub fn scroll_by(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
        delta: f64,
    ) -> Result<f64, CanvasError> {
        let state = self
            .canvases
            .get(&self.system, monitor, workspace, &self.config)?;
        cancel_animation(state, &mut self.scheduler);
        let offset = viewport::clamp(state.viewport_offset + delta, state.work_area, &self.config);
        state.viewport_offset = offset;
        trace!("Scrolled monitor {} workspace {} to {}", monitor, workspace, offset);

        self.request_retile(RetileTarget::Workspace(workspace), Some(monitor));
        Ok(offset)
    }

    /// Move the viewport to `target` (clamped), animated or not.
    ///
    /// A new scroll always replaces the running one: its timer is cancelled
    /// before the new one is armed. Returns the clamped target.
    pub fn scroll_to(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
        target: f64,
        animate: bool,
    ) -> Result<f64, CanvasError> {
        let key = CanvasKey::new(monitor, workspace);
        let duration = self.config.animation_duration();
        let tick = self.config.tick_interval();

        let state = self
            .canvases
            .get(&self.system, monitor, workspace, &self.config)?;
        let target = viewport::clamp(target, state.work_area, &self.config);
        cancel_animation(state, &mut self.scheduler);

        if !animate || duration.is_zero() || state.viewport_offset == target {
            state.viewport_offset = target;
        } else {
            debug!(
                "Animating monitor {} workspace {}: {} -> {}",
                monitor, workspace, state.viewport_offset, target
            );
            let timer = self.scheduler.schedule(tick, TimerTask::ScrollTick(key));
            state.animation = Some(ScrollAnimation::new(
                state.viewport_offset,
                target,
                duration,
                timer,
            ));
        }

        self.request_retile(RetileTarget::Workspace(workspace), Some(monitor));
        Ok(target)
    }

    /// Snap the viewport back to the work area.
    pub fn reset_viewport(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
    ) -> Result<(), CanvasError> {
        self.scroll_to(monitor, workspace, 0.0, false).map(|_| ())
    }

    /// Pan so that `window` is entirely in view.
    ///
    /// Returns whether a scroll was started.
    pub fn ensure_visible(&mut self, window: WindowId, animate: bool) -> Result<bool, CanvasError> {
        let (monitor, workspace) = self.locate(window)?;
        let state = self
            .canvases
            .get(&self.system, monitor, workspace, &self.config)?;
        let offset = state.viewport_offset;
        let work_area = state.work_area;

        let rect = self
            .canvas_rect(window, offset)
            .ok_or(CanvasError::UnknownWindow(window))?;
        let Some(target) = viewport::ensure_visible_target(rect, work_area, offset) else {
            return Ok(false);
        };
        if viewport::clamp(target, work_area, &self.config) == offset {
            return Ok(false);
        }

        debug!("Bringing window {} into view (offset {} -> {})", window, offset, target);
        self.scroll_to(monitor, workspace, target, animate)?;
        Ok(true)
    }

    pub fn visibility(&mut self, window: WindowId) -> Option<Visibility> {
        let (monitor, workspace) = self.locate(window).ok()?;
        let state = self
            .canvases
            .get(&self.system, monitor, workspace, &self.config)
            .ok()?;
        let bounds = state.viewport_bounds();
        let offset = state.viewport_offset;
        let rect = self.canvas_rect(window, offset)?;
        Some(Visibility::of(rect, bounds))
    }

    pub fn is_fully_visible(&mut self, window: WindowId) -> bool {
        self.visibility(window).is_some_and(Visibility::is_full)
    }

    /// Whether any part of the window is inside the viewport.
    pub fn is_partially_visible(&mut self, window: WindowId) -> bool {
        self.visibility(window).is_some_and(Visibility::is_any)
    }

    /// Visible slice of the canvas, in canvas space.
    pub fn viewport_bounds(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
    ) -> Option<Rect> {
        self.canvases
            .get(&self.system, monitor, workspace, &self.config)
            .ok()
            .map(|state| state.viewport_bounds())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Reconcile every window of a workspace against the tiler's layout.
    ///
    /// Windows without a target, with a target outside pixel space, or whose
    /// surface is unavailable, are skipped for this pass. A missing work area
    /// aborts the whole pass before any window is touched.
    pub fn update_window_positions(
        &mut self,
        windows: &[WindowId],
        workspace: WorkspaceIndex,
        monitor: MonitorIndex,
        tile_info: &TileInfo,
        work_area: Option<Rect>,
        control_positioning: bool,
    ) -> Result<PassReport, CanvasError> {
        if let Some(area) = work_area.filter(Rect::is_empty) {
            warn!("Ignoring pass with empty work area {:?}", area);
            return Err(CanvasError::InvalidGeometry(area));
        }

        let state = match self
            .canvases
            .get(&self.system, monitor, workspace, &self.config)
        {
            Ok(state) => state,
            Err(e) => {
                warn!("Skipping reconciliation pass: {}", e);
                return Err(e);
            }
        };
        if let Some(area) = work_area {
            state.set_work_area(area, &self.config);
        }
        let viewport = ReconcileViewport::new(state.work_area, state.viewport_offset);

        let targets = tile_info.by_window();
        let mut report = PassReport::default();
        for &window in windows {
            let Some(target) = targets.get(&window) else {
                trace!("Window {} has no tile this pass", window);
                report.skipped += 1;
                continue;
            };
            if !target.is_representable() {
                warn!("Skipping window {} with invalid target {:?}", window, target);
                report.skipped += 1;
                continue;
            }
            match self.reconcile(window, target, viewport, control_positioning) {
                Ok(_) => report.placed += 1,
                Err(e) => {
                    debug!("Skipping window {}: {}", window, e);
                    report.skipped += 1;
                }
            }
        }

        debug!(
            "Pass on monitor {} workspace {}: {} placed, {} skipped",
            monitor, workspace, report.placed, report.skipped
        );
        Ok(report)
    }

    /// Reconcile one window. Returns the frame position that was requested.
    ///
    /// With `control_positioning` the frame is moved and the clip is deferred
    /// until the window system reports the move (or the fallback timer fires).
    /// Without it the frame is left alone and the presentation is applied
    /// right away.
    pub fn reconcile(
        &mut self,
        window: WindowId,
        target: &TileRect,
        viewport: ReconcileViewport,
        control_positioning: bool,
    ) -> Result<Point, SurfaceError> {
        let frame = self
            .system
            .frame_rect(window)
            .ok_or(SurfaceError::WindowGone(window))?;
        let surface = self
            .system
            .surface_of(window)
            .ok_or(SurfaceError::NoSurface(window))?;
        if let Err(e) = self.system.check_alive(surface) {
            self.forget(window);
            return Err(e);
        }
        let buffer = self.system.buffer_rect(window).unwrap_or(frame);
        self.aux.set(window, LastTarget(target.floor()));

        if !control_positioning {
            let plan = reconcile::plan(target, viewport, frame, buffer, self.correction(window));
            self.cancel_pending_clip(window);
            self.present(window, surface, &plan);
            return Ok(plan.frame_position());
        }

        // Subscribe before moving: the notification may be raised by the move
        self.cancel_pending_clip(window);
        let subscription = self.system.subscribe_frame_moved(window);

        let requested = reconcile::plan(
            target,
            viewport,
            frame,
            buffer,
            PositionCorrection::default(),
        );
        self.system.request_frame(window, requested.frame);
        let correction = self.observe_correction(window, requested.frame_position());
        let plan = reconcile::plan(target, viewport, frame, buffer, correction);

        self.arm_clip(window, surface, subscription, plan);
        Ok(plan.frame_position())
    }

    /// Offset between the last requested and the actual frame position.
    pub fn correction(&self, window: WindowId) -> PositionCorrection {
        self.aux
            .get::<PositionCorrection>(window)
            .copied()
            .unwrap_or_default()
    }

    pub fn has_pending_clip(&self, window: WindowId) -> bool {
        self.pending_clips.contains_key(&window)
    }

    pub fn pending_clip_count(&self) -> usize {
        self.pending_clips.len()
    }

    /// The window system reports that a window's frame moved.
    pub fn on_frame_moved(&mut self, window: WindowId) {
        match self.cancel_pending_clip(window) {
            Some(pending) => self.present(window, pending.surface, &pending.plan),
            None => trace!("Frame of window {} moved with no clip pending", window),
        }
    }

    /// A timer armed through the scheduler fired.
    ///
    /// Timers that were superseded since they were armed are ignored.
    pub fn on_timer(&mut self, timer: TimerId, task: TimerTask) {
        match task {
            TimerTask::ScrollTick(key) => self.on_scroll_tick(key, timer),
            TimerTask::ClipFallback(window) => self.on_clip_fallback(window, timer),
            TimerTask::RetileFlush => {
                if let Some(requests) = self.retile.flush(timer) {
                    for request in requests {
                        self.tiler.retile(request);
                    }
                }
            }
        }
    }

    /// Drop everything tracked for a window that no longer exists.
    pub fn on_window_destroyed(&mut self, window: WindowId) {
        self.cancel_pending_clip(window);
        self.aux.remove_window(window);
        self.clones.destroy(&mut self.system, window);
        debug!("Forgot destroyed window {}", window);
    }

    // ========================================================================
    // Clones
    // ========================================================================

    /// Show a clone of `window` at `position` (screen space).
    pub fn present_clone(
        &mut self,
        window: WindowId,
        position: Point,
    ) -> Result<SurfaceId, SurfaceError> {
        self.clones.get_or_create(&mut self.system, window, position)
    }

    pub fn destroy_clone(&mut self, window: WindowId) -> bool {
        self.clones.destroy(&mut self.system, window)
    }

    /// Leave the canvas presentation for `windows`, e.g. for an interactive
    /// drag: pending clips are dropped, clones hidden and windows restored.
    pub fn exit_canvas_mode(&mut self, windows: &[WindowId]) {
        for &window in windows {
            self.cancel_pending_clip(window);
        }
        self.clones.hide_all(&mut self.system, windows);
        debug!("Left canvas mode for {} windows", windows.len());
    }

    /// Release everything the engine holds on the window system and scheduler.
    pub fn teardown(&mut self) {
        self.clones.destroy_all(&mut self.system);

        let windows: Vec<WindowId> = self.pending_clips.keys().copied().collect();
        for window in windows {
            self.cancel_pending_clip(window);
        }

        for (_, mut state) in self.canvases.clear() {
            cancel_animation(&mut state, &mut self.scheduler);
        }
        self.retile.cancel(&mut self.scheduler);
        info!("Canvas engine torn down");
    }

    /// Queue a retile; bursts are coalesced into one flush.
    pub fn request_retile(&mut self, target: RetileTarget, monitor_hint: Option<MonitorIndex>) {
        self.retile.request(
            &mut self.scheduler,
            RetileRequest {
                target,
                monitor_hint,
            },
            self.config.retile_delay(),
        );
    }

    fn locate(&self, window: WindowId) -> Result<(MonitorIndex, WorkspaceIndex), CanvasError> {
        let monitor = self
            .system
            .monitor_of(window)
            .ok_or(CanvasError::UnknownWindow(window))?;
        let workspace = self
            .system
            .workspace_of(window)
            .ok_or(CanvasError::UnknownWindow(window))?;
        Ok((monitor, workspace))
    }

    /// Canvas-space rectangle of a window: its last target, or its current
    /// frame mapped back onto the canvas.
    fn canvas_rect(&self, window: WindowId, offset: f64) -> Option<Rect> {
        if let Some(LastTarget(rect)) = self.aux.get::<LastTarget>(window) {
            return Some(*rect);
        }
        self.system
            .frame_rect(window)
            .map(|frame| frame.shifted_x(offset.floor() as i32))
    }

    fn observe_correction(&mut self, window: WindowId, requested: Point) -> PositionCorrection {
        let observed = self.system.frame_rect(window).and_then(|actual| {
            PositionCorrection::observe(
                requested,
                actual.origin(),
                self.config.correction_tolerance,
            )
        });
        match observed {
            Some(correction) => {
                debug!(
                    "Window {} landed off its request, correcting by {:?}",
                    window, correction
                );
                self.aux.set(window, correction);
                correction
            }
            None => {
                self.aux.clear::<PositionCorrection>(window);
                PositionCorrection::default()
            }
        }
    }

    fn arm_clip(
        &mut self,
        window: WindowId,
        surface: SurfaceId,
        subscription: Option<SubscriptionId>,
        plan: VisualPlan,
    ) {
        let timer = self
            .scheduler
            .schedule(self.config.clip_fallback(), TimerTask::ClipFallback(window));
        self.pending_clips.insert(
            window,
            PendingClip {
                surface,
                subscription,
                timer,
                plan,
            },
        );
    }

    fn cancel_pending_clip(&mut self, window: WindowId) -> Option<PendingClip> {
        let pending = self.pending_clips.remove(&window)?;
        if let Some(subscription) = pending.subscription {
            self.system.unsubscribe(subscription);
        }
        self.scheduler.cancel(pending.timer);
        Some(pending)
    }

    fn on_clip_fallback(&mut self, window: WindowId, timer: TimerId) {
        if self.pending_clips.get(&window).map(|p| p.timer) != Some(timer) {
            trace!("Ignoring stale clip fallback for window {}", window);
            return;
        }
        if let Some(pending) = self.cancel_pending_clip(window) {
            debug!("No frame notification for window {}, clipping anyway", window);
            self.present(window, pending.surface, &pending.plan);
        }
    }

    fn on_scroll_tick(&mut self, key: CanvasKey, timer: TimerId) {
        let tick = self.config.tick_interval();
        let Some(state) = self.canvases.peek_mut(key) else {
            return;
        };
        let Some(animation) = state.animation.as_mut() else {
            trace!("Scroll tick for idle canvas {:?}", key);
            return;
        };
        if animation.timer() != timer {
            trace!("Ignoring stale scroll tick for canvas {:?}", key);
            return;
        }

        match animation.advance(tick) {
            AnimationStep::Running(offset) => {
                let next = self.scheduler.schedule(tick, TimerTask::ScrollTick(key));
                animation.rearm(next);
                state.viewport_offset = viewport::clamp(offset, state.work_area, &self.config);
            }
            AnimationStep::Finished(target) => {
                state.animation = None;
                state.viewport_offset = viewport::clamp(target, state.work_area, &self.config);
                debug!("Scroll of canvas {:?} finished at {}", key, state.viewport_offset);
            }
        }

        self.request_retile(RetileTarget::Workspace(key.workspace), Some(key.monitor));
    }

    fn present(&mut self, window: WindowId, surface: SurfaceId, plan: &VisualPlan) {
        // The window system may have put the frame elsewhere than planned
        let Some(frame) = self.system.frame_rect(window) else {
            debug!("Window {} vanished before it could be presented", window);
            self.forget(window);
            return;
        };
        if let Err(e) = reconcile::apply(&mut self.system, surface, plan, frame.origin()) {
            debug!("Surface of window {} vanished while presenting: {}", window, e);
            self.forget(window);
        }
    }

    /// Prune tracking for a window whose surface is gone.
    fn forget(&mut self, window: WindowId) {
        self.cancel_pending_clip(window);
        self.aux.clear::<LastTarget>(window);
        self.aux.clear::<PositionCorrection>(window);
    }
}

fn cancel_animation<S: Scheduler + ?Sized>(state: &mut CanvasState, scheduler: &mut S) {
    if let Some(animation) = state.animation.take() {
        scheduler.cancel(animation.timer());
    }
}

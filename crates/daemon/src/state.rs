//! Daemon state: the canvas engine on the in-memory backend, plus the
//! layouts needed to answer retile requests.

use crate::config::{Config, ConfigWarning, HeadlessConfig};
use crate::scheduler::TokioScheduler;
use crate::DaemonEvent;
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use widedesk_core::headless::HeadlessWindowSystem;
use widedesk_core::{
    CanvasEngine, CanvasError, CanvasKey, MonitorIndex, Rect, RetileRequest, RetileTarget,
    TileInfo, Tiler, TimerId, TimerTask, WindowId, WindowSystem, WorkspaceIndex,
};
use widedesk_ipc::{IpcCommand, IpcResponse};

pub type Engine = CanvasEngine<HeadlessWindowSystem, TokioScheduler, ReplayTiler>;

/// Frame notifications and replays can feed each other; stop after this
/// many rounds.
const MAX_SETTLE_ROUNDS: usize = 8;

/// Tiler that answers retile requests by replaying the last layout it was
/// given for the canvas.
///
/// The engine owns the tiler, so requests are only queued here and replayed
/// by [`AppState`] once the engine call has returned.
#[derive(Debug, Default)]
pub struct ReplayTiler {
    queued: Vec<RetileRequest>,
}

impl ReplayTiler {
    fn take(&mut self) -> Vec<RetileRequest> {
        std::mem::take(&mut self.queued)
    }
}

impl Tiler for ReplayTiler {
    fn retile(&mut self, request: RetileRequest) {
        if !self.queued.contains(&request) {
            self.queued.push(request);
        }
    }
}

/// The last `apply_layout` received for a canvas.
#[derive(Debug, Clone)]
struct CachedLayout {
    windows: Vec<WindowId>,
    tile_info: TileInfo,
    work_area: Option<Rect>,
    control_positioning: bool,
}

pub struct AppState {
    engine: Engine,
    config: Config,
    config_path: Option<PathBuf>,
    layouts: HashMap<CanvasKey, CachedLayout>,
}

impl AppState {
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        events: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        let mut system = HeadlessWindowSystem::new();
        seed_work_areas(&mut system, &config.headless);
        let engine = CanvasEngine::new(
            config.canvas.clone(),
            system,
            TokioScheduler::new(events),
            ReplayTiler::default(),
        );

        Self {
            engine,
            config,
            config_path,
            layouts: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[cfg(test)]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one IPC command and let the engine settle.
    pub fn handle_command(&mut self, cmd: IpcCommand) -> IpcResponse {
        let response = self.dispatch(cmd);
        self.settle();
        response
    }

    /// A scheduled timer fired.
    pub fn handle_timer(&mut self, timer: TimerId, task: TimerTask) {
        self.engine.scheduler_mut().fired(timer);
        self.engine.on_timer(timer, task);
        self.settle();
    }

    /// Release everything before exit.
    pub fn shutdown(&mut self) {
        self.engine.teardown();
        self.engine.scheduler_mut().cancel_all();
        self.layouts.clear();
    }

    fn dispatch(&mut self, cmd: IpcCommand) -> IpcResponse {
        match cmd {
            IpcCommand::ScrollLeft { monitor, workspace } => {
                match self.engine.scroll_left(monitor, workspace) {
                    Ok(_) => self.viewport(monitor, workspace),
                    Err(e) => error_response(e),
                }
            }
            IpcCommand::ScrollRight { monitor, workspace } => {
                match self.engine.scroll_right(monitor, workspace) {
                    Ok(_) => self.viewport(monitor, workspace),
                    Err(e) => error_response(e),
                }
            }
            IpcCommand::ScrollTo {
                monitor,
                workspace,
                offset,
                animate,
            } => match self.engine.scroll_to(monitor, workspace, offset, animate) {
                Ok(_) => self.viewport(monitor, workspace),
                Err(e) => error_response(e),
            },
            IpcCommand::EnsureVisible { window, animate } => {
                let animate = animate.unwrap_or(self.config.behavior.animate_ensure_visible);
                match self.engine.ensure_visible(window, animate) {
                    Ok(scrolled) => {
                        debug!("ensure_visible({}) scrolled: {}", window, scrolled);
                        IpcResponse::Ok
                    }
                    Err(e) => error_response(e),
                }
            }
            IpcCommand::ResetViewport { monitor, workspace } => {
                match self.engine.reset_viewport(monitor, workspace) {
                    Ok(()) => self.viewport(monitor, workspace),
                    Err(e) => error_response(e),
                }
            }
            IpcCommand::QueryViewport { monitor, workspace } => self.viewport(monitor, workspace),
            IpcCommand::QueryVisibility { window } => IpcResponse::Visibility {
                window,
                visibility: self.engine.visibility(window),
                fully_visible: self.engine.is_fully_visible(window),
                partially_visible: self.engine.is_partially_visible(window),
            },
            IpcCommand::PrepareLayout {
                monitor,
                workspace,
                widths,
            } => match self.engine.prepare_layout(monitor, workspace, &widths) {
                Ok(frame) => frame.into(),
                Err(e) => error_response(e),
            },
            IpcCommand::ApplyLayout {
                monitor,
                workspace,
                windows,
                tile_info,
                work_area,
                control_positioning,
            } => {
                let layout = CachedLayout {
                    windows,
                    tile_info,
                    work_area,
                    control_positioning,
                };
                let result = self.apply(monitor, workspace, &layout);
                self.layouts
                    .insert(CanvasKey::new(monitor, workspace), layout);
                match result {
                    Ok(report) => report.into(),
                    Err(e) => error_response(e),
                }
            }
            IpcCommand::ExitCanvasMode { windows } => {
                self.engine.exit_canvas_mode(&windows);
                IpcResponse::Ok
            }
            IpcCommand::MapWindow {
                window,
                monitor,
                workspace,
                frame,
            } => {
                if self.engine.system().window(window).is_some() {
                    return IpcResponse::error(format!("Window {} is already mapped", window));
                }
                self.engine
                    .system_mut()
                    .add_window(window, monitor, workspace, frame);
                debug!(
                    "Mapped window {} on monitor {} workspace {} at {:?}",
                    window, monitor, workspace, frame
                );
                IpcResponse::Ok
            }
            IpcCommand::UnmapWindow { window } => {
                self.engine.on_window_destroyed(window);
                if !self.engine.system_mut().remove_window(window) {
                    return IpcResponse::error(format!("Window {} is not mapped", window));
                }
                for layout in self.layouts.values_mut() {
                    layout.windows.retain(|&w| w != window);
                }
                IpcResponse::Ok
            }
            IpcCommand::SetWorkArea {
                monitor,
                workspace,
                work_area,
            } => {
                if work_area.is_empty() {
                    return error_response(CanvasError::InvalidGeometry(work_area));
                }
                self.engine
                    .system_mut()
                    .set_work_area(monitor, workspace, work_area);
                IpcResponse::Ok
            }
            IpcCommand::Reload => match self.reload() {
                Ok(warnings) => {
                    for w in &warnings {
                        warn!("Config: {} - {}", w.field, w.message);
                    }
                    info!("Configuration reloaded");
                    IpcResponse::Ok
                }
                Err(e) => {
                    warn!("Failed to reload configuration: {:#}", e);
                    IpcResponse::error(format!("Failed to reload config: {:#}", e))
                }
            },
            // The caller tears down after replying
            IpcCommand::Stop => IpcResponse::Ok,
        }
    }

    fn viewport(&mut self, monitor: MonitorIndex, workspace: WorkspaceIndex) -> IpcResponse {
        match self.engine.canvas(monitor, workspace) {
            Ok(state) => IpcResponse::Viewport {
                monitor,
                workspace,
                offset: state.viewport_offset,
                bounds: state.viewport_bounds(),
                phase: state.phase,
                animating: state.is_animating(),
            },
            Err(e) => error_response(e),
        }
    }

    fn apply(
        &mut self,
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
        layout: &CachedLayout,
    ) -> Result<widedesk_core::PassReport, CanvasError> {
        self.engine.update_window_positions(
            &layout.windows,
            workspace,
            monitor,
            &layout.tile_info,
            layout.work_area,
            layout.control_positioning,
        )
    }

    /// Re-read the config file, keeping canvas state.
    ///
    /// Socket and log level changes only take effect after a restart.
    fn reload(&mut self) -> Result<Vec<ConfigWarning>> {
        let mut config = Config::load(self.config_path.as_deref())?;
        let warnings = config.validate();
        self.engine.set_config(config.canvas.clone());
        seed_work_areas(self.engine.system_mut(), &config.headless);
        self.config = config;
        Ok(warnings)
    }

    /// Deliver frame notifications and replay retiles until nothing moves.
    fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            let moved = self.engine.deliver_frame_notifications();
            let replayed = self.replay_retiles();
            if moved == 0 && replayed == 0 {
                return;
            }
        }
        debug!("Engine still busy after {} rounds", MAX_SETTLE_ROUNDS);
    }

    fn replay_retiles(&mut self) -> usize {
        let mut replayed = 0;
        for request in self.engine.tiler_mut().take() {
            for key in self.targets_of(request) {
                let Some(layout) = self.layouts.get(&key).cloned() else {
                    continue;
                };
                match self.apply(key.monitor, key.workspace, &layout) {
                    Ok(report) => {
                        debug!(
                            "Replayed layout of {:?}: {} placed, {} skipped",
                            key, report.placed, report.skipped
                        );
                        replayed += 1;
                    }
                    Err(e) => warn!("Replay of {:?} failed: {}", key, e),
                }
            }
        }
        replayed
    }

    fn targets_of(&self, request: RetileRequest) -> Vec<CanvasKey> {
        match request.target {
            RetileTarget::Workspace(workspace) => self
                .layouts
                .keys()
                .filter(|key| key.workspace == workspace)
                .filter(|key| request.monitor_hint.map_or(true, |m| m == key.monitor))
                .copied()
                .collect(),
            RetileTarget::Window(window) => {
                let system = self.engine.system();
                match (system.monitor_of(window), system.workspace_of(window)) {
                    (Some(monitor), Some(workspace)) => vec![CanvasKey::new(monitor, workspace)],
                    _ => Vec::new(),
                }
            }
        }
    }
}

fn seed_work_areas(system: &mut HeadlessWindowSystem, headless: &HeadlessConfig) {
    for (monitor, area) in headless.monitors.iter().enumerate() {
        for workspace in 0..headless.workspaces {
            system.set_work_area(monitor, workspace, *area);
        }
    }
}

fn error_response(error: CanvasError) -> IpcResponse {
    IpcResponse::error(error.to_string())
}

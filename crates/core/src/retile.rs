//! Retile requests towards the external tiler.
//!
//! The core never computes a layout. After a scroll or a state change it asks
//! the tiler to recompute, and the new layout comes back through
//! [`CanvasEngine::update_window_positions`](crate::CanvasEngine::update_window_positions).
//! Requests are coalesced on a single timer so a burst of scroll steps
//! produces one retile per target.

use crate::system::{Scheduler, TimerId, TimerTask};
use crate::{MonitorIndex, WindowId, WorkspaceIndex};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What needs to be retiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RetileTarget {
    Workspace(WorkspaceIndex),
    Window(WindowId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetileRequest {
    pub target: RetileTarget,
    pub monitor_hint: Option<MonitorIndex>,
}

/// The external tiler.
pub trait Tiler {
    fn retile(&mut self, request: RetileRequest);
}

/// Coalesces retile requests until the flush timer fires.
#[derive(Debug, Default)]
pub struct RetileTrigger {
    pending: Vec<RetileRequest>,
    timer: Option<TimerId>,
}

impl RetileTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request, arming the flush timer if it is not armed yet.
    pub fn request<S: Scheduler + ?Sized>(
        &mut self,
        scheduler: &mut S,
        request: RetileRequest,
        delay: Duration,
    ) {
        if !self.pending.contains(&request) {
            self.pending.push(request);
        }
        if self.timer.is_none() {
            self.timer = Some(scheduler.schedule(delay, TimerTask::RetileFlush));
        }
    }

    /// Take the queued requests if `timer` is the armed flush timer.
    pub fn flush(&mut self, timer: TimerId) -> Option<Vec<RetileRequest>> {
        if self.timer != Some(timer) {
            return None;
        }
        self.timer = None;
        Some(std::mem::take(&mut self.pending))
    }

    /// Drop queued requests and revoke the flush timer.
    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
        self.pending.clear();
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    pub fn pending(&self) -> &[RetileRequest] {
        &self.pending
    }
}

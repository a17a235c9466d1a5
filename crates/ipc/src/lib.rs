//! widedesk IPC Protocol
//!
//! Shared types for talking to the daemon over a Unix domain socket.
//! Each connection carries one JSON command line and gets one JSON
//! response line back.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use widedesk_core::{
    LayoutFrame, MonitorIndex, PassReport, Phase, Rect, TileInfo, Visibility, WindowId,
    WorkspaceIndex,
};

/// File name of the daemon socket inside the runtime directory.
pub const SOCKET_NAME: &str = "widedesk.sock";

/// Upper bound on a single command line, in bytes.
pub const MAX_IPC_MESSAGE_SIZE: usize = 1024 * 1024;

/// Commands accepted by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Pan one scroll step to the left.
    ScrollLeft {
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
    },
    /// Pan one scroll step to the right.
    ScrollRight {
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
    },
    /// Move the viewport to an absolute offset.
    ScrollTo {
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
        offset: f64,
        #[serde(default)]
        animate: bool,
    },
    /// Pan until a window is entirely in view.
    EnsureVisible {
        window: WindowId,
        /// Overrides `behavior.animate_ensure_visible` when set.
        #[serde(default)]
        animate: Option<bool>,
    },
    ResetViewport {
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
    },
    QueryViewport {
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
    },
    QueryVisibility { window: WindowId },

    /// Classify the widths about to be tiled and get the area to tile into.
    PrepareLayout {
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
        widths: Vec<i32>,
    },
    /// Reconcile windows against a finished layout.
    ApplyLayout {
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
        windows: Vec<WindowId>,
        tile_info: TileInfo,
        #[serde(default)]
        work_area: Option<Rect>,
        #[serde(default = "default_true")]
        control_positioning: bool,
    },
    /// Leave the canvas presentation, e.g. before an interactive drag.
    ExitCanvasMode { windows: Vec<WindowId> },

    /// Add a window to the headless backend.
    MapWindow {
        window: WindowId,
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
        frame: Rect,
    },
    /// Remove a window from the headless backend.
    UnmapWindow { window: WindowId },
    /// Set a work area on the headless backend.
    SetWorkArea {
        #[serde(default)]
        monitor: MonitorIndex,
        #[serde(default)]
        workspace: WorkspaceIndex,
        work_area: Rect,
    },

    /// Reload configuration from file.
    Reload,
    /// Stop the daemon.
    Stop,
}

fn default_true() -> bool {
    true
}

/// Responses from the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command failed with an error.
    Error { message: String },
    /// State of one canvas viewport.
    Viewport {
        monitor: MonitorIndex,
        workspace: WorkspaceIndex,
        offset: f64,
        /// Visible slice of the canvas, in canvas space.
        bounds: Rect,
        phase: Phase,
        animating: bool,
    },
    Visibility {
        window: WindowId,
        /// `None` when the window is unknown.
        visibility: Option<Visibility>,
        fully_visible: bool,
        partially_visible: bool,
    },
    LayoutFrame {
        phase: Phase,
        work_area: Rect,
        effective_work_area: Rect,
    },
    PassReport { placed: usize, skipped: usize },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<LayoutFrame> for IpcResponse {
    fn from(frame: LayoutFrame) -> Self {
        Self::LayoutFrame {
            phase: frame.phase,
            work_area: frame.work_area,
            effective_work_area: frame.effective_work_area,
        }
    }
}

impl From<PassReport> for IpcResponse {
    fn from(report: PassReport) -> Self {
        Self::PassReport {
            placed: report.placed,
            skipped: report.skipped,
        }
    }
}

/// Failures decoding a command line.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Message of at least {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Invalid command: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse one command line, surrounding whitespace included.
pub fn decode_command(line: &str) -> Result<IpcCommand, IpcError> {
    decode_command_with_limit(line, MAX_IPC_MESSAGE_SIZE)
}

/// Parse one command line read through a reader capped at `limit` bytes.
///
/// A line that fills the cap without its terminating newline was cut off
/// and counts as too large.
pub fn decode_command_with_limit(line: &str, limit: usize) -> Result<IpcCommand, IpcError> {
    if line.len() > limit || (line.len() == limit && !line.ends_with('\n')) {
        return Err(IpcError::TooLarge {
            size: line.len(),
            limit,
        });
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// Serialize a response as one newline-terminated line.
pub fn encode_response(response: &IpcResponse) -> String {
    match serde_json::to_string(response) {
        Ok(json) => json + "\n",
        Err(_) => "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widedesk_core::{TileDescriptor, TileRect};

    #[test]
    fn test_command_serialization() {
        let cmd = IpcCommand::ScrollLeft {
            monitor: 0,
            workspace: 1,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("scroll_left"));

        let cmd2: IpcCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, cmd2);
    }

    #[test]
    fn test_canvas_defaults_to_first_monitor_and_workspace() {
        let cmd: IpcCommand = serde_json::from_str(r#"{"type":"scroll_right"}"#).unwrap();
        assert_eq!(
            cmd,
            IpcCommand::ScrollRight {
                monitor: 0,
                workspace: 0
            }
        );

        let cmd: IpcCommand =
            serde_json::from_str(r#"{"type":"scroll_to","offset":-120.5}"#).unwrap();
        assert_eq!(
            cmd,
            IpcCommand::ScrollTo {
                monitor: 0,
                workspace: 0,
                offset: -120.5,
                animate: false
            }
        );
    }

    #[test]
    fn test_apply_layout_defaults() {
        let json = r#"{
            "type": "apply_layout",
            "windows": [7],
            "tile_info": {"levels": [{"windows": [
                {"id": 7, "target_x": -300.0, "target_y": 0.0, "width": 400.0, "height": 700.0}
            ]}]}
        }"#;
        let cmd: IpcCommand = serde_json::from_str(json).unwrap();
        match cmd {
            IpcCommand::ApplyLayout {
                windows,
                tile_info,
                work_area,
                control_positioning,
                ..
            } => {
                assert_eq!(windows, vec![7]);
                assert_eq!(
                    tile_info,
                    TileInfo::single_level(vec![TileDescriptor::new(
                        7,
                        TileRect::new(-300.0, 0.0, 400.0, 700.0)
                    )])
                );
                assert_eq!(work_area, None);
                assert!(control_positioning);
            }
            other => panic!("Expected ApplyLayout, got {:?}", other),
        }
    }

    #[test]
    fn test_response_serialization() {
        let resp = IpcResponse::Ok;
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("ok"));

        let resp2: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, resp2);
    }

    #[test]
    fn test_viewport_serialization() {
        let resp = IpcResponse::Viewport {
            monitor: 0,
            workspace: 2,
            offset: -640.0,
            bounds: Rect::new(-640, 0, 1280, 720),
            phase: Phase::Expanded,
            animating: false,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"viewport\""));
        assert!(json.contains("\"phase\":\"expanded\""));

        let resp2: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, resp2);
    }

    #[test]
    fn test_layout_frame_conversion() {
        let resp = IpcResponse::from(LayoutFrame {
            phase: Phase::Expanded,
            work_area: Rect::new(0, 0, 1280, 720),
            effective_work_area: Rect::new(-640, 0, 2560, 720),
        });
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("layout_frame"));
        assert!(json.contains("\"effective_work_area\":{\"x\":-640"));
    }

    #[test]
    fn test_error_response() {
        let resp = IpcResponse::error("Something went wrong");
        assert!(resp.is_error());
        if let IpcResponse::Error { message } = resp {
            assert_eq!(message, "Something went wrong");
        } else {
            panic!("Expected Error response");
        }
    }

    #[test]
    fn test_decode_command() {
        let cmd = decode_command("{\"type\":\"stop\"}\n").unwrap();
        assert_eq!(cmd, IpcCommand::Stop);

        assert!(matches!(
            decode_command("not valid json"),
            Err(IpcError::Malformed(_))
        ));
        assert!(matches!(
            decode_command("{\"type\": \"unknown_command\"}"),
            Err(IpcError::Malformed(_))
        ));

        let huge = " ".repeat(MAX_IPC_MESSAGE_SIZE + 1);
        assert!(matches!(decode_command(&huge), Err(IpcError::TooLarge { .. })));
    }

    #[test]
    fn test_decode_command_with_limit() {
        let line = "{\"type\":\"reload\"}\n";
        assert_eq!(
            decode_command_with_limit(line, line.len()).unwrap(),
            IpcCommand::Reload
        );

        let cut = &line[..line.len() - 1];
        match decode_command_with_limit(cut, cut.len()) {
            Err(IpcError::TooLarge { size, limit }) => {
                assert_eq!(size, cut.len());
                assert_eq!(limit, cut.len());
            }
            other => panic!("Expected TooLarge, got {:?}", other),
        }
        assert!(matches!(
            decode_command_with_limit(line, 4),
            Err(IpcError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_response_is_one_line() {
        let line = encode_response(&IpcResponse::PassReport {
            placed: 3,
            skipped: 1,
        });
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: IpcResponse = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(
            parsed,
            IpcResponse::PassReport {
                placed: 3,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_socket_name() {
        assert_eq!(SOCKET_NAME, "widedesk.sock");
        assert!(!SOCKET_NAME.contains('/'));
    }
}

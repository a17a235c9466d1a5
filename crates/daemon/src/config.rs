//! Configuration management for the widedesk daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. the path given with `--config`
//! 2. the platform config directory (`~/.config/widedesk/config.toml` on Linux)
//! 3. `~/.config/widedesk/config.toml` (for platforms with another config dir)
//! 4. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use widedesk_core::{CanvasConfig, Rect};
use widedesk_ipc::{MAX_IPC_MESSAGE_SIZE, SOCKET_NAME};

/// Main configuration structure for widedesk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Canvas and viewport constants handed to the engine.
    pub canvas: CanvasConfig,
    /// Behavior configuration.
    pub behavior: BehaviorConfig,
    /// IPC server configuration.
    pub ipc: IpcConfig,
    /// Geometry of the in-memory backend.
    pub headless: HeadlessConfig,
}

/// Behavior-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether `ensure_visible` animates when the request does not say.
    #[serde(default = "default_true")]
    pub animate_ensure_visible: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            animate_ensure_visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Socket path; the runtime directory is used when unset.
    pub socket_path: Option<PathBuf>,

    /// Clients must send their command within this period.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Largest accepted command line in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            read_timeout_ms: default_read_timeout_ms(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl IpcConfig {
    /// The socket to listen on.
    pub fn resolved_socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(default_socket_path)
    }
}

/// Monitors and workspaces the in-memory backend starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Work area of each monitor, by monitor index.
    #[serde(default = "default_monitors")]
    pub monitors: Vec<Rect>,

    /// Workspaces per monitor; each shares its monitor's work area.
    #[serde(default = "default_workspaces")]
    pub workspaces: usize,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            monitors: default_monitors(),
            workspaces: default_workspaces(),
        }
    }
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_read_timeout_ms() -> u64 {
    5000
}

fn default_max_message_size() -> usize {
    MAX_IPC_MESSAGE_SIZE
}

fn default_monitors() -> Vec<Rect> {
    vec![Rect::new(0, 0, 1920, 1040)]
}

fn default_workspaces() -> usize {
    4
}

// ============================================================================
// Validation
// ============================================================================

/// A value that was out of range and has been replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning {
    pub field: &'static str,
    pub message: String,
}

impl ConfigWarning {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Clamp out-of-range values in place, reporting each fix.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let defaults = CanvasConfig::default();
        let canvas = &mut self.canvas;

        if canvas.spacing < 0 {
            warnings.push(ConfigWarning::new(
                "canvas.spacing",
                format!("{} is negative, using 0", canvas.spacing),
            ));
            canvas.spacing = 0;
        }
        if !canvas.expansion_ratio.is_finite() || canvas.expansion_ratio < 1.0 {
            warnings.push(ConfigWarning::new(
                "canvas.expansion_ratio",
                format!(
                    "{} is below 1.0, using {}",
                    canvas.expansion_ratio, defaults.expansion_ratio
                ),
            ));
            canvas.expansion_ratio = defaults.expansion_ratio;
        }
        for (field, ratio, default) in [
            (
                "canvas.pan_left_ratio",
                &mut canvas.pan_left_ratio,
                defaults.pan_left_ratio,
            ),
            (
                "canvas.pan_right_ratio",
                &mut canvas.pan_right_ratio,
                defaults.pan_right_ratio,
            ),
        ] {
            if !ratio.is_finite() || *ratio <= 0.0 {
                warnings.push(ConfigWarning::new(
                    field,
                    format!("{} must be positive, using {}", ratio, default),
                ));
                *ratio = default;
            }
        }
        if canvas.scroll_step <= 0 {
            warnings.push(ConfigWarning::new(
                "canvas.scroll_step",
                format!("{} must be positive, using {}", canvas.scroll_step, defaults.scroll_step),
            ));
            canvas.scroll_step = defaults.scroll_step;
        }
        if canvas.animation_tick_ms == 0 {
            warnings.push(ConfigWarning::new(
                "canvas.animation_tick_ms",
                format!("0 is not a tick interval, using {}", defaults.animation_tick_ms),
            ));
            canvas.animation_tick_ms = defaults.animation_tick_ms;
        }
        if canvas.clip_fallback_ms == 0 {
            warnings.push(ConfigWarning::new(
                "canvas.clip_fallback_ms",
                format!("0 would skip the move notification, using {}", defaults.clip_fallback_ms),
            ));
            canvas.clip_fallback_ms = defaults.clip_fallback_ms;
        }
        if canvas.correction_tolerance < 0 {
            warnings.push(ConfigWarning::new(
                "canvas.correction_tolerance",
                format!("{} is negative, using 0", canvas.correction_tolerance),
            ));
            canvas.correction_tolerance = 0;
        }

        let level = self.behavior.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            warnings.push(ConfigWarning::new(
                "behavior.log_level",
                format!("unknown level '{}', using info", self.behavior.log_level),
            ));
            self.behavior.log_level = default_log_level();
        }

        if self.ipc.read_timeout_ms == 0 {
            warnings.push(ConfigWarning::new(
                "ipc.read_timeout_ms",
                format!("0 would drop every client, using {}", default_read_timeout_ms()),
            ));
            self.ipc.read_timeout_ms = default_read_timeout_ms();
        }
        if self.ipc.max_message_size == 0 || self.ipc.max_message_size > MAX_IPC_MESSAGE_SIZE {
            warnings.push(ConfigWarning::new(
                "ipc.max_message_size",
                format!(
                    "{} is outside 1..={}, using the maximum",
                    self.ipc.max_message_size, MAX_IPC_MESSAGE_SIZE
                ),
            ));
            self.ipc.max_message_size = MAX_IPC_MESSAGE_SIZE;
        }

        let before = self.headless.monitors.len();
        self.headless.monitors.retain(|area| !area.is_empty());
        if self.headless.monitors.len() != before {
            warnings.push(ConfigWarning::new(
                "headless.monitors",
                format!("dropped {} empty work areas", before - self.headless.monitors.len()),
            ));
        }
        if self.headless.workspaces == 0 {
            warnings.push(ConfigWarning::new(
                "headless.workspaces",
                "0 workspaces, using 1",
            ));
            self.headless.workspaces = 1;
        }

        warnings
    }

    /// Load configuration from standard locations.
    ///
    /// An explicit path must exist. Otherwise the first existing standard
    /// location wins, and defaults are used if there is none.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            tracing::info!("Loading config from: {}", path.display());
            return Self::load_from_path(path);
        }

        for path in config_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

/// Get all standard config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(proj_dirs) = ProjectDirs::from("com", "widedesk", "widedesk") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    if let Some(home) = dirs_home() {
        let unix_style = home.join(".config").join("widedesk").join("config.toml");
        if !paths.contains(&unix_style) {
            paths.push(unix_style);
        }
    }

    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Socket path inside the user's runtime directory, or the temp dir.
pub fn default_socket_path() -> PathBuf {
    directories::BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(Path::to_path_buf))
        .unwrap_or_else(std::env::temp_dir)
        .join(SOCKET_NAME)
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

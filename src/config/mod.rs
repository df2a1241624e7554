//! Configuration management

use crate::rpc::MAX_MESSAGE_SIZE;
use crate::terminal::{Rect, TerminalDefaults, DEFAULT_SCROLLBACK_LINES};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub rpc: RpcConfig,
    pub terminal: TerminalConfig,
}

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Command each new terminal runs
    pub default_shell: String,

    /// Socket directory
    pub runtime_dir: Option<PathBuf>,

    /// Milliseconds between hypervisor ticks
    pub tick_interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
            runtime_dir: None,
            tick_interval_ms: 10,
        }
    }
}

/// RPC settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// How long a client waits for any single response
    pub timeout_ms: u64,

    pub max_message_size: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Geometry of newly created terminals, in GL units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub columns: u16,
    pub rows: u16,

    /// Lines of process output kept per terminal
    pub scrollback_lines: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            left: -0.9,
            top: 0.9,
            width: 1.6,
            height: 1.6,
            columns: 80,
            rows: 24,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
        }
    }
}

impl Config {
    /// Load config from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termvisor")
            .join("config.toml")
    }

    /// Get the runtime directory for sockets
    pub fn runtime_dir(&self) -> PathBuf {
        self.general
            .runtime_dir
            .clone()
            .or_else(dirs::runtime_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("termvisor")
    }

    /// Get socket path for a session
    pub fn socket_path(&self, session_name: &str) -> PathBuf {
        self.runtime_dir().join(format!("{}.sock", session_name))
    }

    pub fn terminal_defaults(&self) -> TerminalDefaults {
        let t = &self.terminal;
        TerminalDefaults {
            bounds: Rect::new(t.left, t.top, t.width, t.height),
            columns: t.columns,
            rows: t.rows,
            scrollback_lines: t.scrollback_lines,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.general.tick_interval_ms.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms.max(1))
    }
}

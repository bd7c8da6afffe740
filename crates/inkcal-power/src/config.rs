//! Power helper configuration
//!
//! Every field has a default matching a stock PiSugar install on Raspberry Pi
//! OS, so an empty file (or no file at all) gives a working setup.

use crate::{PowerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// System-wide configuration directory
pub const CONFIG_DIR: &str = "/etc/inkcal";

/// Configuration file name, shared by the system and user locations
pub const CONFIG_FILE: &str = "power.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Address the PiSugar daemon listens on
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port of the PiSugar daemon
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect timeout for each round-trip, in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Read/write timeout for each round-trip, in milliseconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,

    /// SoC diagnostic utility
    #[serde(default = "default_vcgencmd")]
    pub vcgencmd: String,

    /// Kill `vcgencmd` if it runs longer than this, in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Enable the UPS battery input protection at startup
    #[serde(default = "default_true")]
    pub battery_input_protect: bool,

    /// Weekday repeat mask sent with the boot alarm (bit 0 = Sunday)
    #[serde(default = "default_alarm_repeat")]
    pub alarm_repeat_mask: u8,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8423
}

fn default_connect_timeout() -> u64 {
    1000
}

fn default_io_timeout() -> u64 {
    3000
}

fn default_vcgencmd() -> String {
    "vcgencmd".to_string()
}

fn default_command_timeout() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_alarm_repeat() -> u8 {
    127
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            io_timeout_ms: default_io_timeout(),
            vcgencmd: default_vcgencmd(),
            command_timeout_ms: default_command_timeout(),
            battery_input_protect: default_true(),
            alarm_repeat_mask: default_alarm_repeat(),
        }
    }
}

impl PowerConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PowerError::ConfigNotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self> {
        // Try user config first, then system config
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            return Self::load(&user_config);
        }

        let system_config = Path::new(CONFIG_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            return Self::load(&system_config);
        }

        tracing::warn!("No power configuration file found, using defaults");
        Ok(Self::default())
    }

    /// `$XDG_CONFIG_HOME/inkcal/power.toml`, falling back to `~/.config`
    pub fn user_config_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("inkcal").join(CONFIG_FILE))
    }

    /// Daemon endpoint as `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

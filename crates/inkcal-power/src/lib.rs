//! Power helper for the inkcal e-ink calendar
//!
//! Reports battery level, charging state and supply voltage stability on a
//! Raspberry Pi fitted with a PiSugar UPS. Battery data comes from the PiSugar
//! daemon's line protocol on a local TCP port; voltage data comes from the
//! SoC through `vcgencmd`. When the daemon is not reachable a mock adapter
//! with fixed answers stands in, so the calendar runs the same on a desktop.
//!
//! # Example
//!
//! ```no_run
//! use inkcal_power::{PowerConfig, create_power_adapter};
//!
//! let config = PowerConfig::default();
//! let power = create_power_adapter(&config);
//! println!("Battery: {}%", power.get_battery());
//! if !power.is_voltage_stable() {
//!     println!("Supply voltage is too low");
//! }
//! ```

pub mod adapter;
pub mod client;
pub mod config;
pub mod mock;
pub mod probe;
pub mod status;
pub mod voltage;

pub use adapter::{BATTERY_UNAVAILABLE, PiSugarAdapter, PowerAdapter};
pub use client::{DaemonClient, DaemonCommand};
pub use config::PowerConfig;
pub use mock::MockPowerAdapter;
pub use probe::is_battery_system_available;
pub use status::{CRITICAL_BATTERY_THRESHOLD, LOW_BATTERY_THRESHOLD, PowerStatus};
pub use voltage::{CommandRunner, HostCommand, ThrottleState, VoltageProbe};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PowerError {
    #[error("Daemon connection failed: {0}")]
    Connection(#[source] std::io::Error),

    #[error("Daemon sent an empty reply to '{0}'")]
    EmptyReply(String),

    #[error("Malformed reply to '{command}': {reply}")]
    MalformedReply { command: String, reply: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Power helper result type
pub type Result<T> = std::result::Result<T, PowerError>;

/// Pick the adapter for this process.
///
/// The daemon is probed exactly once. The returned handle is meant to be held
/// for the process lifetime; it does not follow the hardware if the daemon
/// appears or disappears later.
pub fn create_power_adapter(config: &PowerConfig) -> Box<dyn PowerAdapter> {
    if is_battery_system_available(config) {
        tracing::info!("PiSugar daemon found at {}", config.endpoint());
        Box::new(PiSugarAdapter::new(config))
    } else {
        tracing::info!("No battery daemon at {}, using mock power adapter", config.endpoint());
        Box::new(MockPowerAdapter::new(config))
    }
}

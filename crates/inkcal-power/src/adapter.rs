//! Power adapters
//!
//! [`PowerAdapter`] is the whole surface the calendar uses. [`PiSugarAdapter`]
//! talks to the PiSugar daemon; the mock in [`crate::mock`] answers the same
//! calls without hardware.

use crate::client::{DaemonClient, DaemonCommand};
use crate::voltage::VoltageProbe;
use crate::PowerConfig;
use chrono::{DateTime, FixedOffset};

/// Battery level reported when the daemon gave no usable answer
pub const BATTERY_UNAVAILABLE: f64 = -1.0;

/// Battery and supply capabilities shared by every adapter
pub trait PowerAdapter: Send + Sync {
    /// Battery charge in percent, or [`BATTERY_UNAVAILABLE`]
    fn get_battery(&self) -> f64;

    /// Whether external power is connected
    fn battery_power_plugged(&self) -> bool;

    /// Copy the UPS real-time clock to the system clock
    fn sync_time(&self);

    /// Program the UPS to power the Pi on at `when`
    fn set_next_boot_datetime(&self, when: DateTime<FixedOffset>) -> bool;

    /// SoC voltage probe backing the voltage checks
    fn voltage(&self) -> &VoltageProbe;

    fn is_voltage_stable(&self) -> bool {
        self.voltage().is_voltage_stable()
    }

    fn cpu_core_voltage(&self) -> Option<f64> {
        self.voltage().cpu_core_voltage()
    }

    fn is_mock(&self) -> bool {
        false
    }
}

/// Last whitespace-separated token as a percentage: `battery: 73.5` -> 73.5
pub fn parse_battery_level(reply: &str) -> Option<f64> {
    let level: f64 = reply.split_whitespace().last()?.parse().ok()?;
    (level.is_finite() && (0.0..=100.0).contains(&level)).then_some(level)
}

/// Last `": "`-separated token compared to `true`
pub fn parse_power_plugged(reply: &str) -> bool {
    reply.split(": ").last() == Some("true")
}

/// PiSugar UPS behind its local daemon
pub struct PiSugarAdapter {
    client: DaemonClient,
    voltage: VoltageProbe,
    alarm_repeat_mask: u8,
}

impl PiSugarAdapter {
    /// Create the adapter and enable battery input protection if configured
    pub fn new(config: &PowerConfig) -> Self {
        Self::with_parts(
            config,
            DaemonClient::new(config),
            VoltageProbe::new(config),
        )
    }

    /// Assemble from an existing client and probe
    pub fn with_parts(config: &PowerConfig, client: DaemonClient, voltage: VoltageProbe) -> Self {
        let adapter = Self {
            client,
            voltage,
            alarm_repeat_mask: config.alarm_repeat_mask,
        };

        if config.battery_input_protect {
            adapter.enable_input_protection();
        }

        adapter
    }

    fn enable_input_protection(&self) {
        if let Err(e) = self
            .client
            .send(&DaemonCommand::SetBatteryInputProtect(true))
        {
            tracing::info!("Invalid battery: could not enable input protection: {}", e);
        }
    }
}

impl PowerAdapter for PiSugarAdapter {
    fn get_battery(&self) -> f64 {
        let reply = match self.client.send(&DaemonCommand::GetBattery) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::info!("Invalid battery output: {}", e);
                return BATTERY_UNAVAILABLE;
            }
        };

        parse_battery_level(&reply).unwrap_or_else(|| {
            tracing::info!("Invalid battery output: {}", reply);
            BATTERY_UNAVAILABLE
        })
    }

    fn battery_power_plugged(&self) -> bool {
        match self.client.send(&DaemonCommand::GetBatteryPowerPlugged) {
            Ok(reply) => parse_power_plugged(&reply),
            Err(e) => {
                tracing::info!("Invalid battery output: {}", e);
                false
            }
        }
    }

    fn sync_time(&self) {
        if let Err(e) = self.client.send(&DaemonCommand::RtcToPi) {
            tracing::info!("Invalid time sync command: {}", e);
        }
    }

    fn set_next_boot_datetime(&self, when: DateTime<FixedOffset>) -> bool {
        let command = DaemonCommand::RtcAlarmSet {
            time: when,
            repeat: self.alarm_repeat_mask,
        };

        match self.client.send(&command) {
            Ok(reply) if reply.to_lowercase().contains("done") => {
                tracing::info!("Next boot scheduled for {}", when.to_rfc3339());
                true
            }
            Ok(reply) => {
                tracing::info!("Boot alarm rejected: {}", reply);
                false
            }
            Err(e) => {
                tracing::info!("Invalid boot alarm command: {}", e);
                false
            }
        }
    }

    fn voltage(&self) -> &VoltageProbe {
        &self.voltage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_battery_level() {
        assert_eq!(parse_battery_level("battery: 73.5"), Some(73.5));
        assert_eq!(parse_battery_level("... 73.5"), Some(73.5));
        assert_eq!(parse_battery_level("100"), Some(100.0));
        assert_eq!(parse_battery_level("battery: 0"), Some(0.0));
        assert_eq!(parse_battery_level("garbage"), None);
        assert_eq!(parse_battery_level(""), None);
    }

    #[test]
    fn test_battery_level_out_of_range() {
        assert_eq!(parse_battery_level("battery: nan"), None);
        assert_eq!(parse_battery_level("battery: inf"), None);
        assert_eq!(parse_battery_level("battery: 150"), None);
        assert_eq!(parse_battery_level("battery: -12"), None);
        assert_eq!(parse_battery_level("battery: 100.1"), None);
    }

    #[test]
    fn test_parse_power_plugged() {
        assert!(parse_power_plugged("battery_power_plugged: true"));
        assert!(!parse_power_plugged("battery_power_plugged: false"));
        assert!(!parse_power_plugged("battery_power_plugged: TRUE"));
        assert!(!parse_power_plugged("garbage"));
        assert!(!parse_power_plugged(""));
    }

    #[test]
    fn test_bare_true_counts_as_plugged() {
        // No separator: the whole reply is the last token
        assert!(parse_power_plugged("true"));
    }
}

//! Point-in-time power snapshot for display and logging

use crate::adapter::{BATTERY_UNAVAILABLE, PowerAdapter};
use crate::voltage::ThrottleState;
use serde::Serialize;

/// Low battery warning threshold (percentage)
pub const LOW_BATTERY_THRESHOLD: f64 = 20.0;

/// Critical battery threshold (percentage)
pub const CRITICAL_BATTERY_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerStatus {
    /// Battery level in percent; `None` when the daemon gave no answer
    pub battery: Option<f64>,
    pub plugged_in: bool,
    pub voltage_stable: bool,
    pub core_voltage: Option<f64>,
    pub throttle: Option<ThrottleState>,
    pub mock: bool,
}

impl PowerStatus {
    /// Query every reading from the adapter once
    pub fn collect(adapter: &dyn PowerAdapter) -> Self {
        let battery = adapter.get_battery();
        let (voltage_stable, throttle) = adapter.voltage().supply_state();
        Self {
            battery: (battery != BATTERY_UNAVAILABLE).then_some(battery),
            plugged_in: adapter.battery_power_plugged(),
            voltage_stable,
            core_voltage: adapter.cpu_core_voltage(),
            throttle,
            mock: adapter.is_mock(),
        }
    }

    /// Below `threshold` and not charging
    pub fn is_low(&self, threshold: f64) -> bool {
        match self.battery {
            Some(level) => level <= threshold && !self.plugged_in,
            None => false,
        }
    }

    pub fn is_battery_low(&self) -> bool {
        self.is_low(LOW_BATTERY_THRESHOLD)
    }

    pub fn is_battery_critical(&self) -> bool {
        self.is_low(CRITICAL_BATTERY_THRESHOLD)
    }
}

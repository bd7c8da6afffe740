//! Mock power adapter for machines without a PiSugar
//!
//! Battery answers are fixed. Voltage checks still go to the host's
//! `vcgencmd`, which works on any Raspberry Pi with or without a UPS.

use crate::adapter::PowerAdapter;
use crate::voltage::VoltageProbe;
use crate::PowerConfig;
use chrono::{DateTime, FixedOffset};

/// Battery level reported by the mock
pub const MOCK_BATTERY_LEVEL: f64 = 42.0;

pub struct MockPowerAdapter {
    voltage: VoltageProbe,
}

impl MockPowerAdapter {
    pub fn new(config: &PowerConfig) -> Self {
        Self::with_voltage(VoltageProbe::new(config))
    }

    pub fn with_voltage(voltage: VoltageProbe) -> Self {
        Self { voltage }
    }
}

impl PowerAdapter for MockPowerAdapter {
    fn get_battery(&self) -> f64 {
        MOCK_BATTERY_LEVEL
    }

    fn battery_power_plugged(&self) -> bool {
        false
    }

    fn sync_time(&self) {
        tracing::debug!("[MOCK] RTC sync skipped");
    }

    fn set_next_boot_datetime(&self, when: DateTime<FixedOffset>) -> bool {
        tracing::debug!("[MOCK] Next boot at {}", when.to_rfc3339());
        true
    }

    fn voltage(&self) -> &VoltageProbe {
        &self.voltage
    }

    fn is_mock(&self) -> bool {
        true
    }
}

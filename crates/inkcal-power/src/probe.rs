//! Battery daemon detection

use crate::client::{DaemonClient, DaemonCommand};
use crate::PowerConfig;

/// Whether a PiSugar daemon answers on the configured endpoint.
///
/// A port that accepts connections is not enough: the daemon must also answer
/// `get battery` with a reply mentioning the battery. Every failure reads as
/// "not available".
pub fn is_battery_system_available(config: &PowerConfig) -> bool {
    probe_daemon(&DaemonClient::new(config))
}

pub fn probe_daemon(client: &DaemonClient) -> bool {
    if !client.can_connect() {
        return false;
    }

    match client.send(&DaemonCommand::GetBattery) {
        Ok(reply) => reply.to_lowercase().contains("battery"),
        Err(e) => {
            tracing::debug!("Battery daemon probe failed: {}", e);
            false
        }
    }
}

//! PiSugar daemon line protocol
//!
//! The daemon speaks plain text over TCP: one command line in, one reply line
//! out. Every round-trip opens its own connection and closes it afterwards.
//!
//! ```text
//! > get battery\n
//! < battery: 73.5\n
//! ```

use crate::{PowerConfig, PowerError, Result};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

/// Commands understood by the PiSugar daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCommand {
    /// `get battery`
    GetBattery,
    /// `get battery_power_plugged`
    GetBatteryPowerPlugged,
    /// `rtc_rtc2pi`
    RtcToPi,
    /// `set_battery_input_protect <bool>`
    SetBatteryInputProtect(bool),
    /// `rtc_alarm_set <rfc3339> <weekday mask>`
    RtcAlarmSet {
        time: DateTime<FixedOffset>,
        repeat: u8,
    },
}

impl fmt::Display for DaemonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonCommand::GetBattery => write!(f, "get battery"),
            DaemonCommand::GetBatteryPowerPlugged => write!(f, "get battery_power_plugged"),
            DaemonCommand::RtcToPi => write!(f, "rtc_rtc2pi"),
            DaemonCommand::SetBatteryInputProtect(enabled) => {
                write!(f, "set_battery_input_protect {}", enabled)
            }
            DaemonCommand::RtcAlarmSet { time, repeat } => write!(
                f,
                "rtc_alarm_set {} {}",
                time.to_rfc3339_opts(SecondsFormat::Secs, false),
                repeat
            ),
        }
    }
}

/// One-shot client for the daemon's line protocol
pub struct DaemonClient {
    endpoint: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    /// The daemon is assumed to serve one client at a time
    in_flight: Mutex<()>,
}

impl DaemonClient {
    pub fn new(config: &PowerConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            connect_timeout: config.connect_timeout(),
            io_timeout: config.io_timeout(),
            in_flight: Mutex::new(()),
        }
    }

    /// Check that something accepts connections on the endpoint
    pub fn can_connect(&self) -> bool {
        match self.connect() {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Battery daemon not reachable: {}", e);
                false
            }
        }
    }

    /// Send a command and return the trimmed reply line
    pub fn send(&self, command: &DaemonCommand) -> Result<String> {
        self.send_line(&command.to_string())
    }

    /// Send a raw command line and return the trimmed reply line
    pub fn send_line(&self, command: &str) -> Result<String> {
        let _guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        let mut stream = self.connect()?;
        stream
            .set_read_timeout(Some(self.io_timeout))
            .map_err(PowerError::Connection)?;
        stream
            .set_write_timeout(Some(self.io_timeout))
            .map_err(PowerError::Connection)?;

        stream
            .write_all(format!("{}\n", command).as_bytes())
            .map_err(PowerError::Connection)?;
        stream.flush().map_err(PowerError::Connection)?;

        // Reads up to the first newline, or everything until the peer closes
        let mut reply = String::new();
        BufReader::new(&stream)
            .read_line(&mut reply)
            .map_err(PowerError::Connection)?;

        let reply = reply.trim_end();
        tracing::debug!("'{}' -> '{}'", command, reply);

        if reply.is_empty() {
            return Err(PowerError::EmptyReply(command.to_string()));
        }
        Ok(reply.to_string())
    }

    fn connect(&self) -> Result<TcpStream> {
        let addrs: Vec<SocketAddr> = self
            .endpoint
            .to_socket_addrs()
            .map_err(PowerError::Connection)?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }

        Err(PowerError::Connection(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve", self.endpoint),
            )
        })))
    }
}

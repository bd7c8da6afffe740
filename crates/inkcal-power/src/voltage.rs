//! SoC supply voltage checks through `vcgencmd`
//!
//! These read the Raspberry Pi firmware directly, not the battery daemon, so
//! they work the same behind the real and the mock power adapters.

use crate::{PowerConfig, PowerError, Result};
use serde::Serialize;
use std::process::{Command, Stdio};
use std::io::Read;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Substring of the `get_throttled` reply reported while under-voltage
pub const UNDER_VOLTAGE_PATTERN: &str = "0x50000";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs a host program and returns its standard output
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Runs programs on the host with a hard timeout
pub struct HostCommand {
    timeout: Duration,
}

impl HostCommand {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for HostCommand {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let path =
            which::which(program).map_err(|_| PowerError::CommandNotFound(program.to_string()))?;

        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes while waiting; a full pipe would stall the child
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PowerError::CommandTimeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;
        if status.success() {
            Ok(String::from_utf8_lossy(&stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&stderr);
            Err(PowerError::CommandFailed(format!(
                "{} {}: {}",
                program,
                args.join(" "),
                stderr.trim()
            )))
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| PowerError::CommandFailed("pipe reader panicked".to_string()))?
            .map_err(PowerError::Io),
        None => Ok(Vec::new()),
    }
}

/// Decoded `get_throttled` bit-field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThrottleState {
    pub bits: u32,
}

impl ThrottleState {
    const UNDER_VOLTAGE: u32 = 1 << 0;
    const FREQUENCY_CAPPED: u32 = 1 << 1;
    const THROTTLED: u32 = 1 << 2;
    const SOFT_TEMP_LIMIT: u32 = 1 << 3;
    const OCCURRED_SHIFT: u32 = 16;

    /// Parse `throttled=0x50005` (the `throttled=` prefix is optional)
    pub fn parse(output: &str) -> Option<Self> {
        let value = output.trim();
        let value = value.strip_prefix("throttled=").unwrap_or(value);
        let hex = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))?;
        u32::from_str_radix(hex, 16).ok().map(|bits| Self { bits })
    }

    pub fn under_voltage(&self) -> bool {
        self.bits & Self::UNDER_VOLTAGE != 0
    }

    pub fn frequency_capped(&self) -> bool {
        self.bits & Self::FREQUENCY_CAPPED != 0
    }

    pub fn throttled(&self) -> bool {
        self.bits & Self::THROTTLED != 0
    }

    pub fn soft_temp_limit(&self) -> bool {
        self.bits & Self::SOFT_TEMP_LIMIT != 0
    }

    /// Under-voltage seen at any point since boot
    pub fn under_voltage_occurred(&self) -> bool {
        self.bits & (Self::UNDER_VOLTAGE << Self::OCCURRED_SHIFT) != 0
    }

    pub fn frequency_capped_occurred(&self) -> bool {
        self.bits & (Self::FREQUENCY_CAPPED << Self::OCCURRED_SHIFT) != 0
    }

    pub fn throttled_occurred(&self) -> bool {
        self.bits & (Self::THROTTLED << Self::OCCURRED_SHIFT) != 0
    }

    pub fn soft_temp_limit_occurred(&self) -> bool {
        self.bits & (Self::SOFT_TEMP_LIMIT << Self::OCCURRED_SHIFT) != 0
    }
}

/// Parse `volt=0.8250V` into volts
pub fn parse_core_voltage(output: &str) -> Option<f64> {
    let (_, value) = output.trim().split_once('=')?;
    value.trim().trim_end_matches('V').parse().ok()
}

/// SoC voltage checks shared by every power adapter
pub struct VoltageProbe {
    program: String,
    runner: Box<dyn CommandRunner>,
}

impl VoltageProbe {
    pub fn new(config: &PowerConfig) -> Self {
        Self::with_runner(
            &config.vcgencmd,
            Box::new(HostCommand::new(config.command_timeout())),
        )
    }

    /// Use a custom runner, mainly for tests
    pub fn with_runner(program: &str, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            program: program.to_string(),
            runner,
        }
    }

    fn get_throttled(&self) -> Result<String> {
        let output = self.runner.run(&self.program, &["get_throttled"])?;
        Ok(output.trim().to_string())
    }

    /// False while the SoC reports under-voltage.
    ///
    /// A failing `vcgencmd` also reads as unstable.
    pub fn is_voltage_stable(&self) -> bool {
        Self::stable(&self.get_throttled())
    }

    /// Stability and decoded bit-field from a single `get_throttled` read
    pub fn supply_state(&self) -> (bool, Option<ThrottleState>) {
        let throttled = self.get_throttled();
        let state = throttled
            .as_ref()
            .ok()
            .and_then(|output| ThrottleState::parse(output));
        (Self::stable(&throttled), state)
    }

    fn stable(throttled: &Result<String>) -> bool {
        match throttled {
            Ok(throttled) if throttled.contains(UNDER_VOLTAGE_PATTERN) => {
                tracing::warn!("Low battery: supply voltage too low ({})", throttled);
                false
            }
            Ok(throttled) => {
                tracing::debug!("Voltage stable ({})", throttled);
                true
            }
            Err(e) => {
                tracing::debug!("Could not read throttle state: {}", e);
                false
            }
        }
    }

    /// Full throttle bit-field, if `vcgencmd` answered sensibly
    pub fn throttle_state(&self) -> Option<ThrottleState> {
        match self.get_throttled() {
            Ok(throttled) => ThrottleState::parse(&throttled),
            Err(e) => {
                tracing::debug!("Could not read throttle state: {}", e);
                None
            }
        }
    }

    /// Core voltage in volts, around 0.8 V on a healthy Pi
    pub fn cpu_core_voltage(&self) -> Option<f64> {
        let output = match self.runner.run(&self.program, &["measure_volts", "core"]) {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!("Error retrieving core voltage: {}", e);
                return None;
            }
        };

        let voltage = parse_core_voltage(&output);
        if voltage.is_none() {
            tracing::debug!("Unexpected core voltage output: {}", output.trim());
        }
        voltage
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers each argument line with a canned reply, or fails
    pub(crate) struct ScriptedRunner {
        replies: HashMap<String, Option<String>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self {
                replies: HashMap::new(),
            }
        }

        pub(crate) fn reply(mut self, args: &str, output: &str) -> Self {
            self.replies
                .insert(args.to_string(), Some(output.to_string()));
            self
        }

        pub(crate) fn fail(mut self, args: &str) -> Self {
            self.replies.insert(args.to_string(), None);
            self
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<String> {
            let args = args.join(" ");
            match self.replies.get(&args) {
                Some(Some(output)) => Ok(output.clone()),
                _ => Err(PowerError::CommandFailed(format!("{} {}", program, args))),
            }
        }
    }

    pub(crate) fn scripted_probe(runner: ScriptedRunner) -> VoltageProbe {
        VoltageProbe::with_runner("vcgencmd", Box::new(runner))
    }

    #[test]
    fn test_voltage_stable() {
        let probe = scripted_probe(ScriptedRunner::new().reply("get_throttled", "throttled=0x0\n"));
        assert!(probe.is_voltage_stable());
    }

    #[test]
    fn test_under_voltage() {
        let probe = scripted_probe(ScriptedRunner::new().reply("get_throttled", "throttled=0x50000\n"));
        assert!(!probe.is_voltage_stable());

        let probe = scripted_probe(ScriptedRunner::new().reply("get_throttled", "throttled=0x50000 "));
        assert!(!probe.is_voltage_stable());
    }

    #[test]
    fn test_stability_is_a_substring_match() {
        // Under-voltage bit set, but the reply does not contain 0x50000
        let probe = scripted_probe(ScriptedRunner::new().reply("get_throttled", "throttled=0x50005"));
        assert!(probe.is_voltage_stable());
        assert_eq!(
            probe.throttle_state().map(|state| state.under_voltage()),
            Some(true)
        );
    }

    #[test]
    fn test_supply_state() {
        let probe = scripted_probe(ScriptedRunner::new().reply("get_throttled", "throttled=0x50000"));
        let (stable, state) = probe.supply_state();
        assert!(!stable);
        assert_eq!(state, Some(ThrottleState { bits: 0x50000 }));

        let probe = scripted_probe(ScriptedRunner::new().fail("get_throttled"));
        assert_eq!(probe.supply_state(), (false, None));
    }

    #[test]
    fn test_other_throttle_bits_are_stable() {
        let probe = scripted_probe(ScriptedRunner::new().reply("get_throttled", "throttled=0x20000"));
        assert!(probe.is_voltage_stable());
    }

    #[test]
    fn test_throttle_command_failure() {
        let probe = scripted_probe(ScriptedRunner::new().fail("get_throttled"));
        assert!(!probe.is_voltage_stable());
        assert_eq!(probe.throttle_state(), None);
    }

    #[test]
    fn test_core_voltage() {
        let probe = scripted_probe(ScriptedRunner::new().reply("measure_volts core", "volt=0.8250V\n"));
        assert_eq!(probe.cpu_core_voltage(), Some(0.825));
    }

    #[test]
    fn test_core_voltage_garbage() {
        let probe = scripted_probe(ScriptedRunner::new().reply("measure_volts core", "volt=abcV"));
        assert_eq!(probe.cpu_core_voltage(), None);

        let probe = scripted_probe(ScriptedRunner::new().fail("measure_volts core"));
        assert_eq!(probe.cpu_core_voltage(), None);
    }

    #[test]
    fn test_parse_core_voltage() {
        assert_eq!(parse_core_voltage("volt=1.2000V"), Some(1.2));
        assert_eq!(parse_core_voltage("volt=0.8"), Some(0.8));
        assert_eq!(parse_core_voltage("0.8250V"), None);
        assert_eq!(parse_core_voltage(""), None);
    }

    #[test]
    fn test_throttle_state_bits() {
        let state = ThrottleState::parse("throttled=0x50005").unwrap();
        assert!(state.under_voltage());
        assert!(!state.frequency_capped());
        assert!(state.throttled());
        assert!(!state.soft_temp_limit());
        assert!(state.under_voltage_occurred());
        assert!(state.throttled_occurred());
        assert!(!state.frequency_capped_occurred());
        assert!(!state.soft_temp_limit_occurred());

        let state = ThrottleState::parse("0x0").unwrap();
        assert_eq!(state.bits, 0);
        assert!(!state.under_voltage());
    }

    #[test]
    fn test_throttle_state_invalid() {
        assert_eq!(ThrottleState::parse("throttled=zzz"), None);
        assert_eq!(ThrottleState::parse("throttled=0xZZ"), None);
        assert_eq!(ThrottleState::parse(""), None);
    }

    #[test]
    fn test_missing_program() {
        let runner = HostCommand::new(Duration::from_secs(1));
        let err = runner
            .run("inkcal-definitely-not-installed", &["get_throttled"])
            .unwrap_err();
        assert!(matches!(err, PowerError::CommandNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_host_command_output() {
        let runner = HostCommand::new(Duration::from_secs(5));
        let output = runner.run("echo", &["throttled=0x0"]).unwrap();
        assert_eq!(output.trim(), "throttled=0x0");
    }

    #[cfg(unix)]
    #[test]
    fn test_host_command_large_output() {
        // Far more than a pipe buffer holds
        let runner = HostCommand::new(Duration::from_secs(10));
        let output = runner.run("seq", &["1", "200000"]).unwrap();
        assert_eq!(output.lines().count(), 200000);
        assert_eq!(output.lines().last(), Some("200000"));
    }

    #[cfg(unix)]
    #[test]
    fn test_host_command_timeout() {
        let runner = HostCommand::new(Duration::from_millis(100));
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert!(matches!(err, PowerError::CommandTimeout(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_host_command_nonzero_exit() {
        let runner = HostCommand::new(Duration::from_secs(5));
        let err = runner.run("false", &[]).unwrap_err();
        assert!(matches!(err, PowerError::CommandFailed(_)));
    }
}

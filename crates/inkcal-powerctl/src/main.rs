//! inkcal power control
//!
//! Small front end over the power helper, handy from cron jobs and when
//! checking a PiSugar install by hand.
//!
//! ```text
//! inkcal-powerctl [-c CONFIG] [-j] [status | probe | sync-time | set-alarm RFC3339]
//! ```

use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset};
use getopts::Options;
use inkcal_power::{PowerConfig, PowerStatus, create_power_adapter, is_battery_system_available};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Status,
    Probe,
    SyncTime,
    SetAlarm(DateTime<FixedOffset>),
}

#[derive(Debug)]
struct Args {
    action: Action,
    config: Option<PathBuf>,
    json: bool,
}

enum Parsed {
    Run(Args),
    Help(String),
}

fn options() -> Options {
    let mut opts = Options::new();
    opts.optflag("h", "help", "Print this help message.");
    opts.optopt("c", "config", "Read settings from PATH.", "PATH");
    opts.optflag("j", "json", "Print the status as JSON.");
    opts
}

fn parse_args(args: &[String]) -> Result<Parsed> {
    let opts = options();
    let matches = opts.parse(args).context("Invalid arguments")?;

    if matches.opt_present("h") {
        let brief = "Usage: inkcal-powerctl [options] [status | probe | sync-time | set-alarm RFC3339]";
        return Ok(Parsed::Help(opts.usage(brief)));
    }

    let action = match matches.free.first().map(String::as_str) {
        None | Some("status") => Action::Status,
        Some("probe") => Action::Probe,
        Some("sync-time") => Action::SyncTime,
        Some("set-alarm") => {
            let Some(when) = matches.free.get(1) else {
                bail!("set-alarm needs a date such as 2026-10-18T06:30:00+02:00");
            };
            let when = DateTime::parse_from_rfc3339(when)
                .with_context(|| format!("Invalid alarm date: {}", when))?;
            Action::SetAlarm(when)
        }
        Some(other) => bail!("Unknown command: {}", other),
    };

    Ok(Parsed::Run(Args {
        action,
        config: matches.opt_str("c").map(PathBuf::from),
        json: matches.opt_present("j"),
    }))
}

fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is reserved for command output
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<PowerConfig> {
    match path {
        Some(path) => PowerConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None => PowerConfig::load_default().context("Failed to load power configuration"),
    }
}

fn print_status(status: &PowerStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    let source = if status.mock { "mock" } else { "pisugar" };
    match status.battery {
        Some(level) => println!("Battery:       {:.1}% ({})", level, source),
        None => println!("Battery:       unavailable ({})", source),
    }
    println!("Plugged in:    {}", if status.plugged_in { "yes" } else { "no" });
    println!("Voltage:       {}", if status.voltage_stable { "stable" } else { "LOW" });
    match status.core_voltage {
        Some(volts) => println!("Core voltage:  {:.4} V", volts),
        None => println!("Core voltage:  unknown"),
    }
    if let Some(throttle) = status.throttle {
        println!("Throttled:     0x{:x}", throttle.bits);
    }
    Ok(())
}

fn probe(config: &PowerConfig) -> ExitCode {
    let available = is_battery_system_available(config);
    println!("{}", if available { "available" } else { "unavailable" });
    if available {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(args.config.as_ref())?;

    match args.action {
        Action::Probe => return Ok(probe(&config)),
        Action::Status => {
            let power = create_power_adapter(&config);
            let status = PowerStatus::collect(power.as_ref());
            if status.is_battery_critical() {
                warn!("Battery critical: {:?}%", status.battery);
            } else if status.is_battery_low() {
                warn!("Battery low: {:?}%", status.battery);
            }
            print_status(&status, args.json)?;
        }
        Action::SyncTime => {
            create_power_adapter(&config).sync_time();
            info!("System time synced from UPS clock");
        }
        Action::SetAlarm(when) => {
            if !create_power_adapter(&config).set_next_boot_datetime(when) {
                bail!("UPS refused boot alarm for {}", when.to_rfc3339());
            }
            println!("Next boot: {}", when.to_rfc3339());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match parse_args(&args)? {
        Parsed::Help(usage) => {
            print!("{}", usage);
            Ok(ExitCode::SUCCESS)
        }
        Parsed::Run(args) => {
            setup_logging();
            run(args)
        }
    }
}

//! LK CAN Motor Scanner
//!
//! Scans the CAN bus for LK motors and prints their health.

use anyhow::Result;
use clap::Parser;
use crossterm::{
    execute,
    style::{Print, Stylize},
};
use lk_motor_control::{MotorId, MotorInfo, Session, SessionConfig};
use std::io::{stdout, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// LK Motor Scanner
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Starting motor ID
    #[arg(short, long, default_value = "1")]
    start_id: u8,

    /// Ending motor ID
    #[arg(short, long, default_value = "32")]
    end_id: u8,

    /// CAN interface
    #[arg(short, long, default_value = "can0")]
    interface: String,

    /// Reply timeout per motor in milliseconds
    #[arg(short, long, default_value = "50")]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let start = MotorId::new(args.start_id)?;
    let end = MotorId::new(args.end_id)?;

    print_header(start, end, args.timeout_ms)?;

    let session = Session::open_socketcan(SessionConfig::with_interface(&args.interface))?;
    execute!(
        stdout(),
        Print("✅ ".green()),
        Print(format!("Scanner ready (interface: {})\n", args.interface))
    )?;

    let motors = scan_motors(&session, start, end, Duration::from_millis(args.timeout_ms))?;
    print_summary(&motors)?;

    session.close();
    Ok(())
}

fn print_header(start: MotorId, end: MotorId, timeout_ms: u64) -> Result<()> {
    execute!(
        stdout(),
        Print("\n"),
        Print("=".repeat(50).cyan()),
        Print("\n"),
        Print("🚀 LK Motor Scanner\n".blue().bold()),
        Print(format!("Motor ID range: {}-{}\n", start, end)),
        Print(format!("Timeout: {}ms/motor\n", timeout_ms)),
        Print("=".repeat(50)),
        Print("\n")
    )?;
    Ok(())
}

fn scan_motors(session: &Session, start: MotorId, end: MotorId, timeout: Duration) -> Result<Vec<MotorInfo>> {
    let mut motors = Vec::new();

    for id in start.get()..=end.get() {
        let motor_id = MotorId::new(id)?;
        execute!(stdout(), Print(format!("Scanning ID {:2}... ", id)))?;
        stdout().flush()?;

        // one id at a time so the progress line stays in sync
        let info = session.ping(motor_id, timeout)?;
        if info.is_online {
            execute!(
                stdout(),
                Print("✅ ".green()),
                Print(format!("found (CAN ID: 0x{:X})\n", motor_id.arbitration_id()))
            )?;
        } else {
            execute!(stdout(), Print("no reply\n"))?;
        }
        motors.push(info);
    }

    Ok(motors)
}

fn print_summary(motors: &[MotorInfo]) -> Result<()> {
    let online_count = motors.iter().filter(|m| m.is_online).count();

    execute!(
        stdout(),
        Print("\n"),
        Print("=".repeat(50)),
        Print("\n"),
        Print(format!("Scan complete: {} motor(s) online\n", online_count))
    )?;

    for motor in motors.iter().filter(|m| m.is_online) {
        let faults = match motor.faults {
            Some(flags) if !flags.is_empty() => format!("faults 0x{:02X}", flags.bits()).red(),
            _ => "ok".to_string().green(),
        };
        execute!(
            stdout(),
            Print("  ID ".cyan()),
            Print(format!("{}", motor.motor_id)),
            Print(" - ".cyan()),
            Print(format!(
                "{}°C, {:.1}V, ",
                motor.temperature.unwrap_or_default(),
                motor.voltage.unwrap_or_default()
            )),
            Print(faults),
            Print(format!(" ({}ms)\n", motor.response_time_ms))
        )?;
    }

    execute!(stdout(), Print("=".repeat(50)), Print("\n"))?;
    Ok(())
}

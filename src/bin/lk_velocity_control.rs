//! LK Velocity Control
//!
//! Interactive closed-loop speed control for one motor.

use anyhow::Result;
use clap::Parser;
use crossterm::{
    execute,
    style::{Print, Stylize},
};
use lk_motor_control::{LkMotor, MotorId, Session, SessionConfig, TelemetryFrame};
use std::io::{stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// LK Velocity Control
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Motor ID
    #[arg(short, long, default_value = "1")]
    motor_id: u8,

    /// CAN interface
    #[arg(short, long, default_value = "can0")]
    interface: String,

    /// Acceleration in dps² written before control starts
    #[arg(short, long, default_value = "3600.0")]
    acceleration: f64,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "100")]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    print_header()?;

    let config = SessionConfig {
        response_timeout: Duration::from_millis(args.timeout_ms),
        ..SessionConfig::with_interface(&args.interface)
    };
    let session = Arc::new(Session::open_socketcan(config)?);
    let motor = LkMotor::new(Arc::clone(&session), MotorId::new(args.motor_id)?);

    let report = motor.clear_faults()?;
    if !report.is_healthy() {
        execute!(
            stdout(),
            Print("⚠️  ".yellow()),
            Print(format!("Motor reports faults 0x{:02X}\n", report.flags.bits()))
        )?;
    }
    motor.write_acceleration(args.acceleration)?;
    motor.enable()?;
    execute!(
        stdout(),
        Print("✅ ".green()),
        Print(format!("Motor {} enabled, ready for commands\n", args.motor_id))
    )?;

    let result = run_interactive_mode(&motor, &running);

    // Cleanup even when the loop failed
    let disabled = motor.shut_down();
    session.close();

    if let (Err(_), Err(e)) = (&result, &disabled) {
        warn!("Disable failed during cleanup: {}", e);
    }
    result?;
    disabled?;
    execute!(stdout(), Print("🛑 ".yellow()), Print("Motor disabled\n"))?;
    Ok(())
}

fn print_header() -> Result<()> {
    execute!(
        stdout(),
        Print("\n"),
        Print("=".repeat(50).cyan()),
        Print("\n"),
        Print("🏎️  Speed control mode\n".blue().bold()),
        Print("Commands:\n"),
        Print("  [speed]      -> target speed in dps (e.g. 360, -90)\n"),
        Print("  s            -> print motor state\n"),
        Print("  0            -> stop\n"),
        Print("  q            -> quit\n"),
        Print("=".repeat(50)),
        Print("\n")
    )?;
    Ok(())
}

fn run_interactive_mode(motor: &LkMotor, running: &Arc<AtomicBool>) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        execute!(stdout(), Print("command: "))?;
        stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        let input = input.trim();
        if input == "q" {
            break;
        } else if input == "s" {
            print_state(&motor.read_state()?)?;
        } else if input == "0" {
            let state = motor.stop()?;
            execute!(stdout(), Print("   -> 🛑 stop\n".yellow()))?;
            print_state(&state)?;
        } else if let Ok(speed) = input.parse::<f64>() {
            match motor.set_velocity(speed) {
                Ok(state) => {
                    execute!(stdout(), Print(format!("   -> target speed: {} dps\n", speed)))?;
                    print_state(&state)?;
                }
                Err(e) if e.is_retriable() => {
                    execute!(stdout(), Print(format!("   -> {} (retry)\n", e).yellow()))?;
                }
                Err(e) => return Err(e.into()),
            }
        } else if !input.is_empty() {
            execute!(stdout(), Print("invalid input\n".red()))?;
        }
    }

    Ok(())
}

fn print_state(state: &TelemetryFrame) -> Result<()> {
    execute!(
        stdout(),
        Print(format!(
            "   angle {:7.2}°  speed {:7.1} dps  current {:6.2} A  temp {}°C\n",
            state.position.unwrap_or_default(),
            state.velocity.unwrap_or_default(),
            state.current.unwrap_or_default(),
            state.temperature.unwrap_or_default()
        ))
    )?;
    Ok(())
}

//! LK Position Control
//!
//! Multi-turn position control with interactive, sine, step and test modes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use crossterm::{
    cursor::MoveToColumn,
    execute,
    style::{Print, Stylize},
    terminal::{Clear, ClearType},
};
use lk_motor_control::{LkMotor, MotorId, Session, SessionConfig, TelemetryFrame};
use std::f64::consts::PI;
use std::io::{stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// LK Position Control
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Motor ID
    #[arg(short, long, default_value = "1")]
    motor_id: u8,

    /// CAN interface
    #[arg(short, long, default_value = "can0")]
    interface: String,

    /// Speed limit in dps
    #[arg(short = 's', long, default_value = "720.0")]
    max_speed: f64,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "100")]
    timeout_ms: u64,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Interactive angle control
    Interactive,
    /// Sine wave control
    Sine {
        /// Amplitude in degrees
        #[arg(long, default_value = "90.0")]
        amplitude: f64,
        /// Frequency in Hz
        #[arg(long, default_value = "0.2")]
        frequency: f64,
        /// Duration in seconds
        #[arg(long, default_value = "10.0")]
        duration: f64,
    },
    /// Step control
    Step {
        /// Comma-separated angles
        #[arg(long)]
        angles: String,
        /// Time per step in seconds
        #[arg(long, default_value = "3.0")]
        step_time: f64,
    },
    /// Multi-position test
    Test {
        /// Comma-separated positions
        #[arg(long, default_value = "0,30,60,90,60,30,0")]
        positions: String,
    },
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

    let config = SessionConfig {
        response_timeout: Duration::from_millis(args.timeout_ms),
        ..SessionConfig::with_interface(&args.interface)
    };
    let session = Arc::new(Session::open_socketcan(config)?);
    let motor = LkMotor::new(Arc::clone(&session), MotorId::new(args.motor_id)?);

    motor.enable()?;
    let start = motor.read_multi_turn_angle()?;
    execute!(
        stdout(),
        Print("✅ ".green()),
        Print(format!(
            "Motor {} enabled at {:.2}°\n",
            args.motor_id,
            start.position.unwrap_or_default()
        ))
    )?;

    let control = PositionControl {
        motor: &motor,
        running: &running,
        max_speed: args.max_speed,
    };
    let result = match args.mode.unwrap_or(Mode::Interactive) {
        Mode::Interactive => control.run_interactive(),
        Mode::Sine {
            amplitude,
            frequency,
            duration,
        } => control.run_sine_wave(amplitude, frequency, duration),
        Mode::Step { angles, step_time } => {
            parse_double_list(&angles).and_then(|angles| control.run_steps(&angles, step_time))
        }
        Mode::Test { positions } => {
            parse_double_list(&positions).and_then(|positions| control.test_positions(&positions))
        }
    };

    // Cleanup even when the control mode failed
    let disabled = motor.shut_down();
    session.close();

    if let (Err(_), Err(e)) = (&result, &disabled) {
        warn!("Disable failed during cleanup: {}", e);
    }
    result?;
    disabled?;
    execute!(stdout(), Print("\n🛑 ".yellow()), Print("Motor disabled\n"))?;
    Ok(())
}

struct PositionControl<'a> {
    motor: &'a LkMotor,
    running: &'a Arc<AtomicBool>,
    max_speed: f64,
}

impl PositionControl<'_> {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_angle(&self, degrees: f64) -> Result<TelemetryFrame> {
        Ok(self.motor.set_position_with_speed(degrees, self.max_speed)?)
    }

    fn run_interactive(&self) -> Result<()> {
        print_banner(
            "🎯 Interactive position control",
            &[
                "Enter a target angle in degrees (e.g. 90)",
                format!("Speed limit: {} dps", self.max_speed).as_str(),
                "q to quit",
            ],
        )?;

        while self.is_running() {
            execute!(stdout(), Print("(0xA4) > "))?;
            stdout().flush()?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;

            let input = input.trim();
            if input.eq_ignore_ascii_case("q") {
                break;
            } else if let Ok(angle) = input.parse::<f64>() {
                let state = self.set_angle(angle)?;
                execute!(stdout(), Print(format!("   -> target: {}°\n", angle)))?;
                print_state(&state)?;
            } else if !input.is_empty() {
                execute!(stdout(), Print("invalid input\n".red()))?;
            }
        }

        Ok(())
    }

    fn run_sine_wave(&self, amplitude_deg: f64, frequency_hz: f64, duration_sec: f64) -> Result<()> {
        print_banner(
            "🌊 Sine wave position control",
            &[format!(
                "Amplitude: {}°, frequency: {} Hz, duration: {}s",
                amplitude_deg, frequency_hz, duration_sec
            )
            .as_str()],
        )?;

        let start_time = Instant::now();
        while self.is_running() && start_time.elapsed().as_secs_f64() < duration_sec {
            let elapsed = start_time.elapsed().as_secs_f64();
            let target_deg = amplitude_deg * (2.0 * PI * frequency_hz * elapsed).sin();

            // a missed reply in a 100Hz stream is not worth aborting for
            match self.set_angle(target_deg) {
                Ok(state) => execute!(
                    stdout(),
                    MoveToColumn(0),
                    Clear(ClearType::CurrentLine),
                    Print(format!(
                        "target: {:7.1}°  speed: {:7.1} dps",
                        target_deg,
                        state.velocity.unwrap_or_default()
                    ))
                )?,
                Err(e) => warn!("Set-point {:.1}° failed: {}", target_deg, e),
            }

            stdout().flush()?;
            thread::sleep(Duration::from_millis(10));
        }

        Ok(())
    }

    fn run_steps(&self, angles: &[f64], step_duration_sec: f64) -> Result<()> {
        print_banner(
            "📈 Step position control",
            &[
                format!("Angles: {}", join_angles(angles)).as_str(),
                format!("Step time: {}s", step_duration_sec).as_str(),
            ],
        )?;

        for (step, &angle) in angles.iter().enumerate() {
            if !self.is_running() {
                break;
            }
            execute!(
                stdout(),
                Print(format!("\n--- step {}/{}: {}° ---\n", step + 1, angles.len(), angle))
            )?;
            self.set_angle(angle)?;

            let step_start = Instant::now();
            while self.is_running() && step_start.elapsed().as_secs_f64() < step_duration_sec {
                let state = self.motor.read_multi_turn_angle()?;
                let remaining = step_duration_sec - step_start.elapsed().as_secs_f64();
                execute!(
                    stdout(),
                    MoveToColumn(0),
                    Clear(ClearType::CurrentLine),
                    Print(format!(
                        "angle: {:7.2}°  remaining: {:.1}s",
                        state.position.unwrap_or_default(),
                        remaining
                    ))
                )?;
                stdout().flush()?;
                thread::sleep(Duration::from_millis(100));
            }
        }

        Ok(())
    }

    fn test_positions(&self, positions: &[f64]) -> Result<()> {
        print_banner(
            "🧪 Multi-position test",
            &[format!("Positions: {}", join_angles(positions)).as_str()],
        )?;

        for (i, &position) in positions.iter().enumerate() {
            if !self.is_running() {
                break;
            }
            execute!(
                stdout(),
                Print(format!("\n--- position {}/{}: {}° ---\n", i + 1, positions.len(), position))
            )?;
            self.set_angle(position)?;

            execute!(stdout(), Print("settling for 2s..."))?;
            stdout().flush()?;
            thread::sleep(Duration::from_secs(2));

            let reached = self.motor.read_multi_turn_angle()?.position.unwrap_or_default();
            execute!(
                stdout(),
                Print(format!(" reached {:.2}° (error {:+.2}°)\n", reached, reached - position))
            )?;
        }

        Ok(())
    }
}

fn print_banner(title: &str, lines: &[&str]) -> Result<()> {
    execute!(
        stdout(),
        Print("\n"),
        Print("=".repeat(50).cyan()),
        Print("\n"),
        Print(format!("{}\n", title).blue().bold())
    )?;
    for line in lines {
        execute!(stdout(), Print(format!("{}\n", line)))?;
    }
    execute!(stdout(), Print("=".repeat(50)), Print("\n"))?;
    Ok(())
}

fn print_state(state: &TelemetryFrame) -> Result<()> {
    execute!(
        stdout(),
        Print(format!(
            "   shaft {:7.2}°  speed {:7.1} dps  current {:6.2} A  temp {}°C\n",
            state.position.unwrap_or_default(),
            state.velocity.unwrap_or_default(),
            state.current.unwrap_or_default(),
            state.temperature.unwrap_or_default()
        ))
    )?;
    Ok(())
}

fn join_angles(angles: &[f64]) -> String {
    angles
        .iter()
        .map(|a| format!("{}°", a))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_double_list(s: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(|s| s.trim().parse::<f64>().map_err(Into::into))
        .collect()
}

//! Desktop simulation of the motor controller against a modelled motor.
//!
//! Runs the 1 kHz control tick against [`SimulatedMotor`] and prints the
//! motor state as it goes:
//!
//! 1. voltage mode with a ramp
//! 2. closed-loop speed on a quadrature encoder
//! 3. closed-loop position
//! 4. a bus brown-out and the fault recovery
//!
//! # Usage
//!
//! ```sh
//! cargo run --bin bdc_sim --features sim
//! ```
//!
//! Set `BDC_LOG=debug` (or `warn`, `off`, ...) to change the log level.

use std::sync::OnceLock;

use bdc_controller::hal::{MockBridge, MockLimits, MockSensors, SimulatedMotor};
use bdc_controller::{
    Command, CommandQueue, CommandSender, CommandStream, Config, Controller, ControllerState,
    LinkType,
};
use log::{info, LevelFilter, Metadata, Record};

type SimController = Controller<MockBridge, MockLimits, MockSensors>;

/// Ticks between printed samples.
const PRINT_INTERVAL: u32 = 250;

// ============================================================================
// Logging
// ============================================================================

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:<5} {} - {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

fn init_logging() -> anyhow::Result<()> {
    let level = std::env::var("BDC_LOG")
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    let logger = LOGGER.get_or_init(|| StderrLogger);
    log::set_logger(logger)
        .map(|()| log::set_max_level(level))
        .map_err(|e| anyhow::anyhow!("Logger init failed: {}", e))
}

// ============================================================================
// Simulation
// ============================================================================

struct Sim {
    controller: SimController,
    motor: SimulatedMotor,
    time_ms: u32,
}

impl Sim {
    fn new(config: &Config) -> Self {
        Self {
            controller: Controller::new(
                MockBridge::new(),
                MockLimits::closed(),
                MockSensors::new(),
                config,
            ),
            motor: SimulatedMotor::new(),
            time_ms: 0,
        }
    }

    /// Run `ticks` control periods, printing every [`PRINT_INTERVAL`].
    fn run<C: CommandStream>(&mut self, commands: &mut C, ticks: u32) -> anyhow::Result<()> {
        for _ in 0..ticks {
            if self.controller.link_active() {
                self.controller.watchdog_pet();
            }
            self.controller
                .tick(commands)
                .map_err(|e| anyhow::anyhow!("Bridge error: {:?}", e))?;

            let drive = self.controller.bridge().drive;
            let period = self.controller.hbridge().period_clocks();
            self.motor.step(drive, period, self.controller.sensors_mut());

            self.time_ms += 1;
            if self.time_ms % PRINT_INTERVAL == 0 {
                self.print();
            }
        }
        Ok(())
    }

    fn print(&self) {
        let s = self.controller.status();
        println!(
            "{:>6} ms  {:<11} {:<8} V={:>6}  speed={:>7.1} rpm  pos={:>7.3} rev  I={:>5.1} A  faults={:#04x}",
            self.time_ms,
            format!("{:?}", s.state),
            format!("{:?}", s.mode),
            s.voltage,
            self.motor.speed() as f64 / 65536.0,
            self.controller.sensors().position as f64 / 65536.0,
            s.current as f64 / 256.0,
            s.faults.bits(),
        );
    }
}

fn send_all<const N: usize>(
    tx: &mut CommandSender<'_, N>,
    commands: &[Command],
) -> anyhow::Result<()> {
    for cmd in commands {
        if !tx.send(*cmd) {
            anyhow::bail!("Command queue full");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging()?;

    println!();
    println!("================================");
    println!("  bdc-controller simulation");
    println!("================================");
    println!();

    let config = Config::default();
    let mut sim = Sim::new(&config);
    let mut queue: CommandQueue = CommandQueue::new();
    let (mut tx, mut rx) = queue.split();

    sim.controller.link_good(LinkType::Can);
    sim.run(&mut rx, 10)?;
    if sim.controller.state() != ControllerState::Run {
        anyhow::bail!("Controller did not reach Run");
    }

    // =========================================================================
    // Voltage mode
    // =========================================================================
    println!("-- voltage mode, ramp to 75% --");
    send_all(
        &mut tx,
        &[
            Command::SpeedSource(3),
            Command::PositionSource(0),
            Command::VoltageRate(50),
            Command::VoltageSet(24575),
        ],
    )?;
    sim.run(&mut rx, 1500)?;

    send_all(&mut tx, &[Command::VoltageSet(0)])?;
    sim.run(&mut rx, 500)?;

    // =========================================================================
    // Speed mode
    // =========================================================================
    println!("-- speed mode, 2000 rpm --");
    send_all(
        &mut tx,
        &[
            Command::SpeedMode(true),
            Command::SpeedP(3277),
            Command::SpeedI(131),
            Command::SpeedSet(2000 << 16),
        ],
    )?;
    sim.run(&mut rx, 1500)?;

    // =========================================================================
    // Position mode
    // =========================================================================
    println!("-- position mode, 10 revolutions --");
    send_all(
        &mut tx,
        &[
            Command::PositionMode {
                enable: true,
                start: 0,
            },
            Command::PositionP(64 << 16),
            Command::PositionD(2048 << 16),
            Command::PositionSet(10 << 16),
        ],
    )?;
    sim.run(&mut rx, 2000)?;

    // =========================================================================
    // Brown-out
    // =========================================================================
    println!("-- bus brown-out --");
    send_all(&mut tx, &[Command::VoltageMode(true), Command::VoltageSet(16384)])?;
    sim.run(&mut rx, 500)?;

    sim.controller.sensors_mut().bus_voltage = 5 * 256;
    sim.run(&mut rx, 250)?;
    info!("bus restored");
    sim.controller.sensors_mut().bus_voltage = 12 * 256;
    sim.run(&mut rx, 3500)?;

    let counts = sim.controller.fault_counts();
    println!();
    println!(
        "sticky faults {:#04x}, brown-outs {}",
        sim.controller.sticky_faults(true).bits(),
        counts.bus_voltage
    );
    Ok(())
}

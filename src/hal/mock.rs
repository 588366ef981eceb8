//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for the hardware traits, so the
//! controller can be developed and tested on desktop without a board.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockBridge`] | [`BridgeOutputs`] | Records the last drive pattern and gate resets |
//! | [`MockLimits`] | [`LimitInputs`] | Switch states and cross-jumper probe |
//! | [`MockSensors`] | [`MotorSensors`] | Settable position, speed and analog readings |
//! | [`SimulatedMotor`] | - | First-order motor model feeding [`MockSensors`] |
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::{Command, CommandQueue, Config, Controller, LinkType};
//! use bdc_controller::hal::{MockBridge, MockLimits, MockSensors, SimulatedMotor};
//!
//! let mut controller = Controller::new(
//!     MockBridge::new(),
//!     MockLimits::closed(),
//!     MockSensors::new(),
//!     &Config::default(),
//! );
//! let mut motor = SimulatedMotor::new();
//! let mut queue: CommandQueue = CommandQueue::new();
//!
//! controller.link_good(LinkType::Can);
//! assert!(queue.send(Command::SpeedSource(3)));
//! assert!(queue.send(Command::VoltageSet(32767)));
//!
//! for _ in 0..100 {
//!     controller.watchdog_pet();
//!     controller.tick(&mut queue).unwrap();
//!     let drive = controller.bridge().drive;
//!     let period = controller.hbridge().period_clocks();
//!     motor.step(drive, period, controller.sensors_mut());
//! }
//!
//! // Spinning forward
//! assert!(controller.speed() > 0);
//! ```
//!
//! [`BridgeOutputs`]: crate::traits::BridgeOutputs
//! [`LimitInputs`]: crate::traits::LimitInputs
//! [`MotorSensors`]: crate::traits::MotorSensors

use crate::traits::{BridgeDrive, BridgeOutputs, LimitInputs, MotorSensors, NeutralMode, Polarity};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock bridge outputs.
///
/// Records the last pattern applied. Use the public fields to inspect state
/// or inject a gate driver fault.
///
/// # Example
///
/// ```rust
/// use bdc_controller::hal::MockBridge;
/// use bdc_controller::traits::{BridgeDrive, BridgeOutputs, Polarity};
///
/// let mut bridge = MockBridge::new();
/// bridge.apply(BridgeDrive::Full(Polarity::Reverse)).unwrap();
///
/// assert_eq!(bridge.drive, BridgeDrive::Full(Polarity::Reverse));
/// assert_eq!(bridge.apply_count, 1);
///
/// bridge.gate_fault = true;
/// bridge.reset_gate_driver().unwrap();
/// assert!(!bridge.gate_fault);
/// assert_eq!(bridge.gate_resets, 1);
/// ```
#[derive(Debug, Default)]
pub struct MockBridge {
    /// Last pattern applied.
    pub drive: BridgeDrive,
    /// Brake/coast jumper position.
    pub jumper: NeutralMode,
    /// Gate driver fault line.
    pub gate_fault: bool,
    /// Number of gate driver resets.
    pub gate_resets: usize,
    /// Number of times `apply` was called.
    pub apply_count: usize,
}

impl MockBridge {
    /// Creates a bridge in brake with the jumper set to brake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bridge with the jumper set to coast.
    pub fn coasting() -> Self {
        Self {
            jumper: NeutralMode::Coast,
            ..Self::default()
        }
    }
}

impl BridgeOutputs for MockBridge {
    type Error = ();

    fn apply(&mut self, drive: BridgeDrive) -> Result<(), ()> {
        self.drive = drive;
        self.apply_count += 1;
        Ok(())
    }

    fn gate_fault(&self) -> bool {
        self.gate_fault
    }

    fn reset_gate_driver(&mut self) -> Result<(), ()> {
        self.gate_fault = false;
        self.gate_resets += 1;
        Ok(())
    }

    fn jumper_mode(&self) -> NeutralMode {
        self.jumper
    }
}

/// Mock limit switch inputs.
///
/// `true` means the switch is closed, which allows travel in that direction.
///
/// # Example
///
/// ```rust
/// use bdc_controller::hal::MockLimits;
/// use bdc_controller::traits::LimitInputs;
///
/// let mut inputs = MockLimits::open();
/// inputs.cross_jumper = true;
///
/// assert!(!inputs.forward_closed());
/// assert!(inputs.probe_cross_jumper());
/// assert_eq!(inputs.probe_count, 1);
/// ```
#[derive(Debug, Default)]
pub struct MockLimits {
    /// Forward switch closed.
    pub forward: bool,
    /// Reverse switch closed.
    pub reverse: bool,
    /// Whether a probe finds the inputs cross-connected.
    pub cross_jumper: bool,
    /// Number of cross-jumper probes.
    pub probe_count: usize,
}

impl MockLimits {
    /// Both switches closed: travel allowed both ways.
    pub fn closed() -> Self {
        Self {
            forward: true,
            reverse: true,
            ..Self::default()
        }
    }

    /// Both switches open: travel blocked both ways.
    pub fn open() -> Self {
        Self::default()
    }
}

impl LimitInputs for MockLimits {
    fn forward_closed(&self) -> bool {
        self.forward
    }

    fn reverse_closed(&self) -> bool {
        self.reverse
    }

    fn probe_cross_jumper(&mut self) -> bool {
        self.probe_count += 1;
        self.cross_jumper
    }
}

/// Mock motor sensors.
///
/// Every reading is a public field. Positions are 16.16 revolutions, speeds
/// 16.16 RPM, and analog readings 8.8.
///
/// # Example
///
/// ```rust
/// use bdc_controller::hal::MockSensors;
/// use bdc_controller::traits::MotorSensors;
///
/// let mut sensors = MockSensors::new().with_current(5 * 256);
/// assert_eq!(sensors.winding_current(), 5 * 256);
/// assert_eq!(sensors.bus_voltage(), 12 * 256);
///
/// sensors.set_encoder_position(1 << 16);
/// assert_eq!(sensors.encoder_position(), 1 << 16);
/// ```
#[derive(Debug, Clone)]
pub struct MockSensors {
    /// Encoder position.
    pub position: i32,
    /// Single-channel (unsigned) encoder speed.
    pub velocity: i32,
    /// Quadrature (signed) encoder speed.
    pub quad_velocity: i32,
    /// Potentiometer position.
    pub pot: i32,
    /// Winding current.
    pub current: i32,
    /// Bus voltage.
    pub bus_voltage: i32,
    /// Temperature.
    pub temperature: i32,
    /// ADC calibration finished.
    pub calibrated: bool,
    /// Encoder lines per revolution.
    pub encoder_lines: u32,
    /// Potentiometer turns.
    pub pot_turns: u32,
}

impl Default for MockSensors {
    fn default() -> Self {
        Self {
            position: 0,
            velocity: 0,
            quad_velocity: 0,
            pot: 0,
            current: 0,
            bus_voltage: 12 * 256,
            temperature: 25 * 256,
            calibrated: true,
            encoder_lines: 1,
            pot_turns: 1,
        }
    }
}

impl MockSensors {
    /// Creates sensors reading a healthy idle motor on a 12 V bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the winding current reading.
    pub fn with_current(mut self, current: i32) -> Self {
        self.current = current;
        self
    }

    /// Set the bus voltage reading.
    pub fn with_bus_voltage(mut self, volts: i32) -> Self {
        self.bus_voltage = volts;
        self
    }

    /// Set the temperature reading.
    pub fn with_temperature(mut self, temperature: i32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set both encoder speed readings from a signed speed.
    pub fn with_speed(mut self, speed: i32) -> Self {
        self.quad_velocity = speed;
        self.velocity = speed.saturating_abs();
        self
    }

    /// Set the potentiometer reading.
    pub fn with_pot(mut self, pot: i32) -> Self {
        self.pot = pot;
        self
    }

    /// Mark ADC calibration as still running.
    pub fn uncalibrated(mut self) -> Self {
        self.calibrated = false;
        self
    }
}

impl MotorSensors for MockSensors {
    fn encoder_position(&self) -> i32 {
        self.position
    }

    fn set_encoder_position(&mut self, position: i32) {
        self.position = position;
    }

    fn velocity(&self, quadrature: bool) -> i32 {
        if quadrature {
            self.quad_velocity
        } else {
            self.velocity
        }
    }

    fn pot_position(&self) -> i32 {
        self.pot
    }

    fn winding_current(&self) -> i32 {
        self.current
    }

    fn bus_voltage(&self) -> i32 {
        self.bus_voltage
    }

    fn temperature(&self) -> i32 {
        self.temperature
    }

    fn calibration_done(&self) -> bool {
        self.calibrated
    }

    fn set_encoder_lines(&mut self, lines: u32) {
        self.encoder_lines = lines;
    }

    fn set_pot_turns(&mut self, turns: u32) {
        self.pot_turns = turns;
    }
}

// ============================================================================
// Motor Model
// ============================================================================

/// Ticks per minute at the 1 kHz control rate.
const TICKS_PER_MINUTE: i64 = 60_000;

/// First-order brushed motor model.
///
/// Speed settles toward `free_speed * duty * (bus / 12 V)` with the given
/// time constant. Braking settles toward zero at the same rate, coasting
/// four times slower. Current is proportional to the gap between the
/// applied and back-EMF voltages. The encoder count is advanced relative to
/// its current value, so encoder resets are honoured. Call
/// [`step`](Self::step) once per tick.
#[derive(Debug, Clone)]
pub struct SimulatedMotor {
    /// Unloaded speed at 12 V (16.16 RPM).
    pub free_speed: i64,
    /// Current at stall on 12 V (8.8 A).
    pub stall_current: i64,
    /// Speed time constant in ticks.
    pub time_constant: i64,
    speed: i64,
    position: i64,
}

impl Default for SimulatedMotor {
    fn default() -> Self {
        Self {
            free_speed: 5_000 << 16,
            stall_current: 30 * 256,
            time_constant: 50,
            speed: 0,
            position: 0,
        }
    }
}

impl SimulatedMotor {
    /// Creates a motor at rest with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unloaded speed at 12 V (16.16 RPM).
    pub fn with_free_speed(mut self, rpm: i32) -> Self {
        self.free_speed = (rpm as i64) << 16;
        self
    }

    /// Set the speed time constant in ticks.
    pub fn with_time_constant(mut self, ticks: u32) -> Self {
        self.time_constant = (ticks as i64).max(1);
        self
    }

    /// Current speed (16.16 RPM).
    pub fn speed(&self) -> i32 {
        self.speed as i32
    }

    /// Advance one tick under `drive` and publish the result to `sensors`.
    pub fn step(&mut self, drive: BridgeDrive, period: u32, sensors: &mut MockSensors) {
        // duty in 16.16
        let duty: i64 = match drive {
            BridgeDrive::Neutral(_) => 0,
            BridgeDrive::Full(p) => sign(p) << 16,
            BridgeDrive::Pulse {
                polarity, on_clocks, ..
            } => sign(polarity) * ((on_clocks as i64) << 16) / (period.max(1) as i64),
        };

        let bus = sensors.bus_voltage.max(0) as i64;
        let target = self.free_speed * duty / 65_536 * bus / (12 * 256);
        let tau = match drive {
            BridgeDrive::Neutral(NeutralMode::Coast) => self.time_constant * 4,
            _ => self.time_constant,
        };
        self.speed += (target - self.speed) / tau.max(1);

        // sub-count remainder of 16.16 rev, scaled by ticks per minute
        self.position += self.speed;
        let revs = self.position / TICKS_PER_MINUTE;
        self.position -= revs * TICKS_PER_MINUTE;

        let current = if self.free_speed == 0 || duty == 0 {
            0
        } else {
            self.stall_current * (target - self.speed) / self.free_speed
        };

        sensors.position = sensors.position.wrapping_add(revs as i32);
        sensors.quad_velocity = self.speed as i32;
        sensors.velocity = self.speed.abs() as i32;
        sensors.current = current.unsigned_abs() as i32;
    }
}

fn sign(polarity: Polarity) -> i64 {
    match polarity {
        Polarity::Forward => 1,
        Polarity::Reverse => -1,
    }
}

//! Top-level motor controller: link/fault state machine and control modes.
//!
//! This module provides [`Controller`], which owns the hardware, the PID
//! loops, the limit monitor, the H-bridge driver and the fault monitor.
//!
//! # Overview
//!
//! Call [`Controller::tick`] once per millisecond. Each tick:
//!
//! 1. Advances the state machine ([`ControllerState`]). In `Run` it drains
//!    the command stream and runs the active control mode. In `Fault` it
//!    drains the stream but discards anything that would drive the motor.
//! 2. Runs the link watchdog.
//! 3. Samples the limit switches and soft limits.
//! 4. Writes the resulting voltage to the H-bridge.
//! 5. Samples the fault monitor.
//!
//! Faults raised in steps 4 and 5 are acted on at the start of the next tick.
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::{Config, Controller, Command, CommandQueue, ControllerState, LinkType};
//! use bdc_controller::hal::{MockBridge, MockLimits, MockSensors};
//!
//! let mut controller = Controller::new(
//!     MockBridge::new(),
//!     MockLimits::closed(),
//!     MockSensors::new(),
//!     &Config::default(),
//! );
//! let mut queue: CommandQueue = CommandQueue::new();
//!
//! // Nothing happens until a link is up
//! controller.tick(&mut queue).unwrap();
//! assert_eq!(controller.state(), ControllerState::WaitForLink);
//!
//! controller.link_good(LinkType::Can);
//! controller.tick(&mut queue).unwrap();
//! assert_eq!(controller.state(), ControllerState::Run);
//!
//! assert!(queue.send(Command::VoltageSet(16384)));
//! controller.tick(&mut queue).unwrap();
//! assert_eq!(controller.voltage(), 16384);
//! ```
//!
//! # Fault Handling
//!
//! A fault forces neutral and holds the controller in `Fault` for the fault
//! time before it retries:
//!
//! ```rust
//! use bdc_controller::{Config, Controller, ControllerState, LinkType, NoCommands};
//! use bdc_controller::hal::{MockBridge, MockLimits, MockSensors};
//! use bdc_controller::traits::Fault;
//!
//! let mut controller = Controller::new(
//!     MockBridge::new(),
//!     MockLimits::closed(),
//!     MockSensors::new(),
//!     &Config::default(),
//! );
//! controller.link_good(LinkType::Uart);
//! controller.tick(&mut NoCommands).unwrap();
//!
//! controller.fault_signal(Fault::Temperature);
//! controller.tick(&mut NoCommands).unwrap();
//! assert_eq!(controller.state(), ControllerState::Fault);
//! assert!(controller.faults_active().contains(Fault::Temperature));
//! ```

use log::{info, warn};

use crate::commands::Command;
use crate::config::constants::{
    FORWARD_PLATEAU, MIN_FAULT_TIME_MS, NEUTRAL_PLATEAU, REVERSE_PLATEAU, UPDATES_PER_SECOND,
};
use crate::config::Config;
use crate::fixed::{clamp_voltage, VOLTAGE_MAX, VOLTAGE_MIN};
use crate::hbridge::{BrakeCoastSetting, HBridge};
use crate::limit::{LimitStatus, LimitSwitches};
use crate::monitor::FaultMonitor;
use crate::pid::Pid;
use crate::traits::{BridgeOutputs, CommandStream, Fault, FaultFlags, LimitInputs, MotorSensors};

// ============================================================================
// State Types
// ============================================================================

/// Link and fault state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ControllerState {
    /// No link; the bridge is idle.
    #[default]
    WaitForLink,
    /// Processing commands and running the control mode.
    Run,
    /// Holding neutral until the fault time expires.
    Fault,
}

/// Closed- or open-loop control mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ControlMode {
    /// Open-loop voltage with optional ramp.
    #[default]
    Voltage,
    /// Voltage compensated for bus voltage.
    VComp,
    /// Closed-loop winding current.
    Current,
    /// Closed-loop speed.
    Speed,
    /// Closed-loop position.
    Position,
}

/// Speed reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SpeedSource {
    /// Single-channel encoder.
    Encoder,
    /// Single-channel encoder wired against the motor direction.
    InvertedEncoder,
    /// Quadrature encoder.
    QuadEncoder,
}

/// Position reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PositionSource {
    /// Encoder count.
    Encoder,
    /// Potentiometer.
    Potentiometer,
}

/// Raw reference code: encoder.
pub const REF_ENCODER: u32 = 0;
/// Raw reference code: potentiometer.
pub const REF_POT: u32 = 1;
/// Raw reference code: inverted encoder.
pub const REF_INV_ENCODER: u32 = 2;
/// Raw reference code: quadrature encoder.
pub const REF_QUAD_ENCODER: u32 = 3;
/// Raw reference code reported when no source is selected.
pub const REF_NONE: u32 = 0xffff_ffff;

impl SpeedSource {
    /// Decode a raw reference code.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            REF_ENCODER => Some(SpeedSource::Encoder),
            REF_INV_ENCODER => Some(SpeedSource::InvertedEncoder),
            REF_QUAD_ENCODER => Some(SpeedSource::QuadEncoder),
            _ => None,
        }
    }

    /// Raw reference code.
    pub const fn to_raw(self) -> u32 {
        match self {
            SpeedSource::Encoder => REF_ENCODER,
            SpeedSource::InvertedEncoder => REF_INV_ENCODER,
            SpeedSource::QuadEncoder => REF_QUAD_ENCODER,
        }
    }
}

impl PositionSource {
    /// Decode a raw reference code. Every encoder flavour selects the encoder.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            REF_ENCODER | REF_INV_ENCODER | REF_QUAD_ENCODER => Some(PositionSource::Encoder),
            REF_POT => Some(PositionSource::Potentiometer),
            _ => None,
        }
    }

    /// Raw reference code.
    pub const fn to_raw(self) -> u32 {
        match self {
            PositionSource::Encoder => REF_ENCODER,
            PositionSource::Potentiometer => REF_POT,
        }
    }
}

/// Kind of command link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LinkType {
    /// CAN bus.
    Can,
    /// Serial.
    Uart,
    /// RC servo pulse input.
    Servo,
}

/// Fault occurrence counters, saturating at 255.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultCounts {
    /// Over-current faults.
    pub current: u8,
    /// Over-temperature faults.
    pub temperature: u8,
    /// Bus under-voltage faults.
    pub bus_voltage: u8,
    /// Gate driver faults.
    pub gate_drive: u8,
    /// Link losses.
    pub comm: u8,
}

impl FaultCounts {
    fn slot(&mut self, fault: Fault) -> &mut u8 {
        match fault {
            Fault::Current => &mut self.current,
            Fault::Temperature => &mut self.temperature,
            Fault::BusVoltage => &mut self.bus_voltage,
            Fault::GateDrive => &mut self.gate_drive,
            Fault::Comm => &mut self.comm,
        }
    }

    /// Count for one fault kind.
    pub fn get(&self, fault: Fault) -> u8 {
        match fault {
            Fault::Current => self.current,
            Fault::Temperature => self.temperature,
            Fault::BusVoltage => self.bus_voltage,
            Fault::GateDrive => self.gate_drive,
            Fault::Comm => self.comm,
        }
    }
}

/// What happened to a dispatched command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command took effect.
    Applied,
    /// The command was dropped (motor-driving command while in fault, or an
    /// unrecognised setting).
    Discarded,
}

#[derive(Clone, Copy, Debug, Default)]
struct LinkFlags {
    can: bool,
    uart: bool,
    servo: bool,
    have_link: bool,
    lost_link: bool,
}

// ============================================================================
// Controller
// ============================================================================

/// Brushed DC motor controller.
///
/// # Type Parameters
///
/// - `B`: bridge outputs ([`BridgeOutputs`])
/// - `L`: hard limit switch inputs ([`LimitInputs`])
/// - `S`: motor sensors ([`MotorSensors`])
///
/// # Concurrency
///
/// The controller is driven from a single context (the 1 kHz tick).
/// Commands from other contexts arrive through a split
/// [`CommandQueue`](crate::commands::CommandQueue).
pub struct Controller<B: BridgeOutputs, L: LimitInputs, S: MotorSensors> {
    bridge: B,
    limit_inputs: L,
    sensors: S,

    state: ControllerState,
    mode: ControlMode,
    links: LinkFlags,
    fault_pending: bool,
    fault_time: u32,
    fault_counter: u32,
    faults: FaultFlags,
    sticky_faults: FaultFlags,
    fault_counts: FaultCounts,
    halted: bool,
    power_status: bool,
    watchdog_ticks: u32,
    watchdog_left: u32,

    voltage: i32,
    voltage_target: i32,
    voltage_rate: u32,

    vcomp_voltage: i32,
    vcomp_target: i32,
    vcomp_in_rate: u32,
    vcomp_comp_rate: u32,

    speed_target: i32,
    speed_source: Option<SpeedSource>,
    speed_pid: Pid,

    position_target: i32,
    position_source: Option<PositionSource>,
    position_pid: Pid,

    current_target: i32,
    current_pid: Pid,

    limits: LimitSwitches,
    hbridge: HBridge,
    monitor: FaultMonitor,
}

impl<B: BridgeOutputs, L: LimitInputs, S: MotorSensors> Controller<B, L, S> {
    /// Create a controller and probe the limit inputs.
    ///
    /// If the automatic ramp jumper is fitted the voltage ramp rate starts
    /// at the configured auto ramp rate instead of zero.
    pub fn new(bridge: B, mut limit_inputs: L, sensors: S, config: &Config) -> Self {
        let mut limits = LimitSwitches::new();
        let voltage_rate = if limits.init(&mut limit_inputs) {
            config.controller.auto_ramp_rate
        } else {
            0
        };

        let mut controller = Self {
            bridge,
            limit_inputs,
            sensors,
            state: ControllerState::WaitForLink,
            mode: ControlMode::Voltage,
            links: LinkFlags::default(),
            fault_pending: false,
            fault_time: 0,
            fault_counter: 0,
            faults: FaultFlags::NONE,
            sticky_faults: FaultFlags::NONE,
            fault_counts: FaultCounts::default(),
            halted: false,
            power_status: true,
            watchdog_ticks: ms_to_ticks(config.controller.link_watchdog_ms),
            watchdog_left: 0,
            voltage: 0,
            voltage_target: 0,
            voltage_rate,
            vcomp_voltage: 0,
            vcomp_target: 0,
            vcomp_in_rate: 0,
            vcomp_comp_rate: 0,
            speed_target: 0,
            speed_source: None,
            speed_pid: Pid::new(),
            position_target: 0,
            position_source: None,
            position_pid: Pid::new(),
            current_target: 0,
            current_pid: Pid::new(),
            limits,
            hbridge: HBridge::new(&config.pwm),
            monitor: FaultMonitor::new(&config.monitor),
        };
        controller.fault_time_set(config.controller.fault_time_ms);
        controller
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Run one control period. Returns the state after the tick.
    pub fn tick<C: CommandStream>(&mut self, commands: &mut C) -> Result<ControllerState, B::Error> {
        match self.state {
            ControllerState::WaitForLink => self.wait_for_link_tick(),
            ControllerState::Run => self.run_tick(commands),
            ControllerState::Fault => self.fault_tick(commands)?,
        }

        self.watchdog_tick();

        let position = self.position();
        self.limits.tick(&self.limit_inputs, position);

        if let Some(fault) = self.hbridge.tick(&self.limits, &mut self.bridge)? {
            self.fault_signal(fault);
        }

        if self.sensors.calibration_done() {
            let faults = self.monitor.sample(&self.sensors);
            for fault in faults.iter() {
                self.fault_signal(fault);
            }
        }

        Ok(self.state)
    }

    fn wait_for_link_tick(&mut self) {
        if !self.sensors.calibration_done() {
            return;
        }

        if self.fault_pending {
            self.fault_pending = false;
            self.fault_counter = self.fault_time;
        }

        if self.fault_counter != 0 {
            self.fault_counter -= 1;
            if self.fault_counter == 0 {
                self.faults = FaultFlags::NONE;
            }
        }

        if self.links.have_link {
            self.links.lost_link = false;
            if self.fault_counter != 0 {
                self.transition(ControllerState::Fault);
            } else {
                self.transition(ControllerState::Run);
            }
        }
    }

    fn run_tick<C: CommandStream>(&mut self, commands: &mut C) {
        self.process_commands(commands, false);

        if !self.halted {
            match self.mode {
                ControlMode::VComp => self.vcomp_update(),
                ControlMode::Current => self.current_update(),
                ControlMode::Speed => self.speed_update(),
                ControlMode::Position => self.position_update(),
                ControlMode::Voltage => self.voltage_update(),
            }
        }

        if self.links.lost_link {
            self.links.have_link = false;
            self.force_neutral();
            self.fault_signal(Fault::Comm);
            self.transition(ControllerState::WaitForLink);
        }

        if self.fault_pending {
            self.fault_pending = false;
            self.force_neutral();
            self.fault_counter = self.fault_time;
            self.transition(ControllerState::Fault);
        }
    }

    fn fault_tick<C: CommandStream>(&mut self, commands: &mut C) -> Result<(), B::Error> {
        if self.fault_pending {
            self.fault_pending = false;
            self.fault_counter = self.fault_time;
        }

        self.process_commands(commands, true);

        self.fault_counter = self.fault_counter.saturating_sub(1);
        if self.fault_counter == 0 {
            self.faults = FaultFlags::NONE;
            self.hbridge.gate_driver_reset(&mut self.bridge)?;
            if self.links.lost_link {
                self.links.have_link = false;
                self.transition(ControllerState::WaitForLink);
            } else {
                self.transition(ControllerState::Run);
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: ControllerState) {
        if next != self.state {
            info!("controller: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn watchdog_tick(&mut self) {
        if self.watchdog_ticks == 0 || !self.links.have_link || self.links.lost_link {
            return;
        }
        self.watchdog_left = self.watchdog_left.saturating_sub(1);
        if self.watchdog_left == 0 {
            warn!("controller: link watchdog expired");
            self.link_lost(None);
        }
    }

    /// Current state machine state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Drain a command stream, dispatching every entry.
    pub fn process_commands<C: CommandStream>(&mut self, commands: &mut C, in_fault: bool) {
        while let Some(cmd) = commands.next_command() {
            let _ = self.apply_command(cmd, in_fault);
        }
    }

    /// Dispatch a single command.
    ///
    /// With `in_fault` set, commands that would drive the motor are discarded.
    pub fn apply_command(&mut self, cmd: Command, in_fault: bool) -> CommandOutcome {
        if in_fault && cmd.drives_motor() {
            return CommandOutcome::Discarded;
        }

        match cmd {
            Command::ForceNeutral => self.force_neutral(),

            Command::VoltageMode(enable) => self.voltage_mode_set(enable),
            Command::VoltageSet(v) => self.voltage_set(v),
            Command::VoltageRate(rate) => self.voltage_rate_set(rate),

            Command::SpeedMode(enable) => self.speed_mode_set(enable),
            Command::SpeedSet(v) => self.speed_set(v),
            Command::SpeedSource(raw) => self.speed_source_set(raw),
            Command::SpeedP(g) => self.speed_pid.set_p_gain(g),
            Command::SpeedI(g) => self.speed_pid.set_i_gain(g),
            Command::SpeedD(g) => self.speed_pid.set_d_gain(g),

            Command::PositionMode { enable, start } => self.position_mode_set(enable, start),
            Command::PositionSet(v) => self.position_set(v),
            Command::PositionSource(raw) => self.position_source_set(raw),
            Command::PositionP(g) => self.position_pid.set_p_gain(g),
            Command::PositionI(g) => self.position_pid.set_i_gain(g),
            Command::PositionD(g) => self.position_pid.set_d_gain(g),

            Command::CurrentMode(enable) => self.current_mode_set(enable),
            Command::CurrentSet(v) => self.current_set(v),
            Command::CurrentP(g) => self.current_pid.set_p_gain(g),
            Command::CurrentI(g) => self.current_pid.set_i_gain(g),
            Command::CurrentD(g) => self.current_pid.set_d_gain(g),

            Command::NumBrushes(_) => {}
            Command::EncoderLines(lines) => self.sensors.set_encoder_lines(lines),
            Command::PotTurns(turns) => self.sensors.set_pot_turns(turns),
            Command::BrakeCoast(raw) => match BrakeCoastSetting::from_raw(raw) {
                Some(setting) => self.hbridge.set_brake_coast(setting),
                None => return CommandOutcome::Discarded,
            },
            Command::PositionLimitMode(enable) => {
                if enable {
                    self.limits.position_enable();
                } else {
                    self.limits.position_disable();
                }
            }
            Command::PositionLimitForward {
                position,
                less_than,
            } => self.limits.set_forward(position, less_than),
            Command::PositionLimitReverse {
                position,
                less_than,
            } => self.limits.set_reverse(position, less_than),
            Command::MaxVoltage(volts) => self.hbridge.set_max_voltage(volts.min(i32::MAX as u32) as i32),

            Command::VCompMode(enable) => self.vcomp_mode_set(enable),
            Command::VCompSet(v) => self.vcomp_set(v),
            Command::VCompInRamp(rate) => self.vcomp_in_rate_set(rate),
            Command::VCompCompRamp(rate) => self.vcomp_comp_rate_set(rate),
        }

        CommandOutcome::Applied
    }

    // ------------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------------

    /// Report traffic on a link. That link becomes the only active one.
    pub fn link_good(&mut self, link: LinkType) {
        if !self.links.have_link {
            info!("controller: {:?} link up", link);
        }
        self.links.can = link == LinkType::Can;
        self.links.uart = link == LinkType::Uart;
        self.links.servo = link == LinkType::Servo;
        self.links.have_link = true;
        self.watchdog_pet();
    }

    /// Report a lost link. `None` drops every link.
    pub fn link_lost(&mut self, link: Option<LinkType>) {
        info!("controller: link lost ({:?})", link);
        match link {
            Some(LinkType::Can) => self.links.can = false,
            Some(LinkType::Uart) => self.links.uart = false,
            Some(LinkType::Servo) => self.links.servo = false,
            None => {
                self.links.can = false;
                self.links.uart = false;
                self.links.servo = false;
            }
        }
        self.links.lost_link = true;
    }

    /// Active link, by priority servo, CAN, UART.
    pub fn link_type(&self) -> Option<LinkType> {
        if self.links.servo {
            Some(LinkType::Servo)
        } else if self.links.can {
            Some(LinkType::Can)
        } else if self.links.uart {
            Some(LinkType::Uart)
        } else {
            None
        }
    }

    /// Returns true while a link is held.
    pub fn link_active(&self) -> bool {
        self.links.have_link
    }

    /// Restart the link watchdog.
    pub fn watchdog_pet(&mut self) {
        self.watchdog_left = self.watchdog_ticks;
    }

    // ------------------------------------------------------------------------
    // Faults
    // ------------------------------------------------------------------------

    /// Set the time held in fault before retrying (minimum 500 ms).
    pub fn fault_time_set(&mut self, ms: u32) {
        self.fault_time = ms_to_ticks(ms.max(MIN_FAULT_TIME_MS));
    }

    /// Time held in fault before retrying, in ms.
    pub fn fault_time(&self) -> u32 {
        (self.fault_time as u64 * 1000 / UPDATES_PER_SECOND as u64) as u32
    }

    /// Raise a fault.
    ///
    /// Communication faults are only recorded in the sticky set and counter;
    /// every other fault also becomes active and moves the controller to
    /// `Fault` on the next tick.
    pub fn fault_signal(&mut self, fault: Fault) {
        let already_active = self.faults.contains(fault);

        if fault != Fault::Comm {
            self.faults.insert(fault);
        }
        self.sticky_faults.insert(fault);

        if !already_active {
            if fault != Fault::Comm {
                warn!("controller: {:?} fault", fault);
            }
            let slot = self.fault_counts.slot(fault);
            *slot = slot.saturating_add(1);
        }

        if fault != Fault::Comm {
            self.fault_pending = true;
        }
    }

    /// Faults that are currently active.
    pub fn faults_active(&self) -> FaultFlags {
        self.faults
    }

    /// Faults seen since last cleared, optionally clearing them.
    pub fn sticky_faults(&mut self, clear: bool) -> FaultFlags {
        let faults = self.sticky_faults;
        if clear {
            self.sticky_faults = FaultFlags::NONE;
        }
        faults
    }

    /// Per-fault occurrence counters.
    pub fn fault_counts(&self) -> FaultCounts {
        self.fault_counts
    }

    /// Zero the counters selected by `mask` (fault bits).
    pub fn fault_count_reset(&mut self, mask: u8) {
        for fault in FaultFlags::from_bits(mask).iter() {
            *self.fault_counts.slot(fault) = 0;
        }
    }

    // ------------------------------------------------------------------------
    // Neutral / mode selection
    // ------------------------------------------------------------------------

    /// Drop every target to zero and put the bridge in neutral.
    ///
    /// The position target is set to the current position so that position
    /// mode holds still.
    pub fn force_neutral(&mut self) {
        self.voltage = 0;
        self.hbridge.set_voltage(0);
        self.voltage_target = 0;
        self.vcomp_voltage = 0;
        self.vcomp_target = 0;
        self.speed_target = 0;
        self.speed_pid.reset();
        self.position_target = self.position();
        self.position_pid.reset();
        self.current_target = 0;
        self.current_pid.reset();
    }

    /// Active control mode.
    pub fn control_mode(&self) -> ControlMode {
        self.mode
    }

    fn mode_set(&mut self, mode: ControlMode, enable: bool) {
        self.force_neutral();
        if enable {
            self.mode = mode;
        } else if self.mode == mode {
            self.mode = ControlMode::Voltage;
        }
    }

    // ------------------------------------------------------------------------
    // Voltage mode
    // ------------------------------------------------------------------------

    /// Output voltage last sent to the bridge.
    pub fn voltage(&self) -> i32 {
        self.voltage
    }

    /// Select voltage mode. Disabling has no effect beyond forcing neutral.
    pub fn voltage_mode_set(&mut self, enable: bool) {
        self.force_neutral();
        if enable {
            self.mode = ControlMode::Voltage;
        }
    }

    /// Set the voltage target, snapping the ends and the middle.
    pub fn voltage_set(&mut self, voltage: i32) {
        let mut v = voltage;
        if v < VOLTAGE_MIN + REVERSE_PLATEAU {
            v = VOLTAGE_MIN;
        }
        if in_neutral_plateau(v) {
            v = 0;
        }
        if v >= VOLTAGE_MAX - FORWARD_PLATEAU {
            v = VOLTAGE_MAX;
        }
        self.voltage_target = v;
    }

    /// Voltage target.
    pub fn voltage_target(&self) -> i32 {
        self.voltage_target
    }

    /// Set the voltage ramp per tick (0 = step).
    pub fn voltage_rate_set(&mut self, rate: u32) {
        self.voltage_rate = rate;
    }

    /// Voltage ramp per tick.
    pub fn voltage_rate(&self) -> u32 {
        self.voltage_rate
    }

    fn voltage_update(&mut self) {
        if self.voltage == self.voltage_target {
            return;
        }
        let rate = if in_neutral_plateau(self.voltage_target) {
            0
        } else {
            self.voltage_rate
        };
        self.voltage = ramp_toward(self.voltage, self.voltage_target, rate as i64);
        self.hbridge.set_voltage(self.voltage);
    }

    // ------------------------------------------------------------------------
    // Voltage compensation mode
    // ------------------------------------------------------------------------

    /// Select voltage compensation mode.
    pub fn vcomp_mode_set(&mut self, enable: bool) {
        self.mode_set(ControlMode::VComp, enable);
    }

    /// Set the compensated voltage target (8.8 volts).
    pub fn vcomp_set(&mut self, volts: i32) {
        self.vcomp_target = volts;
    }

    /// Compensated voltage target.
    pub fn vcomp_target(&self) -> i32 {
        self.vcomp_target
    }

    /// Set the target ramp (8.8 volts per tick, 0 = step).
    pub fn vcomp_in_rate_set(&mut self, rate: u32) {
        self.vcomp_in_rate = rate;
    }

    /// Target ramp.
    pub fn vcomp_in_rate(&self) -> u32 {
        self.vcomp_in_rate
    }

    /// Set the compensation ramp (8.8 volts per tick, 0 = step).
    pub fn vcomp_comp_rate_set(&mut self, rate: u32) {
        self.vcomp_comp_rate = rate;
    }

    /// Compensation ramp.
    pub fn vcomp_comp_rate(&self) -> u32 {
        self.vcomp_comp_rate
    }

    fn vcomp_update(&mut self) {
        self.vcomp_voltage = ramp_toward(self.vcomp_voltage, self.vcomp_target, self.vcomp_in_rate as i64);

        let vbus = self.sensors.bus_voltage() as i64;
        let (volts, comp) = if vbus > 0 {
            (
                clamp_voltage(self.vcomp_voltage as i64 * 32768 / vbus),
                self.vcomp_comp_rate as i64 * 32768 / vbus,
            )
        } else {
            (0, 0)
        };

        if self.voltage != volts {
            self.voltage = ramp_toward(self.voltage, volts, comp);
            self.hbridge.set_voltage(self.voltage);
        }
    }

    // ------------------------------------------------------------------------
    // Current mode
    // ------------------------------------------------------------------------

    /// Select current mode.
    pub fn current_mode_set(&mut self, enable: bool) {
        self.mode_set(ControlMode::Current, enable);
    }

    /// Set the current target (8.8 amps, sign selects direction).
    pub fn current_set(&mut self, current: i32) {
        self.current_target = current;
    }

    /// Current target.
    pub fn current_target(&self) -> i32 {
        self.current_target
    }

    /// Current loop PID.
    pub fn current_pid(&self) -> &Pid {
        &self.current_pid
    }

    /// Current loop PID, for gain changes.
    pub fn current_pid_mut(&mut self) -> &mut Pid {
        &mut self.current_pid
    }

    fn current_update(&mut self) {
        self.voltage = if self.current_target == 0 {
            0
        } else {
            let mut measured = self.sensors.winding_current();
            if self.current_target < 0 {
                measured = -measured;
            }
            let error = self.current_target.saturating_sub(measured);
            let out = clamp_voltage((self.current_pid.update(error.saturating_mul(256)) / 256) as i64);
            let opposed = (self.current_target < 0 && out > 0) || (self.current_target > 0 && out < 0);
            if opposed || in_neutral_plateau(out) {
                0
            } else {
                out
            }
        };
        self.hbridge.set_voltage(self.voltage);
    }

    // ------------------------------------------------------------------------
    // Speed mode
    // ------------------------------------------------------------------------

    /// Select speed mode.
    pub fn speed_mode_set(&mut self, enable: bool) {
        self.mode_set(ControlMode::Speed, enable);
    }

    /// Set the speed target.
    pub fn speed_set(&mut self, speed: i32) {
        self.speed_target = speed;
    }

    /// Speed target.
    pub fn speed_target(&self) -> i32 {
        self.speed_target
    }

    /// Measured speed from the selected source, 0 if none.
    pub fn speed(&self) -> i32 {
        match self.speed_source {
            Some(SpeedSource::Encoder) | Some(SpeedSource::InvertedEncoder) => self.sensors.velocity(false),
            Some(SpeedSource::QuadEncoder) => self.sensors.velocity(true),
            None => 0,
        }
    }

    /// Select the speed reference from a raw code. Unknown codes deselect.
    pub fn speed_source_set(&mut self, raw: u32) {
        self.speed_source = SpeedSource::from_raw(raw);
    }

    /// Selected speed reference.
    pub fn speed_source(&self) -> Option<SpeedSource> {
        self.speed_source
    }

    /// Speed loop PID.
    pub fn speed_pid(&self) -> &Pid {
        &self.speed_pid
    }

    /// Speed loop PID, for gain changes.
    pub fn speed_pid_mut(&mut self) -> &mut Pid {
        &mut self.speed_pid
    }

    fn speed_update(&mut self) {
        let target = self.speed_target;
        self.voltage = if target == 0 {
            0
        } else {
            let measured = match self.speed_source {
                Some(SpeedSource::Encoder) | Some(SpeedSource::InvertedEncoder) => {
                    let v = self.sensors.velocity(false);
                    if target < 0 {
                        -v
                    } else {
                        v
                    }
                }
                Some(SpeedSource::QuadEncoder) => self.sensors.velocity(true),
                None => 0,
            };
            let out = clamp_voltage((self.speed_pid.update(target.saturating_sub(measured)) / 256) as i64);
            let same_sign = (target > 0 && out > 0) || (target < 0 && out < 0);
            let opposed = (target > 0 && out < 0) || (target < 0 && out > 0);
            match self.speed_source {
                Some(SpeedSource::Encoder) if opposed => 0,
                Some(SpeedSource::InvertedEncoder) if same_sign => 0,
                _ => out,
            }
        };
        self.hbridge.set_voltage(self.voltage);
    }

    // ------------------------------------------------------------------------
    // Position mode
    // ------------------------------------------------------------------------

    /// Select position mode, loading `start` into the encoder.
    ///
    /// The target becomes the starting position (encoder reference), the
    /// potentiometer reading (pot reference) or zero.
    pub fn position_mode_set(&mut self, enable: bool, start: i32) {
        self.mode_set(ControlMode::Position, enable);
        if enable {
            self.sensors.set_encoder_position(start);
            self.position_target = match self.position_source {
                Some(PositionSource::Encoder) => start,
                Some(PositionSource::Potentiometer) => self.sensors.pot_position(),
                None => 0,
            };
        }
    }

    /// Set the position target.
    pub fn position_set(&mut self, position: i32) {
        self.position_target = position;
    }

    /// Position target.
    pub fn position_target(&self) -> i32 {
        self.position_target
    }

    /// Measured position from the selected source, 0 if none.
    pub fn position(&self) -> i32 {
        match self.position_source {
            Some(PositionSource::Encoder) => self.sensors.encoder_position(),
            Some(PositionSource::Potentiometer) => self.sensors.pot_position(),
            None => 0,
        }
    }

    /// Select the position reference from a raw code. Unknown codes deselect.
    pub fn position_source_set(&mut self, raw: u32) {
        self.position_source = PositionSource::from_raw(raw);
    }

    /// Selected position reference.
    pub fn position_source(&self) -> Option<PositionSource> {
        self.position_source
    }

    /// Position loop PID.
    pub fn position_pid(&self) -> &Pid {
        &self.position_pid
    }

    /// Position loop PID, for gain changes.
    pub fn position_pid_mut(&mut self) -> &mut Pid {
        &mut self.position_pid
    }

    fn position_update(&mut self) {
        let error = self.position_target.saturating_sub(self.position());
        let out = clamp_voltage((self.position_pid.update(error) / 256) as i64);
        self.voltage = if in_neutral_plateau(out) { 0 } else { out };
        self.hbridge.set_voltage(self.voltage);
    }

    // ------------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------------

    /// Freeze the output: `Run` keeps processing commands but skips the
    /// control mode.
    pub fn halt_set(&mut self) {
        self.halted = true;
    }

    /// Resume the control mode.
    pub fn halt_clear(&mut self) {
        self.halted = false;
    }

    /// Returns true while halted.
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Returns true until acknowledged after power-up.
    pub fn power_status(&self) -> bool {
        self.power_status
    }

    /// Acknowledge the power-up flag.
    pub fn power_status_clear(&mut self) {
        self.power_status = false;
    }

    /// Drop the bridge to neutral ahead of a firmware update.
    pub fn firmware_update(&mut self) -> Result<(), B::Error> {
        self.force_neutral();
        self.hbridge.firmware_update(&mut self.bridge)
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    /// Limit switch monitor.
    pub fn limits(&self) -> &LimitSwitches {
        &self.limits
    }

    /// Limit switch monitor, for soft limit changes and sticky clears.
    pub fn limits_mut(&mut self) -> &mut LimitSwitches {
        &mut self.limits
    }

    /// H-bridge driver.
    pub fn hbridge(&self) -> &HBridge {
        &self.hbridge
    }

    /// H-bridge driver, for brake/coast and max voltage changes.
    pub fn hbridge_mut(&mut self) -> &mut HBridge {
        &mut self.hbridge
    }

    /// Fault monitor.
    pub fn monitor(&self) -> &FaultMonitor {
        &self.monitor
    }

    /// Bridge outputs.
    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Bridge outputs.
    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    /// Limit inputs.
    pub fn limit_inputs(&self) -> &L {
        &self.limit_inputs
    }

    /// Limit inputs.
    pub fn limit_inputs_mut(&mut self) -> &mut L {
        &mut self.limit_inputs
    }

    /// Motor sensors.
    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    /// Motor sensors.
    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    /// Get the full status snapshot
    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            mode: self.mode,
            voltage: self.voltage,
            voltage_target: self.voltage_target,
            vcomp_target: self.vcomp_target,
            speed: self.speed(),
            speed_target: self.speed_target,
            position: self.position(),
            position_target: self.position_target,
            current: self.sensors.winding_current(),
            current_target: self.current_target,
            bus_voltage: self.sensors.bus_voltage(),
            temperature: self.sensors.temperature(),
            faults: self.faults,
            sticky_faults: self.sticky_faults,
            fault_counts: self.fault_counts,
            limits: self.limits.status(),
            link: self.link_type(),
            halted: self.halted,
            power_status: self.power_status,
        }
    }
}

/// Full state snapshot.
///
/// Implements `serde::Serialize` when the `serde` feature is enabled.
///
/// # Example
///
/// ```rust
/// use bdc_controller::{Config, Controller, ControllerState, ControlMode};
/// use bdc_controller::hal::{MockBridge, MockLimits, MockSensors};
///
/// let controller = Controller::new(
///     MockBridge::new(),
///     MockLimits::closed(),
///     MockSensors::new(),
///     &Config::default(),
/// );
///
/// let status = controller.status();
/// assert_eq!(status.state, ControllerState::WaitForLink);
/// assert_eq!(status.mode, ControlMode::Voltage);
/// assert!(status.faults.is_empty());
/// assert!(status.power_status);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerStatus {
    /// State machine state.
    pub state: ControllerState,
    /// Active control mode.
    pub mode: ControlMode,
    /// Output voltage.
    pub voltage: i32,
    /// Voltage mode target.
    pub voltage_target: i32,
    /// Voltage compensation target (8.8 V).
    pub vcomp_target: i32,
    /// Measured speed.
    pub speed: i32,
    /// Speed target.
    pub speed_target: i32,
    /// Measured position.
    pub position: i32,
    /// Position target.
    pub position_target: i32,
    /// Winding current (8.8 A).
    pub current: i32,
    /// Current target (8.8 A).
    pub current_target: i32,
    /// Bus voltage (8.8 V).
    pub bus_voltage: i32,
    /// Temperature (8.8 °C).
    pub temperature: i32,
    /// Active faults.
    pub faults: FaultFlags,
    /// Faults seen since last cleared.
    pub sticky_faults: FaultFlags,
    /// Fault counters.
    pub fault_counts: FaultCounts,
    /// Limit flags.
    pub limits: LimitStatus,
    /// Active link.
    pub link: Option<LinkType>,
    /// Output frozen.
    pub halted: bool,
    /// Power-up flag not yet acknowledged.
    pub power_status: bool,
}

fn ms_to_ticks(ms: u32) -> u32 {
    (ms as u64 * UPDATES_PER_SECOND as u64 / 1000) as u32
}

fn in_neutral_plateau(v: i32) -> bool {
    (-NEUTRAL_PLATEAU..=NEUTRAL_PLATEAU).contains(&v)
}

/// Step `current` toward `target` by `rate` without overshoot. A zero rate
/// jumps straight to the target.
fn ramp_toward(current: i32, target: i32, rate: i64) -> i32 {
    if rate <= 0 {
        return target;
    }
    let current = current as i64;
    let target_wide = target as i64;
    if current < target_wide {
        (current + rate).min(target_wide) as i32
    } else {
        (current - rate).max(target_wide) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandQueue;
    use crate::hal::{MockBridge, MockLimits, MockSensors};
    use crate::traits::NoCommands;

    type TestController = Controller<MockBridge, MockLimits, MockSensors>;

    fn controller() -> TestController {
        Controller::new(
            MockBridge::new(),
            MockLimits::closed(),
            MockSensors::new(),
            &Config::default(),
        )
    }

    fn running() -> TestController {
        let mut c = controller();
        c.link_good(LinkType::Can);
        c.tick(&mut NoCommands).unwrap();
        assert_eq!(c.state(), ControllerState::Run);
        c
    }

    fn tick_n(c: &mut TestController, n: usize) {
        for _ in 0..n {
            c.watchdog_pet();
            c.tick(&mut NoCommands).unwrap();
        }
    }

    // =========================================================================
    // Helper Tests
    // =========================================================================

    #[test]
    fn ramp_steps_without_overshoot() {
        assert_eq!(ramp_toward(0, 100, 30), 30);
        assert_eq!(ramp_toward(90, 100, 30), 100);
        assert_eq!(ramp_toward(100, -100, 150), -50);
        assert_eq!(ramp_toward(-50, -100, 150), -100);
        assert_eq!(ramp_toward(5, 1000, 0), 1000);
    }

    #[test]
    fn source_codes() {
        assert_eq!(SpeedSource::from_raw(0), Some(SpeedSource::Encoder));
        assert_eq!(SpeedSource::from_raw(1), None);
        assert_eq!(SpeedSource::from_raw(2), Some(SpeedSource::InvertedEncoder));
        assert_eq!(SpeedSource::from_raw(3), Some(SpeedSource::QuadEncoder));
        assert_eq!(PositionSource::from_raw(3), Some(PositionSource::Encoder));
        assert_eq!(PositionSource::from_raw(1), Some(PositionSource::Potentiometer));
        assert_eq!(PositionSource::from_raw(REF_NONE), None);
    }

    // =========================================================================
    // State Machine Tests
    // =========================================================================

    #[test]
    fn waits_for_calibration() {
        let mut c = controller();
        c.sensors_mut().calibrated = false;
        c.link_good(LinkType::Can);
        c.tick(&mut NoCommands).unwrap();
        assert_eq!(c.state(), ControllerState::WaitForLink);
        c.sensors_mut().calibrated = true;
        c.tick(&mut NoCommands).unwrap();
        assert_eq!(c.state(), ControllerState::Run);
    }

    #[test]
    fn commands_ignored_without_link() {
        let mut c = controller();
        let mut queue: CommandQueue<8> = CommandQueue::new();
        assert!(queue.send(Command::VoltageSet(20000)));
        c.tick(&mut queue).unwrap();
        assert_eq!(c.voltage_target(), 0);
        // still queued for when the link comes up
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn lost_link_forces_neutral_and_counts_comm() {
        let mut c = running();
        c.voltage_set(20000);
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 20000);

        c.link_lost(Some(LinkType::Can));
        c.tick(&mut NoCommands).unwrap();
        assert_eq!(c.state(), ControllerState::WaitForLink);
        assert_eq!(c.voltage(), 0);
        assert!(!c.link_active());
        assert!(c.faults_active().is_empty());
        assert!(c.sticky_faults(false).contains(Fault::Comm));
        assert_eq!(c.fault_counts().comm, 1);
    }

    #[test]
    fn fault_holds_for_fault_time() {
        let mut c = running();
        c.fault_time_set(500);
        c.fault_signal(Fault::GateDrive);
        c.tick(&mut NoCommands).unwrap();
        assert_eq!(c.state(), ControllerState::Fault);

        tick_n(&mut c, 499);
        assert_eq!(c.state(), ControllerState::Fault);
        assert!(c.faults_active().contains(Fault::GateDrive));

        tick_n(&mut c, 1);
        assert_eq!(c.state(), ControllerState::Run);
        assert!(c.faults_active().is_empty());
        assert_eq!(c.bridge().gate_resets, 1);
    }

    #[test]
    fn repeated_fault_restarts_timer() {
        let mut c = running();
        c.fault_time_set(500);
        c.fault_signal(Fault::Temperature);
        tick_n(&mut c, 300);
        c.fault_signal(Fault::Temperature);
        tick_n(&mut c, 300);
        assert_eq!(c.state(), ControllerState::Fault);
        tick_n(&mut c, 200);
        assert_eq!(c.state(), ControllerState::Run);
        // only counted once while active
        assert_eq!(c.fault_counts().temperature, 1);
    }

    #[test]
    fn drive_commands_discarded_in_fault() {
        let mut c = running();
        c.fault_signal(Fault::Current);
        c.tick(&mut NoCommands).unwrap();

        let mut queue: CommandQueue<8> = CommandQueue::new();
        assert!(queue.send(Command::VoltageSet(20000)));
        assert!(queue.send(Command::VoltageRate(10)));
        c.watchdog_pet();
        c.tick(&mut queue).unwrap();
        assert!(queue.is_empty());
        assert_eq!(c.voltage_target(), 0);
        assert_eq!(c.voltage_rate(), 10);
    }

    #[test]
    fn fault_with_lost_link_returns_to_wait() {
        let mut c = running();
        c.fault_time_set(500);
        c.fault_signal(Fault::BusVoltage);
        c.tick(&mut NoCommands).unwrap();
        c.link_lost(None);
        for _ in 0..500 {
            c.tick(&mut NoCommands).unwrap();
        }
        assert_eq!(c.state(), ControllerState::WaitForLink);
        assert!(!c.link_active());
    }

    #[test]
    fn relink_during_fault_countdown_enters_fault() {
        let mut c = running();
        c.fault_time_set(500);
        c.fault_signal(Fault::Current);
        c.link_lost(None);
        // lost link and fault on the same tick: link loss wins first,
        // then the fault moves us on
        c.tick(&mut NoCommands).unwrap();
        assert_eq!(c.state(), ControllerState::Fault);
        tick_n(&mut c, 500);
        assert_eq!(c.state(), ControllerState::WaitForLink);

        c.fault_signal(Fault::Current);
        c.tick(&mut NoCommands).unwrap();
        c.link_good(LinkType::Uart);
        c.tick(&mut NoCommands).unwrap();
        assert_eq!(c.state(), ControllerState::Fault);
    }

    #[test]
    fn watchdog_drops_link() {
        let mut c = running();
        for _ in 0..199 {
            c.tick(&mut NoCommands).unwrap();
        }
        assert_eq!(c.state(), ControllerState::Run);
        c.tick(&mut NoCommands).unwrap();
        c.tick(&mut NoCommands).unwrap();
        assert_eq!(c.state(), ControllerState::WaitForLink);
        assert_eq!(c.link_type(), None);
    }

    #[test]
    fn halted_skips_mode_update() {
        let mut c = running();
        c.halt_set();
        c.voltage_set(20000);
        tick_n(&mut c, 5);
        assert_eq!(c.voltage(), 0);
        c.halt_clear();
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 20000);
    }

    // =========================================================================
    // Link Tests
    // =========================================================================

    #[test]
    fn link_type_priority() {
        let mut c = controller();
        assert_eq!(c.link_type(), None);
        c.link_good(LinkType::Uart);
        assert_eq!(c.link_type(), Some(LinkType::Uart));
        c.link_good(LinkType::Servo);
        assert_eq!(c.link_type(), Some(LinkType::Servo));
        c.link_lost(Some(LinkType::Can));
        assert_eq!(c.link_type(), Some(LinkType::Servo));
        c.link_lost(Some(LinkType::Servo));
        assert_eq!(c.link_type(), None);
    }

    // =========================================================================
    // Fault Bookkeeping Tests
    // =========================================================================

    #[test]
    fn fault_time_floor_and_round_trip() {
        let mut c = controller();
        assert_eq!(c.fault_time(), 3000);
        c.fault_time_set(10);
        assert_eq!(c.fault_time(), 500);
        c.fault_time_set(1234);
        assert_eq!(c.fault_time(), 1234);
    }

    #[test]
    fn comm_faults_count_every_time() {
        let mut c = controller();
        c.fault_signal(Fault::Comm);
        c.fault_signal(Fault::Comm);
        assert_eq!(c.fault_counts().comm, 2);
        assert!(c.faults_active().is_empty());
        assert!(!c.fault_pending);
    }

    #[test]
    fn counters_saturate() {
        let mut c = controller();
        for _ in 0..300 {
            c.fault_signal(Fault::Comm);
        }
        assert_eq!(c.fault_counts().comm, 255);
    }

    #[test]
    fn sticky_clear_and_count_reset() {
        let mut c = controller();
        c.fault_signal(Fault::Current);
        c.fault_signal(Fault::GateDrive);
        assert_eq!(c.sticky_faults(true).bits(), 0x09);
        assert!(c.sticky_faults(false).is_empty());

        c.fault_count_reset(Fault::Current.bit());
        assert_eq!(c.fault_counts().current, 0);
        assert_eq!(c.fault_counts().gate_drive, 1);
    }

    // =========================================================================
    // Mode Selection Tests
    // =========================================================================

    #[test]
    fn enabling_a_mode_replaces_the_previous() {
        let mut c = controller();
        c.speed_mode_set(true);
        assert_eq!(c.control_mode(), ControlMode::Speed);
        c.current_mode_set(true);
        assert_eq!(c.control_mode(), ControlMode::Current);
        // disabling another mode leaves this one alone
        c.speed_mode_set(false);
        assert_eq!(c.control_mode(), ControlMode::Current);
        c.current_mode_set(false);
        assert_eq!(c.control_mode(), ControlMode::Voltage);
    }

    #[test]
    fn voltage_mode_disable_keeps_mode() {
        let mut c = controller();
        c.vcomp_mode_set(true);
        c.voltage_mode_set(false);
        assert_eq!(c.control_mode(), ControlMode::VComp);
        c.voltage_mode_set(true);
        assert_eq!(c.control_mode(), ControlMode::Voltage);
    }

    #[test]
    fn mode_change_forces_neutral() {
        let mut c = running();
        c.voltage_set(20000);
        c.speed_set(1000);
        tick_n(&mut c, 1);
        c.current_mode_set(true);
        assert_eq!(c.voltage(), 0);
        assert_eq!(c.voltage_target(), 0);
        assert_eq!(c.speed_target(), 0);
        assert_eq!(c.hbridge().voltage(), 0);
    }

    #[test]
    fn force_neutral_holds_position() {
        let mut c = controller();
        c.position_source_set(REF_ENCODER);
        c.sensors_mut().position = 7 << 16;
        c.position_set(0);
        c.force_neutral();
        assert_eq!(c.position_target(), 7 << 16);
    }

    // =========================================================================
    // Voltage Mode Tests
    // =========================================================================

    #[test]
    fn voltage_plateaus() {
        let mut c = controller();
        c.voltage_set(-32000);
        assert_eq!(c.voltage_target(), -32768);
        c.voltage_set(-2048);
        assert_eq!(c.voltage_target(), 0);
        c.voltage_set(2049);
        assert_eq!(c.voltage_target(), 2049);
        c.voltage_set(31743);
        assert_eq!(c.voltage_target(), 32767);
        c.voltage_set(31742);
        assert_eq!(c.voltage_target(), 31742);
    }

    #[test]
    fn voltage_ramps_at_rate() {
        let mut c = running();
        c.voltage_rate_set(1000);
        c.voltage_set(10000);
        tick_n(&mut c, 3);
        assert_eq!(c.voltage(), 3000);
        tick_n(&mut c, 10);
        assert_eq!(c.voltage(), 10000);
    }

    #[test]
    fn voltage_ramp_skipped_for_neutral() {
        let mut c = running();
        c.voltage_set(10000);
        tick_n(&mut c, 1);
        c.voltage_rate_set(100);
        c.voltage_set(0);
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 0);
    }

    #[test]
    fn auto_ramp_jumper_sets_rate() {
        let mut inputs = MockLimits::open();
        inputs.cross_jumper = true;
        let c = Controller::new(MockBridge::new(), inputs, MockSensors::new(), &Config::default());
        assert_eq!(c.voltage_rate(), 524);
        assert!(c.limits().auto_ramp());
    }

    // =========================================================================
    // VComp Mode Tests
    // =========================================================================

    #[test]
    fn vcomp_scales_by_bus_voltage() {
        let mut c = running();
        c.vcomp_mode_set(true);
        c.sensors_mut().bus_voltage = 12 * 256;
        c.vcomp_set(6 * 256);
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 16384);

        c.sensors_mut().bus_voltage = 24 * 256;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 8192);
    }

    #[test]
    fn vcomp_ramps() {
        let mut c = running();
        c.vcomp_mode_set(true);
        c.sensors_mut().bus_voltage = 8 * 256;
        c.vcomp_in_rate_set(256);
        c.vcomp_set(4 * 256);
        tick_n(&mut c, 1);
        // 1 V of 8 V
        assert_eq!(c.voltage(), 4096);

        // compensation ramp at 4 V: 64 * 32768 / 1024 = 2048 per tick
        c.vcomp_comp_rate_set(64);
        c.sensors_mut().bus_voltage = 4 * 256;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 6144);
    }

    #[test]
    fn vcomp_with_dead_bus_is_zero() {
        let mut c = running();
        c.vcomp_mode_set(true);
        c.vcomp_set(6 * 256);
        c.sensors_mut().bus_voltage = 0;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 0);
    }

    // =========================================================================
    // Current Mode Tests
    // =========================================================================

    #[test]
    fn current_mode_drives_toward_target() {
        let mut c = running();
        c.current_mode_set(true);
        c.current_pid_mut().set_p_gain(1 << 16);
        c.current_set(20 * 256);
        c.sensors_mut().current = 5 * 256;
        tick_n(&mut c, 1);
        // error 15 A * 256 / 256 = 3840
        assert_eq!(c.voltage(), 3840);
    }

    #[test]
    fn current_mode_never_reverses() {
        let mut c = running();
        c.current_mode_set(true);
        c.current_pid_mut().set_p_gain(1 << 16);
        c.current_set(10 * 256);
        c.sensors_mut().current = 30 * 256;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 0);
    }

    #[test]
    fn current_mode_negative_target() {
        let mut c = running();
        c.current_mode_set(true);
        c.current_pid_mut().set_p_gain(1 << 16);
        c.current_set(-20 * 256);
        c.sensors_mut().current = 5 * 256;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), -3840);
    }

    #[test]
    fn current_mode_small_output_is_neutral() {
        let mut c = running();
        c.current_mode_set(true);
        c.current_pid_mut().set_p_gain(1 << 16);
        c.current_set(10 * 256);
        c.sensors_mut().current = 5 * 256;
        tick_n(&mut c, 1);
        // 1280 is inside the neutral band
        assert_eq!(c.voltage(), 0);
    }

    // =========================================================================
    // Speed Mode Tests
    // =========================================================================

    #[test]
    fn speed_without_source_measures_zero() {
        let mut c = running();
        c.speed_mode_set(true);
        c.speed_pid_mut().set_p_gain(1 << 16);
        c.speed_set(10000 * 256);
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 10000);
        assert_eq!(c.speed(), 0);
    }

    #[test]
    fn speed_single_encoder_blocks_reverse_output() {
        let mut c = running();
        c.speed_mode_set(true);
        c.speed_source_set(REF_ENCODER);
        c.speed_pid_mut().set_p_gain(1 << 16);
        c.speed_set(1000 * 256);
        c.sensors_mut().velocity = 20000 * 256;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 0);
    }

    #[test]
    fn speed_single_encoder_negative_target() {
        let mut c = running();
        c.speed_mode_set(true);
        c.speed_source_set(REF_ENCODER);
        c.speed_pid_mut().set_p_gain(1 << 16);
        c.speed_set(-10000 * 256);
        // single channel reports magnitude only
        c.sensors_mut().velocity = 4000 * 256;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), -6000);
    }

    #[test]
    fn speed_quad_encoder_is_signed() {
        let mut c = running();
        c.speed_mode_set(true);
        c.speed_source_set(REF_QUAD_ENCODER);
        c.speed_pid_mut().set_p_gain(1 << 16);
        c.speed_set(10000 * 256);
        c.sensors_mut().quad_velocity = -4000 * 256;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 14000);
        assert_eq!(c.speed(), -4000 * 256);
    }

    #[test]
    fn speed_inverted_encoder_blocks_same_sign_output() {
        let mut c = running();
        c.speed_mode_set(true);
        c.speed_source_set(REF_INV_ENCODER);
        c.speed_pid_mut().set_p_gain(1 << 16);
        c.speed_set(10000 * 256);
        c.sensors_mut().velocity = 0;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 0);

        c.sensors_mut().velocity = 15000 * 256;
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), -5000);
    }

    #[test]
    fn speed_zero_target_is_zero() {
        let mut c = running();
        c.speed_mode_set(true);
        c.speed_pid_mut().set_p_gain(1 << 16);
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 0);
    }

    // =========================================================================
    // Position Mode Tests
    // =========================================================================

    #[test]
    fn position_mode_seeds_target() {
        let mut c = controller();
        c.position_source_set(REF_ENCODER);
        c.position_mode_set(true, 5 << 16);
        assert_eq!(c.sensors().position, 5 << 16);
        assert_eq!(c.position_target(), 5 << 16);

        c.position_source_set(REF_POT);
        c.sensors_mut().pot = 3 << 16;
        c.position_mode_set(true, 0);
        assert_eq!(c.position_target(), 3 << 16);

        c.position_source_set(REF_NONE);
        c.position_mode_set(true, 9);
        assert_eq!(c.position_target(), 0);
    }

    #[test]
    fn position_mode_drives_to_target() {
        let mut c = running();
        c.position_source_set(REF_ENCODER);
        c.position_mode_set(true, 0);
        c.position_pid_mut().set_p_gain(1 << 16);
        c.position_set(1 << 16);
        tick_n(&mut c, 1);
        // 65536 / 256 = 256, inside the neutral band
        assert_eq!(c.voltage(), 0);

        c.position_set(40 << 16);
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), 10240);

        c.position_set(-40 << 16);
        tick_n(&mut c, 1);
        assert_eq!(c.voltage(), -10240);
    }

    // =========================================================================
    // Command Dispatch Tests
    // =========================================================================

    #[test]
    fn dispatch_routes_to_components() {
        let mut c = controller();
        assert_eq!(c.apply_command(Command::EncoderLines(360), false), CommandOutcome::Applied);
        assert_eq!(c.apply_command(Command::PotTurns(10), false), CommandOutcome::Applied);
        assert_eq!(c.apply_command(Command::NumBrushes(2), false), CommandOutcome::Applied);
        assert_eq!(c.apply_command(Command::BrakeCoast(2), false), CommandOutcome::Applied);
        assert_eq!(c.apply_command(Command::BrakeCoast(9), false), CommandOutcome::Discarded);
        assert_eq!(c.apply_command(Command::MaxVoltage(6 * 256), false), CommandOutcome::Applied);
        assert_eq!(c.apply_command(Command::PositionLimitMode(true), false), CommandOutcome::Applied);
        let _ = c.apply_command(
            Command::PositionLimitForward {
                position: 100,
                less_than: true,
            },
            false,
        );
        let _ = c.apply_command(Command::SpeedI(1 << 16), false);

        assert_eq!(c.sensors().encoder_lines, 360);
        assert_eq!(c.sensors().pot_turns, 10);
        assert_eq!(c.hbridge().brake_coast(), BrakeCoastSetting::Coast);
        assert_eq!(c.hbridge().max_voltage(), 6 * 256 - 1);
        assert!(c.limits().position_active());
        assert_eq!(c.limits().forward(), (100, true));
        assert_eq!(c.speed_pid().i_gain(), 1 << 16);
    }

    #[test]
    fn dispatch_in_fault_discards_targets_only() {
        let mut c = controller();
        assert_eq!(c.apply_command(Command::SpeedSet(5), true), CommandOutcome::Discarded);
        assert_eq!(c.apply_command(Command::SpeedMode(true), true), CommandOutcome::Applied);
        assert_eq!(c.control_mode(), ControlMode::Speed);
        assert_eq!(c.speed_target(), 0);
    }

    #[test]
    fn power_status_flag() {
        let mut c = controller();
        assert!(c.power_status());
        c.power_status_clear();
        assert!(!c.power_status());
    }

    #[test]
    fn firmware_update_neutral() {
        let mut c = running();
        c.voltage_set(30000);
        tick_n(&mut c, 1);
        c.firmware_update().unwrap();
        assert!(c.bridge().drive.is_neutral());
        assert_eq!(c.voltage(), 0);
    }
}

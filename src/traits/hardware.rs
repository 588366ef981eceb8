//! Hardware abstraction traits for the bridge power stage, limit switches
//! and motor sensors.
//!
//! This module defines the seams between the control stack and the board.
//! Everything above these traits is portable and runs unchanged against the
//! mocks in [`crate::hal::mock`].
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`BridgeOutputs`] | PWM generator and gate driver behind the H-bridge |
//! | [`LimitInputs`] | Forward/reverse hard limit switch inputs |
//! | [`MotorSensors`] | Encoder, potentiometer and ADC readings |
//!
//! Writes to the power stage can fail and carry an associated `Error`.
//! Sensor reads return the last sampled value and are infallible.
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::traits::{BridgeOutputs, BridgeDrive, NeutralMode, Polarity};
//! use bdc_controller::hal::MockBridge;
//!
//! let mut bridge = MockBridge::new();
//! bridge.apply(BridgeDrive::Full(Polarity::Forward)).unwrap();
//! assert_eq!(bridge.drive, BridgeDrive::Full(Polarity::Forward));
//!
//! bridge.apply(BridgeDrive::Neutral(NeutralMode::Coast)).unwrap();
//! assert!(bridge.drive.is_neutral());
//! ```

/// Which side of the bridge is driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Polarity {
    /// M+ high side switched, positive voltage.
    Forward,
    /// M- high side switched, negative voltage.
    Reverse,
}

/// How the winding is left when no voltage is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NeutralMode {
    /// Both low-side switches on, shorting the winding.
    #[default]
    Brake,
    /// All switches off, the motor free-wheels.
    Coast,
}

/// Output pattern for one PWM period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BridgeDrive {
    /// No voltage across the winding.
    Neutral(NeutralMode),
    /// 100% duty in one direction.
    Full(Polarity),
    /// Center-aligned pulse.
    Pulse {
        /// Driven side.
        polarity: Polarity,
        /// High time in PWM clocks.
        on_clocks: u32,
        /// Compare value for the driven generator, `(period - on) / 2`.
        compare: u32,
        /// Compare value at which the current sample is triggered.
        adc_compare: u32,
    },
}

impl Default for BridgeDrive {
    fn default() -> Self {
        BridgeDrive::Neutral(NeutralMode::Brake)
    }
}

impl BridgeDrive {
    /// True for either neutral mode.
    pub fn is_neutral(&self) -> bool {
        matches!(self, BridgeDrive::Neutral(_))
    }

    /// Driven side, if any.
    pub fn polarity(&self) -> Option<Polarity> {
        match *self {
            BridgeDrive::Neutral(_) => None,
            BridgeDrive::Full(p) => Some(p),
            BridgeDrive::Pulse { polarity, .. } => Some(polarity),
        }
    }
}

/// PWM generator and gate driver behind the H-bridge.
///
/// # Implementation Notes
///
/// - `apply` is called once per control tick and must be idempotent
/// - `gate_fault` reads the driver's fault output (asserted = fault)
/// - `jumper_mode` reads the board's brake/coast jumper
///
/// # Example Implementation
///
/// ```rust,ignore
/// use bdc_controller::traits::{BridgeOutputs, BridgeDrive};
///
/// struct MyBridge { /* PWM generator handles */ }
///
/// impl BridgeOutputs for MyBridge {
///     type Error = ();
///
///     fn apply(&mut self, drive: BridgeDrive) -> Result<(), ()> {
///         // Write compare registers and output enables...
///         Ok(())
///     }
///
///     fn gate_fault(&self) -> bool {
///         false
///     }
///
///     fn reset_gate_driver(&mut self) -> Result<(), ()> {
///         Ok(())
///     }
/// }
/// ```
pub trait BridgeOutputs {
    /// Error type for output operations.
    type Error;

    /// Program the outputs for the given pattern.
    fn apply(&mut self, drive: BridgeDrive) -> Result<(), Self::Error>;

    /// Returns true while the gate driver reports a fault.
    fn gate_fault(&self) -> bool;

    /// Pulse the gate driver reset line.
    fn reset_gate_driver(&mut self) -> Result<(), Self::Error>;

    /// Neutral mode selected by the board jumper.
    ///
    /// Boards without a jumper brake.
    fn jumper_mode(&self) -> NeutralMode {
        NeutralMode::Brake
    }
}

/// Hard limit switch inputs.
///
/// Limit switches are normally closed: a closed switch means travel in that
/// direction is allowed.
pub trait LimitInputs {
    /// Returns true if the forward limit switch is closed.
    fn forward_closed(&self) -> bool;

    /// Returns true if the reverse limit switch is closed.
    fn reverse_closed(&self) -> bool;

    /// Check whether the two limit inputs are wired to each other.
    ///
    /// Only called at startup when both inputs read open. A cross-connected
    /// jumper selects automatic voltage ramping and overrides the switches.
    fn probe_cross_jumper(&mut self) -> bool {
        false
    }
}

/// Motor feedback: encoder, potentiometer and analog readings.
///
/// Positions are Q16.16 revolutions and speeds are Q16.16 RPM. Current,
/// bus voltage and temperature are 8.8 fixed-point (amps, volts, °C).
pub trait MotorSensors {
    /// Encoder position.
    fn encoder_position(&self) -> i32;

    /// Overwrite the encoder position.
    fn set_encoder_position(&mut self, position: i32);

    /// Encoder velocity.
    ///
    /// With `quadrature` false the result is an unsigned magnitude from a
    /// single channel. With `quadrature` true it is signed.
    fn velocity(&self, quadrature: bool) -> i32;

    /// Potentiometer position.
    fn pot_position(&self) -> i32;

    /// Winding current magnitude.
    fn winding_current(&self) -> i32;

    /// Bus voltage.
    fn bus_voltage(&self) -> i32;

    /// Ambient temperature.
    fn temperature(&self) -> i32;

    /// Returns true once the ADC offsets have been calibrated.
    fn calibration_done(&self) -> bool {
        true
    }

    /// Set the encoder lines per revolution.
    fn set_encoder_lines(&mut self, lines: u32);

    /// Set the number of potentiometer turns.
    fn set_pot_turns(&mut self, turns: u32);
}

/// Types of faults that stop the motor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Fault {
    /// Winding current integrated above the shutoff curve.
    Current,
    /// Ambient temperature over the shutdown threshold.
    Temperature,
    /// Bus voltage under the shutdown threshold.
    BusVoltage,
    /// Gate driver reported a fault.
    GateDrive,
    /// Communication link lost.
    Comm,
}

impl Fault {
    /// All fault kinds in bit order.
    pub const ALL: [Fault; 5] = [
        Fault::Current,
        Fault::Temperature,
        Fault::BusVoltage,
        Fault::GateDrive,
        Fault::Comm,
    ];

    /// Bit position in [`FaultFlags`].
    pub const fn bit(self) -> u8 {
        match self {
            Fault::Current => 0x01,
            Fault::Temperature => 0x02,
            Fault::BusVoltage => 0x04,
            Fault::GateDrive => 0x08,
            Fault::Comm => 0x10,
        }
    }
}

/// Set of faults as a bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultFlags(u8);

impl FaultFlags {
    /// No faults.
    pub const NONE: FaultFlags = FaultFlags(0);

    /// Build from raw bits; unknown bits are dropped.
    pub const fn from_bits(bits: u8) -> Self {
        FaultFlags(bits & 0x1f)
    }

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if no fault is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if `fault` is set.
    pub const fn contains(self, fault: Fault) -> bool {
        self.0 & fault.bit() != 0
    }

    /// Set `fault`.
    pub fn insert(&mut self, fault: Fault) {
        self.0 |= fault.bit();
    }

    /// Iterate over the set faults.
    pub fn iter(self) -> impl Iterator<Item = Fault> {
        Fault::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl From<Fault> for FaultFlags {
    fn from(fault: Fault) -> Self {
        FaultFlags(fault.bit())
    }
}

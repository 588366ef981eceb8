//! H-bridge driver: signed voltage in, PWM pattern out.
//!
//! The controller sets a voltage command in `-32768..=32767` each tick.
//! [`HBridge::tick`] scales it by the configured maximum output voltage,
//! converts it into PWM clocks and picks one of three patterns:
//!
//! - pulses too short for the gate driver collapse to neutral
//! - pulses so long that the off-time would be shorter than the minimum
//!   width become 100% duty
//! - everything in between is a center-aligned pulse with the current sample
//!   taken a fixed delta after the rising edge
//!
//! Travel in a direction is only allowed while the limit monitor reports it
//! OK. Neutral is brake or coast according to the [`BrakeCoastSetting`].
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::config::PwmConfig;
//! use bdc_controller::hbridge::HBridge;
//! use bdc_controller::limit::LimitSwitches;
//! use bdc_controller::hal::{MockBridge, MockLimits};
//! use bdc_controller::traits::{BridgeDrive, Polarity};
//!
//! let mut bridge = MockBridge::new();
//! let mut limits = LimitSwitches::new();
//! limits.tick(&MockLimits::closed(), 0);
//!
//! let mut hbridge = HBridge::new(&PwmConfig::default());
//! hbridge.set_voltage(32767);
//! hbridge.tick(&limits, &mut bridge).unwrap();
//! assert_eq!(bridge.drive, BridgeDrive::Full(Polarity::Forward));
//! ```

use crate::config::PwmConfig;
use crate::fixed::VOLTAGE_MAX;
use crate::limit::LimitSwitches;
use crate::traits::{BridgeDrive, BridgeOutputs, Fault, NeutralMode, Polarity};

/// Full-scale bus voltage the maximum output is expressed against (8.8 V).
const FULL_SCALE_VOLTS: i64 = 12 * 256;

/// Neutral behaviour selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BrakeCoastSetting {
    /// Follow the board jumper.
    #[default]
    Jumper,
    /// Always brake.
    Brake,
    /// Always coast.
    Coast,
}

impl BrakeCoastSetting {
    /// Decode a raw setting code.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(BrakeCoastSetting::Jumper),
            1 => Some(BrakeCoastSetting::Brake),
            2 => Some(BrakeCoastSetting::Coast),
            _ => None,
        }
    }

    /// Raw setting code.
    pub const fn to_raw(self) -> u32 {
        match self {
            BrakeCoastSetting::Jumper => 0,
            BrakeCoastSetting::Brake => 1,
            BrakeCoastSetting::Coast => 2,
        }
    }
}

/// H-bridge output stage state.
#[derive(Clone, Debug)]
pub struct HBridge {
    voltage: i32,
    vmax: i32,
    setting: BrakeCoastSetting,
    period: u32,
    min_width: u32,
    adc_delta: u32,
    drive: BridgeDrive,
}

impl HBridge {
    /// Creates a driver in neutral with full output allowed.
    pub fn new(pwm: &PwmConfig) -> Self {
        Self {
            voltage: 0,
            vmax: VOLTAGE_MAX,
            setting: BrakeCoastSetting::default(),
            period: pwm.period_clocks(),
            min_width: pwm.min_width_clocks(),
            adc_delta: pwm.adc_sample_delta,
            drive: BridgeDrive::default(),
        }
    }

    /// Set the voltage command. Takes effect on the next tick.
    pub fn set_voltage(&mut self, voltage: i32) {
        self.voltage = voltage;
    }

    /// Current voltage command.
    pub fn voltage(&self) -> i32 {
        self.voltage
    }

    /// Set the maximum output voltage (8.8 volts, 12 V = full scale).
    pub fn set_max_voltage(&mut self, volts: i32) {
        let scaled = volts as i64 * VOLTAGE_MAX as i64 / FULL_SCALE_VOLTS;
        self.vmax = scaled.clamp(0, VOLTAGE_MAX as i64) as i32;
    }

    /// Maximum output voltage (8.8 volts).
    pub fn max_voltage(&self) -> i32 {
        (self.vmax as i64 * FULL_SCALE_VOLTS / VOLTAGE_MAX as i64) as i32
    }

    /// Set the brake/coast behaviour. Applied the next time the bridge is
    /// neutral.
    pub fn set_brake_coast(&mut self, setting: BrakeCoastSetting) {
        self.setting = setting;
    }

    /// Brake/coast behaviour.
    pub fn brake_coast(&self) -> BrakeCoastSetting {
        self.setting
    }

    /// Last pattern written to the outputs.
    pub fn drive(&self) -> BridgeDrive {
        self.drive
    }

    /// PWM period in clocks.
    pub fn period_clocks(&self) -> u32 {
        self.period
    }

    /// Resolve the brake/coast setting against the jumper.
    pub fn neutral_mode<B: BridgeOutputs>(&self, outputs: &B) -> NeutralMode {
        match self.setting {
            BrakeCoastSetting::Coast => NeutralMode::Coast,
            BrakeCoastSetting::Brake => NeutralMode::Brake,
            BrakeCoastSetting::Jumper => outputs.jumper_mode(),
        }
    }

    /// Compute the pattern for a voltage without touching the outputs.
    pub fn pattern(&self, voltage: i32, limits: &LimitSwitches, neutral: NeutralMode) -> BridgeDrive {
        let polarity = match voltage {
            0 => return BridgeDrive::Neutral(neutral),
            v if v < 0 => Polarity::Reverse,
            _ => Polarity::Forward,
        };

        let allowed = match polarity {
            Polarity::Forward => limits.forward_ok(),
            Polarity::Reverse => limits.reverse_ok(),
        };
        if !allowed {
            return BridgeDrive::Neutral(neutral);
        }

        let magnitude = (voltage as i64).unsigned_abs();
        let scaled = magnitude * self.vmax as u64 / VOLTAGE_MAX as u64;
        let on = (scaled * self.period as u64 / VOLTAGE_MAX as u64) as u32;

        if on >= self.period.saturating_sub(self.min_width) {
            BridgeDrive::Full(polarity)
        } else if on < self.min_width {
            BridgeDrive::Neutral(neutral)
        } else {
            let compare = (self.period - on) / 2;
            BridgeDrive::Pulse {
                polarity,
                on_clocks: on,
                compare,
                adc_compare: compare + self.adc_delta,
            }
        }
    }

    /// Write the current voltage to the outputs.
    ///
    /// Returns [`Fault::GateDrive`] if the gate driver is reporting a fault.
    /// The outputs are updated either way.
    pub fn tick<B: BridgeOutputs>(
        &mut self,
        limits: &LimitSwitches,
        outputs: &mut B,
    ) -> Result<Option<Fault>, B::Error> {
        let fault = outputs.gate_fault().then_some(Fault::GateDrive);

        let neutral = self.neutral_mode(outputs);
        self.drive = self.pattern(self.voltage, limits, neutral);
        outputs.apply(self.drive)?;

        Ok(fault)
    }

    /// Pulse the gate driver reset, clearing latched driver faults.
    pub fn gate_driver_reset<B: BridgeOutputs>(&mut self, outputs: &mut B) -> Result<(), B::Error> {
        outputs.reset_gate_driver()
    }

    /// Drop the outputs to neutral immediately, ahead of a firmware update.
    pub fn firmware_update<B: BridgeOutputs>(&mut self, outputs: &mut B) -> Result<(), B::Error> {
        self.voltage = 0;
        self.drive = BridgeDrive::Neutral(self.neutral_mode(outputs));
        outputs.apply(self.drive)
    }
}

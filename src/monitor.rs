//! Analog fault monitor: winding current, temperature and bus voltage.
//!
//! Sampled once per control tick. Anything it detects is reported as a
//! [`FaultFlags`] set for the controller to signal.
//!
//! - Over-current is an I²t-style budget. Time spent above the nominal level
//!   adds `(I - I_min)²` to a counter; time spent below it drains
//!   `(I_nominal - I)²`. The fault trips once the counter exceeds
//!   `(I_shutoff - I_min)² * shutoff_time`.
//! - Over-temperature uses a hysteresis band around the shutdown level.
//! - Under-voltage trips after a run of consecutive low samples.

use crate::config::MonitorConfig;
use crate::traits::{Fault, FaultFlags, MotorSensors};

/// Analog fault monitor.
#[derive(Clone, Debug)]
pub struct FaultMonitor {
    config: MonitorConfig,
    current_counter: u64,
    current_limit: u64,
    temperature_fault: bool,
    vbus_low: u32,
}

impl FaultMonitor {
    /// Creates a monitor with clean history.
    pub fn new(config: &MonitorConfig) -> Self {
        let span = (config.current_shutoff - config.current_minimum).max(0) as u64;
        Self {
            config: config.clone(),
            current_counter: 0,
            current_limit: span * span * config.current_shutoff_ticks as u64,
            temperature_fault: false,
            vbus_low: 0,
        }
    }

    /// Take one sample of every channel.
    pub fn sample<S: MotorSensors>(&mut self, sensors: &S) -> FaultFlags {
        let mut faults = FaultFlags::NONE;
        if self.sample_current(sensors.winding_current()) {
            faults.insert(Fault::Current);
        }
        if self.sample_temperature(sensors.temperature()) {
            faults.insert(Fault::Temperature);
        }
        if self.sample_bus_voltage(sensors.bus_voltage()) {
            faults.insert(Fault::BusVoltage);
        }
        faults
    }

    fn sample_current(&mut self, current: i32) -> bool {
        let current = current as i64;
        let nominal = self.config.current_nominal as i64;
        if current > nominal {
            let excess = (current - self.config.current_minimum as i64).unsigned_abs();
            self.current_counter = self.current_counter.saturating_add(excess * excess);
            self.current_counter > self.current_limit
        } else {
            let slack = (nominal - current).unsigned_abs();
            self.current_counter = self.current_counter.saturating_sub(slack * slack);
            false
        }
    }

    fn sample_temperature(&mut self, temperature: i32) -> bool {
        let threshold = if self.temperature_fault {
            self.config.shutdown_temperature - self.config.temperature_hysteresis
        } else {
            self.config.shutdown_temperature + self.config.temperature_hysteresis
        };
        self.temperature_fault = temperature > threshold;
        self.temperature_fault
    }

    fn sample_bus_voltage(&mut self, volts: i32) -> bool {
        if volts < self.config.shutdown_voltage {
            self.vbus_low = self.vbus_low.saturating_add(1);
            self.vbus_low >= self.config.shutdown_voltage_ticks
        } else {
            self.vbus_low = 0;
            false
        }
    }

    /// Accumulated over-current budget.
    pub fn current_counter(&self) -> u64 {
        self.current_counter
    }

    /// Budget at which the current fault trips.
    pub fn current_limit(&self) -> u64 {
        self.current_limit
    }

    /// Returns true while inside the temperature hysteresis band after a trip.
    pub fn temperature_fault(&self) -> bool {
        self.temperature_fault
    }

    /// Consecutive samples below the shutdown voltage.
    pub fn vbus_low_samples(&self) -> u32 {
        self.vbus_low
    }
}

//! Controller configuration with builder-style setters.
//!
//! Every value has a default matching the reference hardware: a 16 MHz
//! system clock, 15.625 kHz PWM, 1 kHz control updates and a 12 V bus.
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::config::{Config, ControllerConfig, MonitorConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.pwm.period_clocks(), 1024);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_controller(ControllerConfig::default().with_fault_time_ms(1000))
//!     .with_monitor(MonitorConfig::default().with_shutdown_temperature(70 * 256));
//! ```

/// Timing and threshold constants of the reference board.
pub mod constants {
    /// System clock.
    pub const SYSCLK_HZ: u32 = 16_000_000;
    /// PWM frequency.
    pub const PWM_FREQUENCY_HZ: u32 = 15_625;
    /// Narrowest pulse the gate driver can produce.
    pub const PWM_MIN_WIDTH_NS: u32 = 2_200;
    /// Clocks between the PWM edge and the current sample.
    pub const ADC_SAMPLE_DELTA: u32 = 16;

    /// Control ticks per second.
    pub const UPDATES_PER_SECOND: u32 = 1_000;
    /// Time spent in fault before retrying.
    pub const FAULT_TIME_MS: u32 = 3_000;
    /// Shortest configurable fault time.
    pub const MIN_FAULT_TIME_MS: u32 = 500;
    /// Link watchdog timeout.
    pub const LINK_WATCHDOG_MS: u32 = 200;
    /// Voltage ramp used when the automatic ramp jumper is fitted.
    pub const AUTO_RAMP_RATE: u32 = 524;

    /// Band at the reverse end snapped to full reverse.
    pub const REVERSE_PLATEAU: i32 = 1_024;
    /// Half-width of the band around zero snapped to neutral.
    pub const NEUTRAL_PLATEAU: i32 = 2_048;
    /// Band at the forward end snapped to full forward.
    pub const FORWARD_PLATEAU: i32 = 1_024;

    /// Current at which the over-current budget starts counting (8.8 A).
    pub const CURRENT_MINIMUM_LEVEL: i32 = 40 * 256;
    /// Sustainable current (8.8 A).
    pub const CURRENT_NOMINAL_LEVEL: i32 = 50 * 256;
    /// Current that trips after [`CURRENT_SHUTOFF_TICKS`] (8.8 A).
    pub const CURRENT_SHUTOFF_LEVEL: i32 = 60 * 256;
    /// Ticks at the shutoff level before the current fault trips.
    pub const CURRENT_SHUTOFF_TICKS: u32 = 2 * UPDATES_PER_SECOND;

    /// Shutdown temperature (8.8 °C).
    pub const SHUTDOWN_TEMPERATURE: i32 = 60 * 256;
    /// Hysteresis around the shutdown temperature (8.8 °C).
    pub const SHUTDOWN_TEMPERATURE_HYSTERESIS: i32 = 256;
    /// Bus voltage under which the bridge shuts down (8.8 V).
    pub const SHUTDOWN_VOLTAGE: i32 = 6 * 256;
    /// Consecutive low samples before the bus voltage fault trips.
    pub const SHUTDOWN_VOLTAGE_TICKS: u32 = UPDATES_PER_SECOND / 10;
}

use constants::*;

// ============================================================================
// Main Config
// ============================================================================

/// Complete controller configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// State machine timing
    pub controller: ControllerConfig,
    /// PWM timing
    pub pwm: PwmConfig,
    /// Fault monitor thresholds
    pub monitor: MonitorConfig,
}

impl Config {
    /// Set controller configuration
    pub fn with_controller(mut self, controller: ControllerConfig) -> Self {
        self.controller = controller;
        self
    }

    /// Set PWM configuration
    pub fn with_pwm(mut self, pwm: PwmConfig) -> Self {
        self.pwm = pwm;
        self
    }

    /// Set fault monitor configuration
    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }
}

// ============================================================================
// Controller Config
// ============================================================================

/// State machine timing
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerConfig {
    /// Time held in fault before retrying (ms, at least 500)
    pub fault_time_ms: u32,
    /// Time without a link message before the link is dropped (ms, 0 = off)
    pub link_watchdog_ms: u32,
    /// Voltage ramp applied when the automatic ramp jumper is fitted
    pub auto_ramp_rate: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fault_time_ms: FAULT_TIME_MS,
            link_watchdog_ms: LINK_WATCHDOG_MS,
            auto_ramp_rate: AUTO_RAMP_RATE,
        }
    }
}

impl ControllerConfig {
    /// Set the fault time (clamped to at least 500 ms)
    pub fn with_fault_time_ms(mut self, ms: u32) -> Self {
        self.fault_time_ms = ms.max(MIN_FAULT_TIME_MS);
        self
    }

    /// Set the link watchdog timeout
    pub fn with_link_watchdog_ms(mut self, ms: u32) -> Self {
        self.link_watchdog_ms = ms;
        self
    }

    /// Set the automatic ramp rate
    pub fn with_auto_ramp_rate(mut self, rate: u32) -> Self {
        self.auto_ramp_rate = rate;
        self
    }
}

// ============================================================================
// PWM Config
// ============================================================================

/// PWM timing
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PwmConfig {
    /// Clock feeding the PWM generator
    pub sysclk_hz: u32,
    /// PWM frequency
    pub frequency_hz: u32,
    /// Minimum pulse width (ns)
    pub min_width_ns: u32,
    /// Clocks from pulse start to the current sample
    pub adc_sample_delta: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            sysclk_hz: SYSCLK_HZ,
            frequency_hz: PWM_FREQUENCY_HZ,
            min_width_ns: PWM_MIN_WIDTH_NS,
            adc_sample_delta: ADC_SAMPLE_DELTA,
        }
    }
}

impl PwmConfig {
    /// Set the PWM frequency
    pub fn with_frequency_hz(mut self, hz: u32) -> Self {
        self.frequency_hz = hz.max(1);
        self
    }

    /// Set the system clock
    pub fn with_sysclk_hz(mut self, hz: u32) -> Self {
        self.sysclk_hz = hz;
        self
    }

    /// Set the minimum pulse width
    pub fn with_min_width_ns(mut self, ns: u32) -> Self {
        self.min_width_ns = ns;
        self
    }

    /// Clocks per PWM period
    pub fn period_clocks(&self) -> u32 {
        self.sysclk_hz / self.frequency_hz.max(1)
    }

    /// Minimum pulse width in clocks
    pub fn min_width_clocks(&self) -> u32 {
        (self.sysclk_hz as u64 * self.min_width_ns as u64 / 1_000_000_000) as u32
    }
}

// ============================================================================
// Monitor Config
// ============================================================================

/// Fault monitor thresholds. Currents, temperatures and voltages are 8.8.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorConfig {
    /// Current at which the over-current budget starts counting
    pub current_minimum: i32,
    /// Sustainable current
    pub current_nominal: i32,
    /// Current that trips after `current_shutoff_ticks`
    pub current_shutoff: i32,
    /// Ticks at the shutoff level before tripping
    pub current_shutoff_ticks: u32,
    /// Shutdown temperature
    pub shutdown_temperature: i32,
    /// Hysteresis around the shutdown temperature
    pub temperature_hysteresis: i32,
    /// Shutdown bus voltage
    pub shutdown_voltage: i32,
    /// Consecutive low samples before tripping
    pub shutdown_voltage_ticks: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            current_minimum: CURRENT_MINIMUM_LEVEL,
            current_nominal: CURRENT_NOMINAL_LEVEL,
            current_shutoff: CURRENT_SHUTOFF_LEVEL,
            current_shutoff_ticks: CURRENT_SHUTOFF_TICKS,
            shutdown_temperature: SHUTDOWN_TEMPERATURE,
            temperature_hysteresis: SHUTDOWN_TEMPERATURE_HYSTERESIS,
            shutdown_voltage: SHUTDOWN_VOLTAGE,
            shutdown_voltage_ticks: SHUTDOWN_VOLTAGE_TICKS,
        }
    }
}

impl MonitorConfig {
    /// Set the three current levels
    pub fn with_current_levels(mut self, minimum: i32, nominal: i32, shutoff: i32) -> Self {
        self.current_minimum = minimum;
        self.current_nominal = nominal.max(minimum);
        self.current_shutoff = shutoff.max(self.current_nominal);
        self
    }

    /// Set the over-current trip time
    pub fn with_current_shutoff_ticks(mut self, ticks: u32) -> Self {
        self.current_shutoff_ticks = ticks;
        self
    }

    /// Set the shutdown temperature
    pub fn with_shutdown_temperature(mut self, temperature: i32) -> Self {
        self.shutdown_temperature = temperature;
        self
    }

    /// Set the temperature hysteresis
    pub fn with_temperature_hysteresis(mut self, hysteresis: i32) -> Self {
        self.temperature_hysteresis = hysteresis.max(0);
        self
    }

    /// Set the shutdown bus voltage
    pub fn with_shutdown_voltage(mut self, volts: i32) -> Self {
        self.shutdown_voltage = volts;
        self
    }

    /// Set the bus voltage trip time
    pub fn with_shutdown_voltage_ticks(mut self, ticks: u32) -> Self {
        self.shutdown_voltage_ticks = ticks.max(1);
        self
    }
}

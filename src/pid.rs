//! Fixed-point PID controller.
//!
//! All gains are Q16.16. The integrator accumulates raw error and is clamped
//! to a window derived from the I gain, so that `I * integrator` can never
//! exceed full-scale output on its own.
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::pid::Pid;
//!
//! let mut pid = Pid::new();
//! pid.set_p_gain(2 << 16);
//!
//! assert_eq!(pid.update(100), 200);
//! ```

use crate::fixed::{div16x16, mul16x16, saturate};

/// Integrator headroom numerator: full-scale output in Q16.16 with the
/// controller's 256x output scaling.
const INTEGRATOR_SPAN: i32 = 32767 * 256;

/// Snapshot of PID gains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PidGains {
    /// Proportional gain (Q16.16).
    pub p: i32,
    /// Integral gain (Q16.16).
    pub i: i32,
    /// Derivative gain (Q16.16).
    pub d: i32,
}

/// PID controller state.
#[derive(Clone, Debug, Default)]
pub struct Pid {
    gains: PidGains,
    integrator: i32,
    integ_min: i32,
    integ_max: i32,
    prev_error: i32,
}

impl Pid {
    /// Creates a controller with zero gains.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a controller with the given gains.
    pub fn with_gains(gains: PidGains) -> Self {
        let mut pid = Self::new();
        pid.set_p_gain(gains.p);
        pid.set_i_gain(gains.i);
        pid.set_d_gain(gains.d);
        pid
    }

    /// Set the proportional gain.
    pub fn set_p_gain(&mut self, gain: i32) {
        self.gains.p = gain;
    }

    /// Set the integral gain.
    ///
    /// Also resizes the integrator window to `±|INTEGRATOR_SPAN / gain|`.
    /// A zero gain collapses the window to zero.
    pub fn set_i_gain(&mut self, gain: i32) {
        self.gains.i = gain;
        let limit = div16x16(INTEGRATOR_SPAN, gain).saturating_abs();
        self.set_integrator_limits(-limit, limit);
    }

    /// Set the derivative gain.
    pub fn set_d_gain(&mut self, gain: i32) {
        self.gains.d = gain;
    }

    /// Proportional gain.
    pub fn p_gain(&self) -> i32 {
        self.gains.p
    }

    /// Integral gain.
    pub fn i_gain(&self) -> i32 {
        self.gains.i
    }

    /// Derivative gain.
    pub fn d_gain(&self) -> i32 {
        self.gains.d
    }

    /// All three gains.
    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Override the integrator window.
    ///
    /// The current integrator value is pulled inside the new window.
    pub fn set_integrator_limits(&mut self, min: i32, max: i32) {
        self.integ_min = min;
        self.integ_max = max.max(min);
        self.integrator = self.integrator.clamp(self.integ_min, self.integ_max);
    }

    /// Integrator window as `(min, max)`.
    pub fn integrator_limits(&self) -> (i32, i32) {
        (self.integ_min, self.integ_max)
    }

    /// Current integrator value.
    pub fn integrator(&self) -> i32 {
        self.integrator
    }

    /// Clear the integrator and derivative history. Gains are kept.
    pub fn reset(&mut self) {
        self.integrator = 0;
        self.prev_error = 0;
    }

    /// Run one controller step on `error` and return the output.
    pub fn update(&mut self, error: i32) -> i32 {
        self.integrator = self
            .integrator
            .saturating_add(error)
            .clamp(self.integ_min, self.integ_max);

        let p = mul16x16(self.gains.p, error) as i64;
        let i = mul16x16(self.gains.i, self.integrator) as i64;
        let d = mul16x16(self.gains.d, error.saturating_sub(self.prev_error)) as i64;
        self.prev_error = error;

        saturate(p + i + d)
    }
}

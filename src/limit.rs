//! Hard and soft limit switch monitor.
//!
//! Each tick the monitor samples both hard limit switches and, when soft
//! limits are enabled, compares the motor position against the configured
//! forward and reverse soft limits. The result is a pair of "OK" flags that
//! gate the H-bridge: travel in a direction is only allowed while its flag
//! is set.
//!
//! Sticky flags record whether a limit has tripped since they were last
//! cleared. They start out OK and only return to OK through the explicit
//! `clear_sticky_*` calls.
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::limit::LimitSwitches;
//! use bdc_controller::hal::MockLimits;
//!
//! let mut inputs = MockLimits::closed();
//! let mut limits = LimitSwitches::new();
//!
//! limits.set_forward(10 << 16, true); // trip above 10 revolutions
//! limits.position_enable();
//!
//! limits.tick(&inputs, 5 << 16);
//! assert!(limits.forward_ok());
//!
//! limits.tick(&inputs, 11 << 16);
//! assert!(!limits.forward_ok());
//! assert!(!limits.sticky_forward_ok());
//!
//! // back inside, but the sticky flag remembers
//! limits.tick(&inputs, 5 << 16);
//! assert!(limits.forward_ok());
//! assert!(!limits.sticky_forward_ok());
//! limits.clear_sticky_forward();
//! assert!(limits.sticky_forward_ok());
//! ```

use log::info;

use crate::traits::LimitInputs;

/// Bit snapshot of the limit flags.
///
/// Bit layout: forward OK, reverse OK, soft forward OK, soft reverse OK,
/// then the four sticky versions in the same order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimitStatus(u8);

impl LimitStatus {
    /// Forward travel allowed.
    pub const FWD_OK: u8 = 1 << 0;
    /// Reverse travel allowed.
    pub const REV_OK: u8 = 1 << 1;
    /// Forward soft limit not tripped.
    pub const SOFT_FWD_OK: u8 = 1 << 2;
    /// Reverse soft limit not tripped.
    pub const SOFT_REV_OK: u8 = 1 << 3;
    /// Forward limit has not tripped since cleared.
    pub const STICKY_FWD_OK: u8 = 1 << 4;
    /// Reverse limit has not tripped since cleared.
    pub const STICKY_REV_OK: u8 = 1 << 5;
    /// Forward soft limit has not tripped since cleared.
    pub const STICKY_SOFT_FWD_OK: u8 = 1 << 6;
    /// Reverse soft limit has not tripped since cleared.
    pub const STICKY_SOFT_REV_OK: u8 = 1 << 7;

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit in `mask` is set.
    pub const fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }
}

/// Per-direction limit state.
#[derive(Clone, Copy, Debug)]
struct Side {
    ok: bool,
    soft_ok: bool,
    sticky_ok: bool,
    sticky_soft_ok: bool,
    limit: i32,
    less_than: bool,
}

impl Side {
    const fn new() -> Self {
        Self {
            ok: false,
            soft_ok: false,
            sticky_ok: true,
            sticky_soft_ok: true,
            limit: 0,
            less_than: false,
        }
    }

    fn update(&mut self, hard_ok: bool, soft_enabled: bool, position: i32) {
        let soft_ok = if hard_ok && soft_enabled {
            if self.less_than {
                position <= self.limit
            } else {
                position >= self.limit
            }
        } else {
            true
        };

        self.ok = hard_ok && soft_ok;
        self.soft_ok = soft_ok;

        if !hard_ok || !soft_ok {
            self.sticky_ok = false;
        }
        if !soft_ok {
            self.sticky_soft_ok = false;
        }
    }
}

/// Limit switch monitor.
#[derive(Clone, Debug)]
pub struct LimitSwitches {
    forward: Side,
    reverse: Side,
    position_enabled: bool,
    auto_ramp: bool,
}

impl Default for LimitSwitches {
    fn default() -> Self {
        Self::new()
    }
}

impl LimitSwitches {
    /// Creates a monitor with no limits evaluated yet.
    ///
    /// Both directions report not-OK until the first [`tick`](Self::tick).
    pub const fn new() -> Self {
        Self {
            forward: Side::new(),
            reverse: Side::new(),
            position_enabled: false,
            auto_ramp: false,
        }
    }

    /// Check for the automatic ramp jumper.
    ///
    /// If both inputs read open, the inputs are probed for a cross-connected
    /// jumper. When one is found the switches are ignored from then on and
    /// `true` is returned so the caller can enable voltage ramping.
    pub fn init<L: LimitInputs>(&mut self, inputs: &mut L) -> bool {
        if !inputs.forward_closed() && !inputs.reverse_closed() && inputs.probe_cross_jumper() {
            info!("limit: cross-connected jumper found, automatic ramp enabled");
            self.auto_ramp = true;
        }
        self.auto_ramp
    }

    /// Returns true if the automatic ramp jumper was detected.
    pub fn auto_ramp(&self) -> bool {
        self.auto_ramp
    }

    /// Sample the switches and evaluate the soft limits.
    ///
    /// `position` is only consulted while soft limits are enabled.
    pub fn tick<L: LimitInputs>(&mut self, inputs: &L, position: i32) {
        let position = if self.position_enabled { position } else { 0 };

        let fwd_hard = self.auto_ramp || inputs.forward_closed();
        let rev_hard = self.auto_ramp || inputs.reverse_closed();

        self.forward.update(fwd_hard, self.position_enabled, position);
        self.reverse.update(rev_hard, self.position_enabled, position);
    }

    /// Enable soft position limits.
    pub fn position_enable(&mut self) {
        self.position_enabled = true;
    }

    /// Disable soft position limits.
    pub fn position_disable(&mut self) {
        self.position_enabled = false;
    }

    /// Returns true if soft position limits are enabled.
    pub fn position_active(&self) -> bool {
        self.position_enabled
    }

    /// Set the forward soft limit.
    ///
    /// With `less_than` the limit trips when the position exceeds it,
    /// otherwise when the position falls below it.
    pub fn set_forward(&mut self, position: i32, less_than: bool) {
        self.forward.limit = position;
        self.forward.less_than = less_than;
    }

    /// Forward soft limit as `(position, less_than)`.
    pub fn forward(&self) -> (i32, bool) {
        (self.forward.limit, self.forward.less_than)
    }

    /// Set the reverse soft limit.
    pub fn set_reverse(&mut self, position: i32, less_than: bool) {
        self.reverse.limit = position;
        self.reverse.less_than = less_than;
    }

    /// Reverse soft limit as `(position, less_than)`.
    pub fn reverse(&self) -> (i32, bool) {
        (self.reverse.limit, self.reverse.less_than)
    }

    /// Forward travel allowed.
    pub fn forward_ok(&self) -> bool {
        self.forward.ok
    }

    /// Reverse travel allowed.
    pub fn reverse_ok(&self) -> bool {
        self.reverse.ok
    }

    /// Forward soft limit not tripped.
    pub fn soft_forward_ok(&self) -> bool {
        self.forward.soft_ok
    }

    /// Reverse soft limit not tripped.
    pub fn soft_reverse_ok(&self) -> bool {
        self.reverse.soft_ok
    }

    /// Forward limit has not tripped since last cleared.
    pub fn sticky_forward_ok(&self) -> bool {
        self.forward.sticky_ok
    }

    /// Reverse limit has not tripped since last cleared.
    pub fn sticky_reverse_ok(&self) -> bool {
        self.reverse.sticky_ok
    }

    /// Forward soft limit has not tripped since last cleared.
    pub fn sticky_soft_forward_ok(&self) -> bool {
        self.forward.sticky_soft_ok
    }

    /// Reverse soft limit has not tripped since last cleared.
    pub fn sticky_soft_reverse_ok(&self) -> bool {
        self.reverse.sticky_soft_ok
    }

    /// Reset the forward sticky flag.
    pub fn clear_sticky_forward(&mut self) {
        self.forward.sticky_ok = true;
    }

    /// Reset the reverse sticky flag.
    pub fn clear_sticky_reverse(&mut self) {
        self.reverse.sticky_ok = true;
    }

    /// Reset the forward soft sticky flag.
    pub fn clear_sticky_soft_forward(&mut self) {
        self.forward.sticky_soft_ok = true;
    }

    /// Reset the reverse soft sticky flag.
    pub fn clear_sticky_soft_reverse(&mut self) {
        self.reverse.sticky_soft_ok = true;
    }

    /// All flags as a bit snapshot.
    pub fn status(&self) -> LimitStatus {
        let flags = [
            (self.forward.ok, LimitStatus::FWD_OK),
            (self.reverse.ok, LimitStatus::REV_OK),
            (self.forward.soft_ok, LimitStatus::SOFT_FWD_OK),
            (self.reverse.soft_ok, LimitStatus::SOFT_REV_OK),
            (self.forward.sticky_ok, LimitStatus::STICKY_FWD_OK),
            (self.reverse.sticky_ok, LimitStatus::STICKY_REV_OK),
            (self.forward.sticky_soft_ok, LimitStatus::STICKY_SOFT_FWD_OK),
            (self.reverse.sticky_soft_ok, LimitStatus::STICKY_SOFT_REV_OK),
        ];
        LimitStatus(
            flags
                .iter()
                .filter(|(set, _)| *set)
                .fold(0, |acc, (_, bit)| acc | bit),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockLimits;

    const REV: i32 = 1 << 16;

    #[test]
    fn starts_not_ok_with_sticky_set() {
        let limits = LimitSwitches::new();
        assert!(!limits.forward_ok());
        assert!(!limits.reverse_ok());
        assert_eq!(limits.status().bits(), 0xf0);
    }

    #[test]
    fn closed_switches_allow_travel() {
        let inputs = MockLimits::closed();
        let mut limits = LimitSwitches::new();
        limits.tick(&inputs, 0);
        assert!(limits.forward_ok());
        assert!(limits.reverse_ok());
        assert_eq!(limits.status().bits(), 0xff);
    }

    #[test]
    fn open_forward_switch_blocks_forward_only() {
        let mut inputs = MockLimits::closed();
        inputs.forward = false;
        let mut limits = LimitSwitches::new();
        limits.tick(&inputs, 0);
        assert!(!limits.forward_ok());
        assert!(limits.soft_forward_ok());
        assert!(limits.reverse_ok());
        assert!(!limits.sticky_forward_ok());
        assert!(limits.sticky_soft_forward_ok());
        assert!(limits.sticky_reverse_ok());
    }

    #[test]
    fn sticky_survives_until_cleared() {
        let mut inputs = MockLimits::closed();
        let mut limits = LimitSwitches::new();
        inputs.reverse = false;
        limits.tick(&inputs, 0);
        inputs.reverse = true;
        limits.tick(&inputs, 0);
        assert!(limits.reverse_ok());
        assert!(!limits.sticky_reverse_ok());
        limits.clear_sticky_reverse();
        assert!(limits.sticky_reverse_ok());
    }

    #[test]
    fn soft_limits_ignored_while_disabled() {
        let inputs = MockLimits::closed();
        let mut limits = LimitSwitches::new();
        limits.set_forward(REV, true);
        limits.tick(&inputs, 100 * REV);
        assert!(limits.forward_ok());
    }

    #[test]
    fn disabled_soft_limits_compare_against_zero() {
        // position is forced to zero, so limits are not consulted at all
        let inputs = MockLimits::closed();
        let mut limits = LimitSwitches::new();
        limits.set_forward(-REV, true);
        limits.tick(&inputs, -100 * REV);
        assert!(limits.soft_forward_ok());
    }

    #[test]
    fn forward_less_than_trips_above_limit() {
        let inputs = MockLimits::closed();
        let mut limits = LimitSwitches::new();
        limits.set_forward(10 * REV, true);
        limits.position_enable();

        limits.tick(&inputs, 10 * REV);
        assert!(limits.forward_ok());

        limits.tick(&inputs, 10 * REV + 1);
        assert!(!limits.forward_ok());
        assert!(!limits.soft_forward_ok());
        assert!(!limits.sticky_soft_forward_ok());
        assert!(limits.reverse_ok());
    }

    #[test]
    fn reverse_greater_than_trips_below_limit() {
        let inputs = MockLimits::closed();
        let mut limits = LimitSwitches::new();
        limits.set_reverse(-5 * REV, false);
        limits.position_enable();

        limits.tick(&inputs, -5 * REV);
        assert!(limits.reverse_ok());

        limits.tick(&inputs, -6 * REV);
        assert!(!limits.reverse_ok());
        assert!(!limits.soft_reverse_ok());
        assert!(!limits.sticky_reverse_ok());
        assert!(!limits.sticky_soft_reverse_ok());
    }

    #[test]
    fn open_hard_switch_skips_soft_check() {
        let mut inputs = MockLimits::closed();
        inputs.forward = false;
        let mut limits = LimitSwitches::new();
        limits.set_forward(0, true);
        limits.position_enable();
        limits.tick(&inputs, 10 * REV);
        assert!(!limits.forward_ok());
        assert!(limits.soft_forward_ok());
        assert!(limits.sticky_soft_forward_ok());
    }

    #[test]
    fn limit_getters() {
        let mut limits = LimitSwitches::new();
        limits.set_forward(42, true);
        limits.set_reverse(-42, false);
        assert_eq!(limits.forward(), (42, true));
        assert_eq!(limits.reverse(), (-42, false));
        assert!(!limits.position_active());
        limits.position_enable();
        assert!(limits.position_active());
        limits.position_disable();
        assert!(!limits.position_active());
    }

    #[test]
    fn cross_jumper_overrides_switches() {
        let mut inputs = MockLimits::open();
        inputs.cross_jumper = true;
        let mut limits = LimitSwitches::new();
        assert!(limits.init(&mut inputs));
        assert!(limits.auto_ramp());
        limits.tick(&inputs, 0);
        assert!(limits.forward_ok());
        assert!(limits.reverse_ok());
    }

    #[test]
    fn no_probe_unless_both_open() {
        let mut inputs = MockLimits::open();
        inputs.forward = true;
        inputs.cross_jumper = true;
        let mut limits = LimitSwitches::new();
        assert!(!limits.init(&mut inputs));
        assert_eq!(inputs.probe_count, 0);
    }
}

//! `embedded-hal` 1.0 adapters.
//!
//! Wraps plain GPIO and PWM peripherals so the controller can run on any
//! board with an `embedded-hal` implementation:
//!
//! - [`PinLimits`]: two limit switch inputs, wired to ground with pull-ups
//!   (low = closed = travel allowed)
//! - [`ProbedPinLimits`]: the same, with the forward input on an
//!   open-drain pin so a cross-connected jumper can be detected at startup
//! - [`PinBridge`]: a direction/enable H-bridge (L298-style) with a gate
//!   driver fault input and reset output
//!
//! Requires the `embedded-hal` feature.

use core::cell::RefCell;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};

use crate::traits::{BridgeDrive, BridgeOutputs, LimitInputs, NeutralMode, Polarity};

/// Pin-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    /// A digital pin failed.
    Digital(digital::ErrorKind),
    /// The PWM channel failed.
    Pwm(pwm::ErrorKind),
}

fn digital_err<E: digital::Error>(e: E) -> PinError {
    PinError::Digital(e.kind())
}

fn pwm_err<E: pwm::Error>(e: E) -> PinError {
    PinError::Pwm(e.kind())
}

// ============================================================================
// Limit Inputs
// ============================================================================

/// Time the gate driver reset is held low.
const GATE_RESET_US: u32 = 1;

/// Settling time after pulling the forward input low during the jumper probe.
const JUMPER_SETTLE_US: u32 = 200;

/// Limit switch inputs on two GPIO pins.
///
/// A read error counts as an open switch, which blocks travel. Plain inputs
/// cannot drive the probe, so the automatic ramp jumper is never detected;
/// use [`ProbedPinLimits`] where the forward pin can be switched to an
/// open-drain output.
pub struct PinLimits<F, R> {
    forward: RefCell<F>,
    reverse: RefCell<R>,
}

impl<F: InputPin, R: InputPin> PinLimits<F, R> {
    /// Wrap the forward and reverse inputs.
    pub fn new(forward: F, reverse: R) -> Self {
        Self {
            forward: RefCell::new(forward),
            reverse: RefCell::new(reverse),
        }
    }

    /// Release the pins.
    pub fn release(self) -> (F, R) {
        (self.forward.into_inner(), self.reverse.into_inner())
    }
}

impl<F: InputPin, R: InputPin> LimitInputs for PinLimits<F, R> {
    fn forward_closed(&self) -> bool {
        self.forward.borrow_mut().is_low().unwrap_or(false)
    }

    fn reverse_closed(&self) -> bool {
        self.reverse.borrow_mut().is_low().unwrap_or(false)
    }
}

/// Limit switch inputs with a cross-jumper probe.
///
/// The forward pin must be an open-drain output with a pull-up, so that
/// releasing it (driving high) leaves it readable as an input. The probe
/// pulls it low, waits, and checks whether the reverse input followed.
pub struct ProbedPinLimits<F, R, D> {
    forward: RefCell<F>,
    reverse: RefCell<R>,
    delay: D,
}

impl<F, R, D> ProbedPinLimits<F, R, D>
where
    F: InputPin + OutputPin,
    R: InputPin,
    D: DelayNs,
{
    /// Wrap the forward (open-drain) and reverse inputs.
    pub fn new(forward: F, reverse: R, delay: D) -> Self {
        Self {
            forward: RefCell::new(forward),
            reverse: RefCell::new(reverse),
            delay,
        }
    }

    /// Release the pins and the delay.
    pub fn release(self) -> (F, R, D) {
        (self.forward.into_inner(), self.reverse.into_inner(), self.delay)
    }
}

impl<F, R, D> LimitInputs for ProbedPinLimits<F, R, D>
where
    F: InputPin + OutputPin,
    R: InputPin,
    D: DelayNs,
{
    fn forward_closed(&self) -> bool {
        self.forward.borrow_mut().is_low().unwrap_or(false)
    }

    fn reverse_closed(&self) -> bool {
        self.reverse.borrow_mut().is_low().unwrap_or(false)
    }

    fn probe_cross_jumper(&mut self) -> bool {
        let forward = self.forward.get_mut();
        if forward.set_low().is_err() {
            return false;
        }
        self.delay.delay_us(JUMPER_SETTLE_US);
        let found = self.reverse.get_mut().is_low().unwrap_or(false);
        // a failed release leaves forward reading closed, which the next tick reports
        let _ = forward.set_high();
        found
    }
}

// ============================================================================
// Bridge Outputs
// ============================================================================

/// Direction/enable H-bridge.
///
/// | dir1 | dir2 | enable | Result |
/// |------|------|--------|--------|
/// | H | L | duty | forward |
/// | L | H | duty | reverse |
/// | L | L | on | brake |
/// | x | x | off | coast |
///
/// The gate driver fault input is active low. A read error is reported as a
/// fault. The reset output is held low for 1 µs.
pub struct PinBridge<D1, D2, EN, FLT, RST, DLY> {
    dir1: D1,
    dir2: D2,
    enable: EN,
    fault: RefCell<FLT>,
    reset: RST,
    delay: DLY,
    jumper: NeutralMode,
    period: u32,
}

impl<D1, D2, EN, FLT, RST, DLY> PinBridge<D1, D2, EN, FLT, RST, DLY>
where
    D1: OutputPin,
    D2: OutputPin,
    EN: SetDutyCycle,
    FLT: InputPin,
    RST: OutputPin,
    DLY: DelayNs,
{
    /// Wrap the pins. `period` is the PWM period in controller clocks, used
    /// to convert pulse widths to duty.
    pub fn new(
        dir1: D1,
        dir2: D2,
        enable: EN,
        fault: FLT,
        reset: RST,
        delay: DLY,
        period: u32,
    ) -> Self {
        Self {
            dir1,
            dir2,
            enable,
            fault: RefCell::new(fault),
            reset,
            delay,
            jumper: NeutralMode::Brake,
            period: period.max(1),
        }
    }

    /// Set the neutral mode reported for the brake/coast jumper.
    pub fn with_jumper(mut self, jumper: NeutralMode) -> Self {
        self.jumper = jumper;
        self
    }

    fn direction(&mut self, polarity: Polarity) -> Result<(), PinError> {
        match polarity {
            Polarity::Forward => {
                self.dir1.set_high().map_err(digital_err)?;
                self.dir2.set_low().map_err(digital_err)
            }
            Polarity::Reverse => {
                self.dir1.set_low().map_err(digital_err)?;
                self.dir2.set_high().map_err(digital_err)
            }
        }
    }

    fn duty(&self, on_clocks: u32) -> u16 {
        let max = self.enable.max_duty_cycle() as u64;
        (max * on_clocks.min(self.period) as u64 / self.period as u64) as u16
    }
}

impl<D1, D2, EN, FLT, RST, DLY> BridgeOutputs for PinBridge<D1, D2, EN, FLT, RST, DLY>
where
    D1: OutputPin,
    D2: OutputPin,
    EN: SetDutyCycle,
    FLT: InputPin,
    RST: OutputPin,
    DLY: DelayNs,
{
    type Error = PinError;

    fn apply(&mut self, drive: BridgeDrive) -> Result<(), PinError> {
        match drive {
            BridgeDrive::Neutral(NeutralMode::Coast) => {
                self.enable.set_duty_cycle_fully_off().map_err(pwm_err)
            }
            BridgeDrive::Neutral(NeutralMode::Brake) => {
                self.dir1.set_low().map_err(digital_err)?;
                self.dir2.set_low().map_err(digital_err)?;
                self.enable.set_duty_cycle_fully_on().map_err(pwm_err)
            }
            BridgeDrive::Full(polarity) => {
                self.direction(polarity)?;
                self.enable.set_duty_cycle_fully_on().map_err(pwm_err)
            }
            BridgeDrive::Pulse {
                polarity, on_clocks, ..
            } => {
                self.direction(polarity)?;
                let duty = self.duty(on_clocks);
                self.enable.set_duty_cycle(duty).map_err(pwm_err)
            }
        }
    }

    fn gate_fault(&self) -> bool {
        self.fault.borrow_mut().is_low().unwrap_or(true)
    }

    fn reset_gate_driver(&mut self) -> Result<(), PinError> {
        self.reset.set_low().map_err(digital_err)?;
        self.delay.delay_us(GATE_RESET_US);
        self.reset.set_high().map_err(digital_err)
    }

    fn jumper_mode(&self) -> NeutralMode {
        self.jumper
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Pin(Rc<Cell<bool>>);

    impl digital::ErrorType for Pin {
        type Error = Infallible;
    }

    impl InputPin for Pin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Pwm(Rc<Cell<u16>>);

    impl pwm::ErrorType for Pwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for Pwm {
        fn max_duty_cycle(&self) -> u16 {
            1000
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
            self.0.set(duty);
            Ok(())
        }
    }

    /// Records each wait with the level of the watched pin at that moment.
    #[derive(Default)]
    struct Delay {
        watch: Pin,
        waits: Rc<RefCell<Vec<(bool, u32)>>>,
    }

    impl Delay {
        fn watching(pin: &Pin) -> Self {
            Self {
                watch: pin.clone(),
                waits: Rc::default(),
            }
        }
    }

    impl DelayNs for Delay {
        fn delay_ns(&mut self, ns: u32) {
            self.waits.borrow_mut().push((self.watch.0.get(), ns));
        }
    }

    fn high() -> Pin {
        let pin = Pin::default();
        pin.0.set(true);
        pin
    }

    #[test]
    fn limits_low_is_closed() {
        let fwd = Pin::default();
        let rev = high();
        let limits = PinLimits::new(fwd.clone(), rev.clone());
        assert!(limits.forward_closed());
        assert!(!limits.reverse_closed());
        rev.0.set(false);
        assert!(limits.reverse_closed());
    }

    #[test]
    fn bridge_patterns() {
        let (d1, d2, en) = (Pin::default(), Pin::default(), Pwm::default());
        let mut bridge = PinBridge::new(
            d1.clone(),
            d2.clone(),
            en.clone(),
            high(),
            high(),
            Delay::default(),
            1024,
        );

        bridge.apply(BridgeDrive::Full(Polarity::Forward)).unwrap();
        assert!(d1.0.get() && !d2.0.get());
        assert_eq!(en.0.get(), 1000);

        bridge
            .apply(BridgeDrive::Pulse {
                polarity: Polarity::Reverse,
                on_clocks: 512,
                compare: 256,
                adc_compare: 272,
            })
            .unwrap();
        assert!(!d1.0.get() && d2.0.get());
        assert_eq!(en.0.get(), 500);

        bridge.apply(BridgeDrive::Neutral(NeutralMode::Brake)).unwrap();
        assert!(!d1.0.get() && !d2.0.get());
        assert_eq!(en.0.get(), 1000);

        bridge.apply(BridgeDrive::Neutral(NeutralMode::Coast)).unwrap();
        assert_eq!(en.0.get(), 0);
    }

    #[test]
    fn gate_fault_active_low() {
        let fault = high();
        let mut bridge = PinBridge::new(
            Pin::default(),
            Pin::default(),
            Pwm::default(),
            fault.clone(),
            high(),
            Delay::default(),
            1024,
        )
        .with_jumper(NeutralMode::Coast);
        assert!(!bridge.gate_fault());
        fault.0.set(false);
        assert!(bridge.gate_fault());
        assert_eq!(bridge.jumper_mode(), NeutralMode::Coast);
    }

    #[test]
    fn gate_reset_held_low_for_a_microsecond() {
        let reset = high();
        let delay = Delay::watching(&reset);
        let waits = delay.waits.clone();
        let mut bridge = PinBridge::new(
            Pin::default(),
            Pin::default(),
            Pwm::default(),
            high(),
            reset.clone(),
            delay,
            1024,
        );

        bridge.reset_gate_driver().unwrap();
        assert!(reset.0.get());

        let waits = waits.borrow();
        assert!(!waits.is_empty());
        // every wait happened with the line pulled low
        assert!(waits.iter().all(|(level, _)| !level));
        let total: u32 = waits.iter().map(|(_, ns)| ns).sum();
        assert_eq!(total, 1_000);
    }

    // =========================================================================
    // Jumper Probe Tests
    // =========================================================================

    #[test]
    fn probe_finds_cross_jumper() {
        // both inputs on the same net
        let net = high();
        let delay = Delay::watching(&net);
        let waits = delay.waits.clone();
        let mut limits = ProbedPinLimits::new(net.clone(), net.clone(), delay);

        assert!(!limits.forward_closed() && !limits.reverse_closed());
        assert!(limits.probe_cross_jumper());
        assert!(waits.borrow().iter().all(|(level, _)| !level));

        // forward released afterwards
        assert!(net.0.get());
        assert!(!limits.forward_closed());
    }

    #[test]
    fn probe_without_jumper() {
        let fwd = high();
        let rev = high();
        let mut limits = ProbedPinLimits::new(fwd.clone(), rev.clone(), Delay::default());

        assert!(!limits.probe_cross_jumper());
        assert!(fwd.0.get());
        assert!(!limits.reverse_closed());
    }

    #[test]
    fn plain_limits_never_find_jumper() {
        let net = high();
        let mut limits = PinLimits::new(net.clone(), net);
        assert!(!limits.probe_cross_jumper());
    }

    #[test]
    fn probed_limits_feed_auto_ramp() {
        use crate::limit::LimitSwitches;

        let net = high();
        let mut inputs = ProbedPinLimits::new(net.clone(), net, Delay::default());
        let mut limits = LimitSwitches::new();
        assert!(limits.init(&mut inputs));
        assert!(limits.auto_ramp());

        limits.tick(&inputs, 0);
        assert!(limits.forward_ok() && limits.reverse_ok());
    }
}

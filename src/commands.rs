//! Controller commands and the single-producer/single-consumer queue that
//! carries them into the control tick.
//!
//! # Command Flow
//!
//! 1. A link context (CAN, UART or servo input) builds a [`Command`], either
//!    directly or from a raw code with [`Command::from_raw`]
//! 2. It pushes the command through a [`CommandSender`]
//! 3. The 1 kHz control tick drains the [`CommandReceiver`] and dispatches
//!    each command to the controller
//!
//! The queue never blocks. When it is full the command is dropped and
//! [`CommandSender::send`] returns `false`.
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::commands::{Command, CommandQueue};
//! use bdc_controller::traits::CommandStream;
//!
//! let mut queue: CommandQueue<8> = CommandQueue::new();
//! let (mut tx, mut rx) = queue.split();
//!
//! assert!(tx.send(Command::VoltageMode(true)));
//! assert!(tx.send(Command::VoltageSet(16384)));
//!
//! assert_eq!(rx.next_command(), Some(Command::VoltageMode(true)));
//! assert_eq!(rx.next_command(), Some(Command::VoltageSet(16384)));
//! assert_eq!(rx.next_command(), None);
//! ```
//!
//! # Wire Codes
//!
//! Every command has a one-byte code and up to three 32-bit parameters.
//! Signed values travel as their two's complement bit pattern and booleans
//! as zero/non-zero.
//!
//! ```rust
//! use bdc_controller::commands::Command;
//!
//! let cmd = Command::from_raw(0x46, (-1000i32) as u32, 1, 0);
//! assert_eq!(
//!     cmd,
//!     Some(Command::PositionLimitForward { position: -1000, less_than: true })
//! );
//! assert_eq!(Command::from_raw(0x7f, 0, 0, 0), None);
//! ```

use heapless::spsc::{Consumer, Producer, Queue};

use crate::traits::CommandStream;

/// Slots in the default command queue. One slot is always left empty.
pub const DEFAULT_QUEUE_SIZE: usize = 32;

// ============================================================================
// Commands
// ============================================================================

/// A request for the controller, queued from a link context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Drop every target to zero and hold the bridge in neutral.
    ForceNeutral,

    /// Enable or disable voltage mode.
    VoltageMode(bool),
    /// Set the voltage target.
    VoltageSet(i32),
    /// Set the voltage ramp rate per tick (0 = no ramp).
    VoltageRate(u32),

    /// Enable or disable speed mode.
    SpeedMode(bool),
    /// Set the speed target.
    SpeedSet(i32),
    /// Select the speed reference (raw source code).
    SpeedSource(u32),
    /// Speed P gain.
    SpeedP(i32),
    /// Speed I gain.
    SpeedI(i32),
    /// Speed D gain.
    SpeedD(i32),

    /// Enable or disable position mode, seeding the position.
    PositionMode {
        /// Enable flag.
        enable: bool,
        /// Position to load into the encoder on enable.
        start: i32,
    },
    /// Set the position target.
    PositionSet(i32),
    /// Select the position reference (raw source code).
    PositionSource(u32),
    /// Position P gain.
    PositionP(i32),
    /// Position I gain.
    PositionI(i32),
    /// Position D gain.
    PositionD(i32),

    /// Enable or disable current mode.
    CurrentMode(bool),
    /// Set the current target.
    CurrentSet(i32),
    /// Current P gain.
    CurrentP(i32),
    /// Current I gain.
    CurrentI(i32),
    /// Current D gain.
    CurrentD(i32),

    /// Number of motor brushes. Accepted and ignored.
    NumBrushes(u32),
    /// Encoder lines per revolution.
    EncoderLines(u32),
    /// Potentiometer turns.
    PotTurns(u32),
    /// Brake/coast setting (raw setting code).
    BrakeCoast(u32),
    /// Enable or disable soft position limits.
    PositionLimitMode(bool),
    /// Forward soft limit.
    PositionLimitForward {
        /// Limit position.
        position: i32,
        /// Trip when the position is greater than the limit.
        less_than: bool,
    },
    /// Reverse soft limit.
    PositionLimitReverse {
        /// Limit position.
        position: i32,
        /// Trip when the position is greater than the limit.
        less_than: bool,
    },
    /// Maximum output voltage (8.8 volts).
    MaxVoltage(u32),

    /// Enable or disable voltage compensation mode.
    VCompMode(bool),
    /// Set the compensated voltage target (8.8 volts).
    VCompSet(i32),
    /// Target ramp rate in compensation mode.
    VCompInRamp(u32),
    /// Compensation ramp rate.
    VCompCompRamp(u32),
}

impl Command {
    /// One-byte command code.
    pub const fn code(&self) -> u8 {
        match self {
            Command::ForceNeutral => 0x00,
            Command::VoltageMode(_) => 0x01,
            Command::VoltageSet(_) => 0x02,
            Command::VoltageRate(_) => 0x03,
            Command::SpeedMode(_) => 0x11,
            Command::SpeedSet(_) => 0x12,
            Command::SpeedSource(_) => 0x13,
            Command::SpeedP(_) => 0x14,
            Command::SpeedI(_) => 0x15,
            Command::SpeedD(_) => 0x16,
            Command::PositionMode { .. } => 0x21,
            Command::PositionSet(_) => 0x22,
            Command::PositionSource(_) => 0x23,
            Command::PositionP(_) => 0x24,
            Command::PositionI(_) => 0x25,
            Command::PositionD(_) => 0x26,
            Command::CurrentMode(_) => 0x31,
            Command::CurrentSet(_) => 0x32,
            Command::CurrentP(_) => 0x33,
            Command::CurrentI(_) => 0x34,
            Command::CurrentD(_) => 0x35,
            Command::NumBrushes(_) => 0x41,
            Command::EncoderLines(_) => 0x42,
            Command::PotTurns(_) => 0x43,
            Command::BrakeCoast(_) => 0x44,
            Command::PositionLimitMode(_) => 0x45,
            Command::PositionLimitForward { .. } => 0x46,
            Command::PositionLimitReverse { .. } => 0x47,
            Command::MaxVoltage(_) => 0x48,
            Command::VCompMode(_) => 0x51,
            Command::VCompSet(_) => 0x52,
            Command::VCompInRamp(_) => 0x53,
            Command::VCompCompRamp(_) => 0x54,
        }
    }

    /// Decode a command from its code and parameters.
    ///
    /// Returns `None` for unknown codes.
    pub fn from_raw(code: u32, p1: u32, p2: u32, _p3: u32) -> Option<Self> {
        let s1 = p1 as i32;
        let b1 = p1 != 0;
        let cmd = match code {
            0x00 => Command::ForceNeutral,
            0x01 => Command::VoltageMode(b1),
            0x02 => Command::VoltageSet(s1),
            0x03 => Command::VoltageRate(p1),
            0x11 => Command::SpeedMode(b1),
            0x12 => Command::SpeedSet(s1),
            0x13 => Command::SpeedSource(p1),
            0x14 => Command::SpeedP(s1),
            0x15 => Command::SpeedI(s1),
            0x16 => Command::SpeedD(s1),
            0x21 => Command::PositionMode {
                enable: b1,
                start: p2 as i32,
            },
            0x22 => Command::PositionSet(s1),
            0x23 => Command::PositionSource(p1),
            0x24 => Command::PositionP(s1),
            0x25 => Command::PositionI(s1),
            0x26 => Command::PositionD(s1),
            0x31 => Command::CurrentMode(b1),
            0x32 => Command::CurrentSet(s1),
            0x33 => Command::CurrentP(s1),
            0x34 => Command::CurrentI(s1),
            0x35 => Command::CurrentD(s1),
            0x41 => Command::NumBrushes(p1),
            0x42 => Command::EncoderLines(p1),
            0x43 => Command::PotTurns(p1),
            0x44 => Command::BrakeCoast(p1),
            0x45 => Command::PositionLimitMode(b1),
            0x46 => Command::PositionLimitForward {
                position: s1,
                less_than: p2 != 0,
            },
            0x47 => Command::PositionLimitReverse {
                position: s1,
                less_than: p2 != 0,
            },
            0x48 => Command::MaxVoltage(p1),
            0x51 => Command::VCompMode(b1),
            0x52 => Command::VCompSet(s1),
            0x53 => Command::VCompInRamp(p1),
            0x54 => Command::VCompCompRamp(p1),
            _ => return None,
        };
        Some(cmd)
    }

    /// Encode as `(code, p1, p2, p3)`.
    pub fn to_raw(&self) -> (u32, u32, u32, u32) {
        let (p1, p2) = match *self {
            Command::ForceNeutral => (0, 0),
            Command::VoltageMode(b)
            | Command::SpeedMode(b)
            | Command::CurrentMode(b)
            | Command::PositionLimitMode(b)
            | Command::VCompMode(b) => (b as u32, 0),
            Command::VoltageSet(v)
            | Command::SpeedSet(v)
            | Command::SpeedP(v)
            | Command::SpeedI(v)
            | Command::SpeedD(v)
            | Command::PositionSet(v)
            | Command::PositionP(v)
            | Command::PositionI(v)
            | Command::PositionD(v)
            | Command::CurrentSet(v)
            | Command::CurrentP(v)
            | Command::CurrentI(v)
            | Command::CurrentD(v)
            | Command::VCompSet(v) => (v as u32, 0),
            Command::VoltageRate(u)
            | Command::SpeedSource(u)
            | Command::PositionSource(u)
            | Command::NumBrushes(u)
            | Command::EncoderLines(u)
            | Command::PotTurns(u)
            | Command::BrakeCoast(u)
            | Command::MaxVoltage(u)
            | Command::VCompInRamp(u)
            | Command::VCompCompRamp(u) => (u, 0),
            Command::PositionMode { enable, start } => (enable as u32, start as u32),
            Command::PositionLimitForward {
                position,
                less_than,
            }
            | Command::PositionLimitReverse {
                position,
                less_than,
            } => (position as u32, less_than as u32),
        };
        (self.code() as u32, p1, p2, 0)
    }

    /// Returns true for target updates that move the motor.
    ///
    /// These are discarded while the controller is in fault.
    pub const fn drives_motor(&self) -> bool {
        matches!(
            self,
            Command::VoltageSet(_)
                | Command::SpeedSet(_)
                | Command::PositionSet(_)
                | Command::CurrentSet(_)
                | Command::VCompSet(_)
        )
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Fixed-capacity command ring.
///
/// Holds `N - 1` commands. Use [`split`](Self::split) to hand the two ends
/// to the producer and consumer contexts, or use the queue directly when
/// both run on the same thread.
///
/// # Example
///
/// ```rust
/// use bdc_controller::commands::{Command, CommandQueue};
///
/// let mut queue: CommandQueue<4> = CommandQueue::new();
/// assert_eq!(queue.capacity(), 3);
///
/// assert!(queue.send(Command::ForceNeutral));
/// assert!(queue.send(Command::ForceNeutral));
/// assert!(queue.send(Command::ForceNeutral));
/// assert!(!queue.send(Command::ForceNeutral)); // full, dropped
/// assert!(queue.is_full());
/// ```
pub struct CommandQueue<const N: usize = DEFAULT_QUEUE_SIZE> {
    ring: Queue<Command, N>,
}

impl<const N: usize> CommandQueue<N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self { ring: Queue::new() }
    }

    /// Queue a command.
    ///
    /// Returns `false` if the queue is full; the command is dropped.
    #[must_use]
    pub fn send(&mut self, cmd: Command) -> bool {
        self.ring.enqueue(cmd).is_ok()
    }

    /// Split into producer and consumer halves.
    pub fn split(&mut self) -> (CommandSender<'_, N>, CommandReceiver<'_, N>) {
        let (tx, rx) = self.ring.split();
        (CommandSender { tx }, CommandReceiver { rx })
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns true if the next send would fail.
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Maximum number of queued commands.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<const N: usize> Default for CommandQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CommandStream for CommandQueue<N> {
    fn next_command(&mut self) -> Option<Command> {
        self.ring.dequeue()
    }
}

/// Producer end of a split [`CommandQueue`].
pub struct CommandSender<'a, const N: usize> {
    tx: Producer<'a, Command, N>,
}

impl<const N: usize> CommandSender<'_, N> {
    /// Queue a command.
    ///
    /// Returns `false` if the queue is full; the command is dropped.
    #[must_use]
    pub fn send(&mut self, cmd: Command) -> bool {
        self.tx.enqueue(cmd).is_ok()
    }

    /// Decode and queue a raw command.
    ///
    /// Unknown codes are dropped and reported as sent.
    #[must_use]
    pub fn send_raw(&mut self, code: u32, p1: u32, p2: u32, p3: u32) -> bool {
        match Command::from_raw(code, p1, p2, p3) {
            Some(cmd) => self.send(cmd),
            None => true,
        }
    }

    /// Returns true if there is room for another command.
    pub fn ready(&self) -> bool {
        self.tx.ready()
    }
}

/// Consumer end of a split [`CommandQueue`].
pub struct CommandReceiver<'a, const N: usize> {
    rx: Consumer<'a, Command, N>,
}

impl<const N: usize> CommandReceiver<'_, N> {
    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        !self.rx.ready()
    }
}

impl<const N: usize> CommandStream for CommandReceiver<'_, N> {
    fn next_command(&mut self) -> Option<Command> {
        self.rx.dequeue()
    }
}

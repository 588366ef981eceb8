//! # bdc-controller
//!
//! Control core for a 24 V brushed DC motor controller with a single
//! H-bridge, limit switch inputs, an encoder or potentiometer, and analog
//! sensing of current, bus voltage and temperature.
//!
//! ## Features
//!
//! - **Five control modes**: voltage with ramping, bus-voltage compensated
//!   voltage, and closed-loop current, speed and position
//! - **Fixed-point PID**: 16.16 gains with anti-windup integrator limits
//! - **Limit switches**: hard switches plus sticky soft position limits
//! - **Fault handling**: over-current, over-temperature, brown-out and gate
//!   driver faults hold the bridge in neutral for a configurable time
//! - **Link supervision**: CAN/UART/servo links with a watchdog
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware abstractions and the command stream
//! - `commands` - Command set and the lock-free command queue
//! - `controller` - State machine and control modes
//! - `pid`, `limit`, `hbridge`, `monitor` - Components the controller drives
//! - `hal` - Concrete implementations (mocks for testing, `embedded-hal` adapters)
//!
//! ## Example
//!
//! ```rust
//! use bdc_controller::{
//!     Command, CommandQueue, Config, Controller, ControllerState, LinkType,
//!     hal::{MockBridge, MockLimits, MockSensors},
//! };
//!
//! let mut controller = Controller::new(
//!     MockBridge::new(),
//!     MockLimits::closed(),
//!     MockSensors::new(),
//!     &Config::default(),
//! );
//!
//! // Commands arrive from the link handler through the queue
//! let mut queue: CommandQueue = CommandQueue::new();
//! let (mut tx, mut rx) = queue.split();
//!
//! controller.link_good(LinkType::Can);
//! assert!(tx.send(Command::VoltageRate(1000)));
//! assert!(tx.send(Command::VoltageSet(8000)));
//!
//! // Run the 1 kHz tick
//! for _ in 0..10 {
//!     controller.watchdog_pet();
//!     controller.tick(&mut rx).unwrap();
//! }
//! assert_eq!(controller.state(), ControllerState::Run);
//! assert_eq!(controller.voltage(), 8000);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

/// Command set and fixed-capacity command queue.
pub mod commands;
/// Controller configuration with builder-style setters.
pub mod config;
/// State machine, control modes and fault bookkeeping.
pub mod controller;
/// 16.16 fixed-point helpers.
pub mod fixed;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Voltage to PWM pattern conversion.
pub mod hbridge;
/// Hard and soft limit switches.
pub mod limit;
/// Current, temperature and bus voltage fault monitor.
pub mod monitor;
/// Fixed-point PID controller.
pub mod pid;
/// Core traits for hardware abstraction and command input.
pub mod traits;

// Re-exports for convenience
pub use commands::{Command, CommandQueue, CommandReceiver, CommandSender, DEFAULT_QUEUE_SIZE};
pub use controller::{
    CommandOutcome, ControlMode, Controller, ControllerState, ControllerStatus, FaultCounts,
    LinkType, PositionSource, SpeedSource,
};
pub use hbridge::{BrakeCoastSetting, HBridge};
pub use limit::{LimitStatus, LimitSwitches};
pub use monitor::FaultMonitor;
pub use pid::{Pid, PidGains};
pub use traits::{
    BridgeDrive, BridgeOutputs, CommandStream, Fault, FaultFlags, LimitInputs, MotorSensors,
    NeutralMode, NoCommands, Polarity,
};

// Config re-exports
pub use config::{Config, ControllerConfig, MonitorConfig, PwmConfig};

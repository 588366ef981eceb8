//! Trait definitions for hardware abstraction and command delivery.
//!
//! This module defines the core abstractions that let the controller:
//! - Run on different hardware (a Stellaris board, desktop mocks)
//! - Receive commands from any producer context
//!
//! # Submodules
//!
//! - `hardware`: Bridge outputs, limit inputs, motor sensors, fault kinds
//! - `command`: Command stream consumed by the control tick
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`BridgeOutputs`]: PWM generator and gate driver
//! - [`LimitInputs`]: Hard limit switches
//! - [`MotorSensors`]: Encoder, potentiometer, current, bus voltage, temperature

pub mod command;
pub mod hardware;

pub use command::*;
pub use hardware::*;

//! Portico Hardware Abstraction Layer
//!
//! This crate defines the device contracts board-independent code is
//! written against, and the lifecycle, masking and validation rules every
//! board shares. Board crates supply the register-level backends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application                            │
//! └─────────────────────────────────────────┘
//!                     │  registry::devices()
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  portico-hal (this crate)               │
//! │  PinOutput  UartChannel  RtcClock  ...  │
//! └─────────────────────────────────────────┘
//!                     │  GpioPort / UartBackend / RtcBackend
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ portico-hal-  │       │  chip-specific│
//! │     sim       │       │    backends   │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Modules
//!
//! - [`device`] - Open/close lifecycle and sharing policy
//! - [`gpio`] - Port width algebra, ports, pins and multi-pin fields
//! - [`uart`] - Serial channels
//! - [`rtc`] - Real-time clock and calendar validation
//! - [`registry`] - Name to device directory

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

pub mod device;
pub mod error;
pub mod gpio;
pub mod registry;
pub mod rtc;
pub mod uart;

// Host tests need a critical-section implementation linked in
#[cfg(test)]
use critical_section as _;

pub use device::{Device, DeviceAccessGuard, SharingPolicy};
pub use error::{Error, Result};
pub use gpio::{GpioPort, InputPin, OutputPin, PinInput, PinOutput, PortInput, PortOutput, PortWidth};
pub use registry::{devices, DeviceHandle, DeviceRegistry};
pub use rtc::{CalendarTime, RtcBackend, RtcClock};
pub use uart::{Baudrate, FlowControl, Mode, UartBackend, UartChannel, UartConfig};

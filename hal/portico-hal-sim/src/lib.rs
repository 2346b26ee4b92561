//! Host-simulated board for portico-hal
//!
//! This crate provides host implementations of the `portico-hal` backend
//! contracts, for running board-independent code and its tests without
//! hardware:
//!
//! - [`SimRegister`] - GPIO latch/direction registers with external levels
//! - [`SimUart`] - UART transport with loopback and real read timeouts
//! - [`SimRtc`] - Software RTC running off the host clock
//! - [`Board`] - Bring-up of a whole board from a TOML description

pub mod board;
pub mod gpio;
pub mod rtc;
pub mod uart;

// The hal's mutexes need a critical-section implementation on the host
use critical_section as _;

pub use board::{Board, BoardConfig, BoardError};
pub use gpio::{sim_port, SimPort, SimRegister};
pub use rtc::SimRtc;
pub use uart::SimUart;

//! GPIO port and pin abstractions
//!
//! A board backend provides a [`GpioPort`] of some [`PortWidth`]; pins and
//! fields hold shared references to it and translate logical values into
//! masked port writes.
//!
//! ```text
//! PinOutput ─┐
//! PinInput  ─┼──► Arc<dyn GpioPort<W>> ──► backend (e.g. RegisterPort)
//! PortOutput─┤
//! PortInput ─┘
//! ```

pub mod field;
pub mod pin;
pub mod port;
pub mod width;

pub use field::{Modifier, PortInput, PortOutput};
pub use pin::{PinInput, PinOutput};
pub use port::{GpioPort, GpioRegister, RegisterPort};
pub use width::{max_pin_for_bytes, PortWidth};

use crate::device::Device;
use crate::error::Result;

/// Digital output pin
///
/// Implementations translate the logical level into a write on their port.
pub trait OutputPin: Device {
    /// Drive the logical level of the pin
    fn set(&self, high: bool) -> Result<()>;

    /// Set the pin high (logic 1)
    fn set_high(&self) -> Result<()> {
        self.set(true)
    }

    /// Set the pin low (logic 0)
    fn set_low(&self) -> Result<()> {
        self.set(false)
    }
}

/// Digital input pin
pub trait InputPin: Device {
    /// Sample the logical level of the pin
    fn get(&self) -> Result<bool>;

    /// Check if the pin reads high (logic 1)
    fn is_high(&self) -> Result<bool> {
        self.get()
    }

    /// Check if the pin reads low (logic 0)
    fn is_low(&self) -> Result<bool> {
        self.get().map(|high| !high)
    }
}

//! Multi-bit views of a port
//!
//! A field is a group of pins driven or sampled together, e.g. a parallel
//! data bus or a set of address-select lines.

use alloc::boxed::Box;
use alloc::sync::Arc;

use super::port::GpioPort;
use super::width::PortWidth;
use crate::device::{Device, DeviceAccessGuard, SharingPolicy};
use crate::error::{Error, Result};

/// Turns the logical value of a field into the raw port value to write
///
/// Receives the logical value and the field mask.
pub type Modifier<W> = Box<dyn Fn(W, W) -> W + Send + Sync>;

/// Output view of a group of pins
pub struct PortOutput<W: PortWidth> {
    guard: DeviceAccessGuard,
    port: Arc<dyn GpioPort<W>>,
    mask: W,
    modifier: Option<Modifier<W>>,
}

impl<W: PortWidth> PortOutput<W> {
    /// Create a field writing raw port values through `mask`
    pub fn new(port: Arc<dyn GpioPort<W>>, mask: W) -> Result<Self> {
        Self::build(port, mask, None, SharingPolicy::Exclusive)
    }

    /// Create a field whose values are aligned to the lowest masked bit
    ///
    /// Writing `0b101` to a field masked `0b1110_0000` drives `0b1010_0000`.
    pub fn aligned(port: Arc<dyn GpioPort<W>>, mask: W) -> Result<Self> {
        let modifier: Modifier<W> = Box::new(|value, mask| value << mask.trailing_zeros());
        Self::build(port, mask, Some(modifier), SharingPolicy::Exclusive)
    }

    /// Create a field with a custom value modifier
    pub fn with_modifier(
        port: Arc<dyn GpioPort<W>>,
        mask: W,
        modifier: Modifier<W>,
        policy: SharingPolicy,
    ) -> Result<Self> {
        Self::build(port, mask, Some(modifier), policy)
    }

    fn build(
        port: Arc<dyn GpioPort<W>>,
        mask: W,
        modifier: Option<Modifier<W>>,
        policy: SharingPolicy,
    ) -> Result<Self> {
        if mask == W::ZERO {
            error!("Port field mask selects no pins");
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            guard: DeviceAccessGuard::new(policy),
            port,
            mask,
            modifier,
        })
    }

    /// Drive the field; pins outside the mask are untouched
    pub fn set(&self, value: W) -> Result<()> {
        let raw = match &self.modifier {
            Some(modifier) => modifier(value, self.mask),
            None => value,
        };
        self.port.set(raw, self.mask)
    }
}

impl<W: PortWidth> Device for PortOutput<W> {
    fn guard(&self) -> &DeviceAccessGuard {
        &self.guard
    }
}

/// Input view of a group of pins
pub struct PortInput<W: PortWidth> {
    guard: DeviceAccessGuard,
    port: Arc<dyn GpioPort<W>>,
    mask: W,
}

impl<W: PortWidth> PortInput<W> {
    /// Create a shared field reader over `mask`
    pub fn new(port: Arc<dyn GpioPort<W>>, mask: W) -> Result<Self> {
        if mask == W::ZERO {
            error!("Port field mask selects no pins");
            return Err(Error::InvalidArgument);
        }

        Ok(Self {
            guard: DeviceAccessGuard::new(SharingPolicy::Shared),
            port,
            mask,
        })
    }

    /// Sample the field, shifted down so the lowest masked pin is bit 0
    pub fn get(&self) -> Result<W> {
        let raw = self.port.get()?;
        Ok((raw & self.mask) >> self.mask.trailing_zeros())
    }
}

impl<W: PortWidth> Device for PortInput<W> {
    fn guard(&self) -> &DeviceAccessGuard {
        &self.guard
    }

    fn open(&self) -> Result<()> {
        self.guard.open_with(|| self.port.configure_input(self.mask))
    }
}

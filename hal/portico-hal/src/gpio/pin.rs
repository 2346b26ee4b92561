//! Single-pin views of a port

use alloc::sync::Arc;

use super::port::GpioPort;
use super::width::PortWidth;
use super::{InputPin, OutputPin};
use crate::device::{Device, DeviceAccessGuard, SharingPolicy};
use crate::error::{Error, Result};

/// Output view of one pin of a port
///
/// Holds a shared reference to the port, so the port lives at least as long
/// as its last pin.
pub struct PinOutput<W: PortWidth> {
    guard: DeviceAccessGuard,
    port: Arc<dyn GpioPort<W>>,
    mask: W,
    /// If true, logical high drives the pin low
    negated: bool,
}

impl<W: PortWidth> PinOutput<W> {
    /// Create an exclusive output on `pin` of `port`
    ///
    /// Fails with [`Error::InvalidArgument`] if the port has no such pin.
    pub fn new(port: Arc<dyn GpioPort<W>>, pin: u8, negated: bool) -> Result<Self> {
        Self::with_policy(port, pin, negated, SharingPolicy::Exclusive)
    }

    /// Create an output with an explicit sharing policy
    pub fn with_policy(
        port: Arc<dyn GpioPort<W>>,
        pin: u8,
        negated: bool,
        policy: SharingPolicy,
    ) -> Result<Self> {
        let mask = W::checked_mask(pin)
            .inspect_err(|_| error!("Pin {} exceeds port maximum {}", pin, W::MAX_PIN))?;

        Ok(Self {
            guard: DeviceAccessGuard::new(policy),
            port,
            mask,
            negated,
        })
    }
}

impl<W: PortWidth> Device for PinOutput<W> {
    fn guard(&self) -> &DeviceAccessGuard {
        &self.guard
    }
}

impl<W: PortWidth> OutputPin for PinOutput<W> {
    fn set(&self, high: bool) -> Result<()> {
        // Negation flips the driven level, never the mask
        let value = if high != self.negated { W::ALL_ONES } else { W::ZERO };
        self.port.set(value, self.mask)
    }
}

impl<W: PortWidth> embedded_hal::digital::ErrorType for PinOutput<W> {
    type Error = Error;
}

impl<W: PortWidth> embedded_hal::digital::OutputPin for PinOutput<W> {
    fn set_low(&mut self) -> Result<()> {
        OutputPin::set(&*self, false)
    }

    fn set_high(&mut self) -> Result<()> {
        OutputPin::set(&*self, true)
    }
}

/// Input view of one pin of a port
pub struct PinInput<W: PortWidth> {
    guard: DeviceAccessGuard,
    port: Arc<dyn GpioPort<W>>,
    pin: u8,
    mask: W,
    /// If true, a low level reads as logical high
    negated: bool,
}

impl<W: PortWidth> PinInput<W> {
    /// Create an exclusive input on `pin` of `port`
    ///
    /// Fails with [`Error::InvalidArgument`] if the port has no such pin.
    pub fn new(port: Arc<dyn GpioPort<W>>, pin: u8, negated: bool) -> Result<Self> {
        Self::with_policy(port, pin, negated, SharingPolicy::Exclusive)
    }

    /// Create an input with an explicit sharing policy
    pub fn with_policy(
        port: Arc<dyn GpioPort<W>>,
        pin: u8,
        negated: bool,
        policy: SharingPolicy,
    ) -> Result<Self> {
        let mask = W::checked_mask(pin)
            .inspect_err(|_| error!("Pin {} exceeds port maximum {}", pin, W::MAX_PIN))?;

        Ok(Self {
            guard: DeviceAccessGuard::new(policy),
            port,
            pin,
            mask,
            negated,
        })
    }
}

impl<W: PortWidth> Device for PinInput<W> {
    fn guard(&self) -> &DeviceAccessGuard {
        &self.guard
    }

    /// Open the input, switching the pin to input on first open
    fn open(&self) -> Result<()> {
        self.guard.open_with(|| self.port.configure_input(self.mask))
    }
}

impl<W: PortWidth> InputPin for PinInput<W> {
    fn get(&self) -> Result<bool> {
        let raw = self.port.get()?;
        let level = (raw & self.mask) >> u32::from(self.pin) == W::ONE;
        Ok(level != self.negated)
    }
}

impl<W: PortWidth> embedded_hal::digital::ErrorType for PinInput<W> {
    type Error = Error;
}

impl<W: PortWidth> embedded_hal::digital::InputPin for PinInput<W> {
    fn is_high(&mut self) -> Result<bool> {
        InputPin::get(&*self)
    }

    fn is_low(&mut self) -> Result<bool> {
        InputPin::get(&*self).map(|high| !high)
    }
}

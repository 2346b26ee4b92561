//! Whole-port access
//!
//! [`GpioPort`] is the contract every pin and field view writes through.
//! [`RegisterPort`] implements it on top of a raw value/direction register
//! pair, keeping the read-modify-write atomic.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::width::PortWidth;
use crate::error::Result;

/// A GPIO port of width `W`
///
/// Backends implement this for their port peripheral. Implementations must
/// be safe to call from several threads at once.
pub trait GpioPort<W: PortWidth>: Send + Sync {
    /// Sample the raw value of the whole port
    fn get(&self) -> Result<W>;

    /// Drive the bits selected by `mask` to the matching bits of `value`
    ///
    /// Bits outside `mask` must be preserved exactly, whatever `value`
    /// holds there. Concurrent calls with disjoint masks must not interfere
    /// and concurrent calls with overlapping masks must not lose updates.
    fn set(&self, value: W, mask: W) -> Result<()>;

    /// Switch the bits selected by `mask` to inputs
    ///
    /// Ports without direction control can keep the default no-op.
    fn configure_input(&self, mask: W) -> Result<()> {
        let _ = mask;
        Ok(())
    }
}

/// Raw port registers
///
/// Whole-width accessors only; [`RegisterPort`] supplies the masking and
/// the locking around them.
pub trait GpioRegister<W: PortWidth>: Send {
    /// Read the pin levels of the whole port
    fn read(&mut self) -> Result<W>;

    /// Write the output latch of the whole port
    fn write(&mut self, value: W) -> Result<()>;

    /// Set pin directions; a set bit makes the pin an input
    fn set_direction(&mut self, inputs: W) -> Result<()>;
}

struct PortState<W, R> {
    register: R,
    /// Last value accepted by the output latch
    value: W,
    /// Last direction accepted by the register (set bit = input)
    direction: W,
}

/// [`GpioPort`] built on a [`GpioRegister`]
///
/// Keeps shadow copies of the output latch and direction so a masked write
/// never has to read back outputs. Shadows only change after the register
/// accepted the write.
pub struct RegisterPort<W: PortWidth, R: GpioRegister<W>> {
    state: Mutex<CriticalSectionRawMutex, RefCell<PortState<W, R>>>,
}

impl<W: PortWidth, R: GpioRegister<W>> RegisterPort<W, R> {
    /// Create a port with every pin an output driven low
    pub fn new(register: R) -> Result<Self> {
        Self::with_initial(register, W::ZERO, W::ZERO)
    }

    /// Create a port, programming the initial latch value and direction
    pub fn with_initial(mut register: R, direction: W, value: W) -> Result<Self> {
        register.write(value)?;
        register.set_direction(direction)?;

        Ok(Self {
            state: Mutex::new(RefCell::new(PortState {
                register,
                value,
                direction,
            })),
        })
    }

    /// Current direction shadow (set bit = input)
    pub fn direction(&self) -> W {
        self.state.lock(|state| state.borrow().direction)
    }

    /// Current output latch shadow
    pub fn output_value(&self) -> W {
        self.state.lock(|state| state.borrow().value)
    }
}

impl<W: PortWidth, R: GpioRegister<W>> GpioPort<W> for RegisterPort<W, R> {
    fn get(&self) -> Result<W> {
        self.state.lock(|state| state.borrow_mut().register.read())
    }

    fn set(&self, value: W, mask: W) -> Result<()> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();

            let new_value = (value & mask) | (state.value & !mask);
            let new_direction = state.direction & !mask;

            if let Err(e) = state.register.write(new_value) {
                error!("Failed to write port latch: {}", e);
                return Err(e);
            }
            if let Err(e) = state.register.set_direction(new_direction) {
                error!("Failed to set port direction: {}", e);
                return Err(e);
            }

            state.value = new_value;
            state.direction = new_direction;
            Ok(())
        })
    }

    fn configure_input(&self, mask: W) -> Result<()> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();

            let new_direction = state.direction | mask;
            state.register.set_direction(new_direction)?;
            state.direction = new_direction;
            Ok(())
        })
    }
}

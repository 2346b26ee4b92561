//! Simulated GPIO registers
//!
//! A [`SimRegister`] models the latch and direction registers of one port
//! plus the levels the outside world drives onto its input pins. Clones
//! share the same registers, so a test can keep a handle while the port
//! owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use portico_hal::gpio::{GpioRegister, PortWidth, RegisterPort};
use portico_hal::{Error, Result};

/// Port backed by a simulated register
pub type SimPort<W> = RegisterPort<W, SimRegister<W>>;

#[derive(Debug)]
struct Registers<W> {
    latch: W,
    /// Set bit = input
    direction: W,
    external: W,
    faulty: bool,
}

/// Simulated port register pair
#[derive(Debug, Clone)]
pub struct SimRegister<W: PortWidth> {
    registers: Arc<Mutex<Registers<W>>>,
}

impl<W: PortWidth> SimRegister<W> {
    /// Registers at reset: all outputs, latch low, nothing driven externally
    pub fn new() -> Self {
        Self {
            registers: Arc::new(Mutex::new(Registers {
                latch: W::ZERO,
                direction: W::ZERO,
                external: W::ZERO,
                faulty: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registers<W>> {
        self.registers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Levels driven onto the port from outside; visible on input pins only
    pub fn drive(&self, levels: W) {
        self.lock().external = levels;
    }

    /// Current output latch
    pub fn latch(&self) -> W {
        self.lock().latch
    }

    /// Current direction register (set bit = input)
    pub fn direction(&self) -> W {
        self.lock().direction
    }

    /// Make every register access fail with [`Error::HardwareError`]
    pub fn set_faulty(&self, faulty: bool) {
        self.lock().faulty = faulty;
    }
}

impl<W: PortWidth> Default for SimRegister<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: PortWidth> GpioRegister<W> for SimRegister<W> {
    fn read(&mut self) -> Result<W> {
        let registers = self.lock();
        if registers.faulty {
            return Err(Error::HardwareError);
        }
        Ok((registers.latch & !registers.direction) | (registers.external & registers.direction))
    }

    fn write(&mut self, value: W) -> Result<()> {
        let mut registers = self.lock();
        if registers.faulty {
            return Err(Error::HardwareError);
        }
        registers.latch = value;
        Ok(())
    }

    fn set_direction(&mut self, inputs: W) -> Result<()> {
        let mut registers = self.lock();
        if registers.faulty {
            return Err(Error::HardwareError);
        }
        registers.direction = inputs;
        Ok(())
    }
}

/// Build a simulated port, returning it together with a register handle
pub fn sim_port<W: PortWidth>(direction: W, value: W) -> Result<(SimRegister<W>, Arc<SimPort<W>>)> {
    let register = SimRegister::new();
    let port = RegisterPort::with_initial(register.clone(), direction, value)?;
    Ok((register, Arc::new(port)))
}

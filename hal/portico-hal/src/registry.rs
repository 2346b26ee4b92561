//! Name to device directory
//!
//! Boards register their devices once during bring-up; application code
//! looks them up by name. Every lookup of a name returns a handle to the
//! same instance.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::{Error, Result};
use crate::gpio::{GpioPort, InputPin, OutputPin, PortWidth};
use crate::rtc::{RtcBackend, RtcClock};
use crate::uart::{UartBackend, UartChannel};

/// A port of any supported width
#[derive(Clone)]
pub enum PortHandle {
    U8(Arc<dyn GpioPort<u8>>),
    U16(Arc<dyn GpioPort<u16>>),
    U32(Arc<dyn GpioPort<u32>>),
    U64(Arc<dyn GpioPort<u64>>),
}

/// Port widths that can be stored in a [`PortHandle`]
pub trait RegistryPort: PortWidth {
    fn into_handle(port: Arc<dyn GpioPort<Self>>) -> PortHandle;

    fn from_handle(handle: &PortHandle) -> Option<Arc<dyn GpioPort<Self>>>;
}

macro_rules! impl_registry_port {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl RegistryPort for $ty {
                fn into_handle(port: Arc<dyn GpioPort<Self>>) -> PortHandle {
                    PortHandle::$variant(port)
                }

                fn from_handle(handle: &PortHandle) -> Option<Arc<dyn GpioPort<Self>>> {
                    match handle {
                        PortHandle::$variant(port) => Some(port.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_registry_port!(u8 => U8, u16 => U16, u32 => U32, u64 => U64);

/// Registered device
#[derive(Clone)]
pub enum DeviceHandle {
    Uart(Arc<UartChannel>),
    Rtc(Arc<RtcClock>),
    Port(PortHandle),
    PinOutput(Arc<dyn OutputPin>),
    PinInput(Arc<dyn InputPin>),
}

impl DeviceHandle {
    /// Create a UART device from any backend
    pub fn new_uart<B: UartBackend + 'static>(backend: B) -> Self {
        DeviceHandle::Uart(Arc::new(UartChannel::new(backend)))
    }

    /// Create an RTC device from any backend
    pub fn new_rtc<B: RtcBackend + 'static>(backend: B) -> Self {
        DeviceHandle::Rtc(Arc::new(RtcClock::new(backend)))
    }

    /// Wrap a port of any supported width
    pub fn new_port<W: RegistryPort>(port: Arc<dyn GpioPort<W>>) -> Self {
        DeviceHandle::Port(W::into_handle(port))
    }

    /// Device class name, for diagnostics
    pub fn class(&self) -> &'static str {
        match self {
            DeviceHandle::Uart(_) => "uart",
            DeviceHandle::Rtc(_) => "rtc",
            DeviceHandle::Port(_) => "port",
            DeviceHandle::PinOutput(_) => "pin-output",
            DeviceHandle::PinInput(_) => "pin-input",
        }
    }
}

/// Thread-safe name to device map
pub struct DeviceRegistry {
    entries: Mutex<CriticalSectionRawMutex, RefCell<BTreeMap<String, DeviceHandle>>>,
}

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Bind `name` to `device`
    ///
    /// Fails with [`Error::Duplicate`] if the name is taken; the existing
    /// binding is kept.
    pub fn register(&self, name: &str, device: DeviceHandle) -> Result<()> {
        let class = device.class();

        self.entries.lock(|entries| {
            let mut entries = entries.borrow_mut();
            if entries.contains_key(name) {
                warn!("Failed to register {} '{}': name already taken", class, name);
                return Err(Error::Duplicate);
            }

            entries.insert(name.to_string(), device);
            debug!("Registered {} '{}'", class, name);
            Ok(())
        })
    }

    /// Handle to the device registered under `name`
    pub fn lookup(&self, name: &str) -> Result<DeviceHandle> {
        self.entries
            .lock(|entries| entries.borrow().get(name).cloned())
            .ok_or(Error::NotFound)
    }

    /// Remove the binding of `name`, returning the device
    pub fn unregister(&self, name: &str) -> Result<DeviceHandle> {
        self.entries
            .lock(|entries| entries.borrow_mut().remove(name))
            .ok_or(Error::NotFound)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock(|entries| entries.borrow().contains_key(name))
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock(|entries| entries.borrow().keys().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.entries.lock(|entries| entries.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn uart(&self, name: &str) -> Result<Arc<UartChannel>> {
        match self.lookup(name)? {
            DeviceHandle::Uart(uart) => Ok(uart),
            _ => Err(Error::WrongDeviceType),
        }
    }

    pub fn rtc(&self, name: &str) -> Result<Arc<RtcClock>> {
        match self.lookup(name)? {
            DeviceHandle::Rtc(rtc) => Ok(rtc),
            _ => Err(Error::WrongDeviceType),
        }
    }

    /// Port registered under `name`; its width must be `W`
    pub fn port<W: RegistryPort>(&self, name: &str) -> Result<Arc<dyn GpioPort<W>>> {
        match self.lookup(name)? {
            DeviceHandle::Port(port) => W::from_handle(&port).ok_or(Error::WrongDeviceType),
            _ => Err(Error::WrongDeviceType),
        }
    }

    pub fn pin_output(&self, name: &str) -> Result<Arc<dyn OutputPin>> {
        match self.lookup(name)? {
            DeviceHandle::PinOutput(pin) => Ok(pin),
            _ => Err(Error::WrongDeviceType),
        }
    }

    pub fn pin_input(&self, name: &str) -> Result<Arc<dyn InputPin>> {
        match self.lookup(name)? {
            DeviceHandle::PinInput(pin) => Ok(pin),
            _ => Err(Error::WrongDeviceType),
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static DEVICES: DeviceRegistry = DeviceRegistry::new();

/// Process-wide registry
///
/// Starts empty; bindings live until unregistered or process exit.
pub fn devices() -> &'static DeviceRegistry {
    &DEVICES
}

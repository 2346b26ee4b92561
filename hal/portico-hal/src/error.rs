//! Error taxonomy shared by every device and backend

use core::fmt;

/// Errors surfaced by devices, backends and the registry
///
/// Backends map their chip-specific failures onto these variants; the
/// abstraction layer passes backend errors through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Input rejected before reaching the backend
    InvalidArgument,
    /// Backend failure or a self-contradictory hardware reading
    HardwareError,
    /// No data arrived before the deadline
    Timeout,
    /// Operation requires an open device
    NotOpened,
    /// Exclusive device already has a holder
    AlreadyOpen,
    /// No device registered under the requested name
    NotFound,
    /// A device is already registered under the requested name
    Duplicate,
    /// Backend does not support the requested configuration
    NotSupported,
    /// Registered device is not of the requested class
    WrongDeviceType,
}

/// Result alias used throughout the crate
pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    /// Short human readable description
    pub const fn as_str(&self) -> &'static str {
        match self {
            Error::InvalidArgument => "invalid argument",
            Error::HardwareError => "hardware error",
            Error::Timeout => "timeout occurred",
            Error::NotOpened => "device not opened",
            Error::AlreadyOpen => "device already opened",
            Error::NotFound => "device not found",
            Error::Duplicate => "device already registered",
            Error::NotSupported => "operation not supported",
            Error::WrongDeviceType => "wrong device type",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for Error {}

impl embedded_hal::digital::Error for Error {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;

        match self {
            Error::InvalidArgument => ErrorKind::InvalidInput,
            Error::Timeout => ErrorKind::TimedOut,
            Error::NotOpened => ErrorKind::NotConnected,
            Error::AlreadyOpen => ErrorKind::AddrInUse,
            Error::NotFound => ErrorKind::NotFound,
            Error::Duplicate => ErrorKind::AlreadyExists,
            Error::NotSupported => ErrorKind::Unsupported,
            Error::HardwareError | Error::WrongDeviceType => ErrorKind::Other,
        }
    }
}

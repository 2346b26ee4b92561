//! UART serial channels
//!
//! [`UartChannel`] owns a board-specific [`UartBackend`] and adds the
//! lifecycle rules on top of it: the channel is exclusive, transfers require
//! an open channel and dropping an open channel closes the backend.
//!
//! Reads return whatever arrived before the timeout. A short read is a
//! success carrying the received count; only a read that received nothing
//! fails with [`Error::Timeout`].

use alloc::boxed::Box;
use alloc::vec::Vec;

use embassy_time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceAccessGuard, SharingPolicy};
use crate::error::{Error, Result};

/// Line speed in bits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub enum Baudrate {
    B1200,
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    #[default]
    B115200,
    B230400,
    B460800,
    B921600,
}

impl Baudrate {
    /// Every supported rate, slowest first
    pub const ALL: [Baudrate; 11] = [
        Baudrate::B1200,
        Baudrate::B2400,
        Baudrate::B4800,
        Baudrate::B9600,
        Baudrate::B19200,
        Baudrate::B38400,
        Baudrate::B57600,
        Baudrate::B115200,
        Baudrate::B230400,
        Baudrate::B460800,
        Baudrate::B921600,
    ];

    /// Rate in bits per second
    pub const fn as_u32(self) -> u32 {
        match self {
            Baudrate::B1200 => 1200,
            Baudrate::B2400 => 2400,
            Baudrate::B4800 => 4800,
            Baudrate::B9600 => 9600,
            Baudrate::B19200 => 19200,
            Baudrate::B38400 => 38400,
            Baudrate::B57600 => 57600,
            Baudrate::B115200 => 115200,
            Baudrate::B230400 => 230400,
            Baudrate::B460800 => 460800,
            Baudrate::B921600 => 921600,
        }
    }
}

impl TryFrom<u32> for Baudrate {
    type Error = Error;

    fn try_from(rate: u32) -> Result<Self> {
        Baudrate::ALL
            .into_iter()
            .find(|baudrate| baudrate.as_u32() == rate)
            .ok_or(Error::InvalidArgument)
    }
}

impl From<Baudrate> for u32 {
    fn from(baudrate: Baudrate) -> Self {
        baudrate.as_u32()
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

/// Frame format in the traditional `<data bits><parity><stop bits>` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "8N1"))]
    EightNoneOne,
    #[cfg_attr(feature = "serde", serde(rename = "8E1"))]
    EightEvenOne,
    #[cfg_attr(feature = "serde", serde(rename = "8O1"))]
    EightOddOne,
    #[cfg_attr(feature = "serde", serde(rename = "8N2"))]
    EightNoneTwo,
    #[cfg_attr(feature = "serde", serde(rename = "7E1"))]
    SevenEvenOne,
    #[cfg_attr(feature = "serde", serde(rename = "7O1"))]
    SevenOddOne,
}

impl Mode {
    pub const fn data_bits(self) -> DataBits {
        match self {
            Mode::SevenEvenOne | Mode::SevenOddOne => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    pub const fn parity(self) -> Parity {
        match self {
            Mode::EightEvenOne | Mode::SevenEvenOne => Parity::Even,
            Mode::EightOddOne | Mode::SevenOddOne => Parity::Odd,
            Mode::EightNoneOne | Mode::EightNoneTwo => Parity::None,
        }
    }

    pub const fn stop_bits(self) -> StopBits {
        match self {
            Mode::EightNoneTwo => StopBits::Two,
            _ => StopBits::One,
        }
    }

    /// Traditional short name, e.g. `"8N1"`
    pub const fn as_str(self) -> &'static str {
        match self {
            Mode::EightNoneOne => "8N1",
            Mode::EightEvenOne => "8E1",
            Mode::EightOddOne => "8O1",
            Mode::EightNoneTwo => "8N2",
            Mode::SevenEvenOne => "7E1",
            Mode::SevenOddOne => "7O1",
        }
    }
}

/// Flow control used on the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum FlowControl {
    #[default]
    None,
    RtsCts,
    XonXoff,
}

/// UART configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UartConfig {
    pub baudrate: Baudrate,
    pub mode: Mode,
    pub flow_control: FlowControl,
}

/// Board-specific UART transport
///
/// Methods take `&self`; implementations synchronize their own state.
pub trait UartBackend: Send + Sync {
    /// Start the transport with its current configuration
    fn open(&self) -> Result<()>;

    /// Stop the transport
    fn close(&self) -> Result<()>;

    fn set_baudrate(&self, baudrate: Baudrate) -> Result<()>;

    fn set_mode(&self, mode: Mode) -> Result<()>;

    fn set_flow_control(&self, flow_control: FlowControl) -> Result<()>;

    /// Accept the whole buffer for transmission
    ///
    /// Returns once every byte was queued or sent, or on error.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Receive up to `buf.len()` bytes, waiting at most `timeout`
    ///
    /// Returns the number of bytes placed at the start of `buf`, which may
    /// be zero if nothing arrived in time.
    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

/// A single UART channel
pub struct UartChannel {
    guard: DeviceAccessGuard,
    backend: Box<dyn UartBackend>,
}

impl UartChannel {
    /// Create a closed channel over `backend`
    pub fn new<B: UartBackend + 'static>(backend: B) -> Self {
        Self {
            guard: DeviceAccessGuard::new(SharingPolicy::Exclusive),
            backend: Box::new(backend),
        }
    }

    pub fn set_baudrate(&self, baudrate: Baudrate) -> Result<()> {
        self.backend.set_baudrate(baudrate).inspect_err(|e| {
            error!("Failed to set UART baudrate {}: {}", baudrate.as_u32(), e);
        })
    }

    /// Set data bits, parity and stop bits
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        self.backend.set_mode(mode).inspect_err(|e| {
            error!("Failed to set UART mode {}: {}", mode.as_str(), e);
        })
    }

    pub fn set_flow_control(&self, flow_control: FlowControl) -> Result<()> {
        self.backend
            .set_flow_control(flow_control)
            .inspect_err(|e| error!("Failed to set UART flow control: {}", e))
    }

    /// Apply baudrate, mode and flow control, in that order
    ///
    /// Stops at the first setting the backend refuses.
    pub fn configure(&self, config: &UartConfig) -> Result<()> {
        self.set_baudrate(config.baudrate)?;
        self.set_mode(config.mode)?;
        self.set_flow_control(config.flow_control)
    }

    /// Transmit `bytes`
    ///
    /// Blocks until the backend accepted the whole buffer. There is no
    /// timeout on writes.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.guard.ensure_opened()?;
        if bytes.is_empty() {
            return Ok(());
        }

        self.backend.write(bytes)
    }

    /// Receive up to `size` bytes, waiting at most `timeout`
    ///
    /// The returned buffer holds only the bytes actually received.
    /// Fails with [`Error::InvalidArgument`] if a `size` byte buffer cannot
    /// be allocated.
    pub fn read(&self, size: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.guard.ensure_opened()?;

        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size).map_err(|_| {
            warn!("Failed to allocate a {} byte UART read buffer", size);
            Error::InvalidArgument
        })?;
        bytes.resize(size, 0);
        let received = self.read_into(&mut bytes, timeout)?;
        bytes.truncate(received);
        Ok(bytes)
    }

    /// Receive into `buf`, waiting at most `timeout`
    ///
    /// Returns the number of bytes received. Fails with [`Error::Timeout`]
    /// if nothing arrived; an empty `buf` succeeds immediately.
    pub fn read_into(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.guard.ensure_opened()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let received = self.backend.read(buf, timeout)?;
        if received > buf.len() {
            error!("UART backend reported {} bytes for a {} byte buffer", received, buf.len());
            return Err(Error::HardwareError);
        }
        if received == 0 {
            trace!("UART read timed out");
            return Err(Error::Timeout);
        }

        Ok(received)
    }

    /// Blocking [`embedded_io::Read`] adapter using a fixed timeout
    pub fn reader(&self, timeout: Duration) -> UartReader<'_> {
        UartReader {
            channel: self,
            timeout,
        }
    }
}

impl Device for UartChannel {
    fn guard(&self) -> &DeviceAccessGuard {
        &self.guard
    }

    fn open(&self) -> Result<()> {
        self.guard.open_with(|| {
            self.backend.open().inspect_err(|e| error!("Failed to open UART: {}", e))?;
            debug!("UART opened");
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        self.guard.close_with(|| {
            self.backend.close().inspect_err(|e| error!("Failed to close UART: {}", e))?;
            debug!("UART closed");
            Ok(())
        })
    }
}

impl Drop for UartChannel {
    fn drop(&mut self) {
        if self.guard.is_opened() {
            // Failure was already logged by close
            let _ = Device::close(self);
        }
    }
}

impl embedded_io::ErrorType for &UartChannel {
    type Error = Error;
}

impl embedded_io::Write for &UartChannel {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        UartChannel::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.guard.ensure_opened()
    }
}

/// Reader over a [`UartChannel`] returned by [`UartChannel::reader`]
pub struct UartReader<'a> {
    channel: &'a UartChannel,
    timeout: Duration,
}

impl embedded_io::ErrorType for UartReader<'_> {
    type Error = Error;
}

impl embedded_io::Read for UartReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.channel.read_into(buf, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Open,
        Close,
        Baudrate(Baudrate),
        Mode(Mode),
        FlowControl(FlowControl),
        Write(Vec<u8>),
        Read(usize),
    }

    #[derive(Default)]
    struct Script {
        calls: Vec<Call>,
        rx: VecDeque<u8>,
        fail_open: bool,
        refuse_mode: bool,
    }

    /// Backend recording every call; the test keeps a second handle
    #[derive(Clone, Default)]
    struct Scripted(Arc<Mutex<Script>>);

    impl Scripted {
        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().calls.clone()
        }

        fn feed(&self, bytes: &[u8]) {
            self.0.lock().unwrap().rx.extend(bytes);
        }
    }

    impl UartBackend for Scripted {
        fn open(&self) -> Result<()> {
            let mut script = self.0.lock().unwrap();
            script.calls.push(Call::Open);
            if script.fail_open {
                return Err(Error::HardwareError);
            }
            Ok(())
        }

        fn close(&self) -> Result<()> {
            self.0.lock().unwrap().calls.push(Call::Close);
            Ok(())
        }

        fn set_baudrate(&self, baudrate: Baudrate) -> Result<()> {
            self.0.lock().unwrap().calls.push(Call::Baudrate(baudrate));
            Ok(())
        }

        fn set_mode(&self, mode: Mode) -> Result<()> {
            let mut script = self.0.lock().unwrap();
            script.calls.push(Call::Mode(mode));
            if script.refuse_mode {
                return Err(Error::NotSupported);
            }
            Ok(())
        }

        fn set_flow_control(&self, flow_control: FlowControl) -> Result<()> {
            self.0.lock().unwrap().calls.push(Call::FlowControl(flow_control));
            Ok(())
        }

        fn write(&self, bytes: &[u8]) -> Result<()> {
            self.0.lock().unwrap().calls.push(Call::Write(bytes.to_vec()));
            Ok(())
        }

        fn read(&self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            let mut script = self.0.lock().unwrap();
            script.calls.push(Call::Read(buf.len()));

            let mut count = 0;
            while count < buf.len() {
                match script.rx.pop_front() {
                    Some(byte) => buf[count] = byte,
                    None => break,
                }
                count += 1;
            }
            Ok(count)
        }
    }

    fn opened() -> (Scripted, UartChannel) {
        let backend = Scripted::default();
        let uart = UartChannel::new(backend.clone());
        uart.open().unwrap();
        (backend, uart)
    }

    const TIMEOUT: Duration = Duration::from_millis(10);

    #[test]
    fn test_transfers_require_open() {
        let backend = Scripted::default();
        let uart = UartChannel::new(backend.clone());

        assert_eq!(uart.write(b"hello"), Err(Error::NotOpened));
        assert_eq!(uart.read(4, TIMEOUT), Err(Error::NotOpened));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_exclusive_open() {
        let (backend, uart) = opened();

        assert_eq!(uart.open(), Err(Error::AlreadyOpen));
        assert_eq!(uart.sharing_policy(), SharingPolicy::Exclusive);
        assert_eq!(backend.calls(), [Call::Open]);

        uart.close().unwrap();
        assert_eq!(uart.close(), Err(Error::NotOpened));
        assert_eq!(backend.calls(), [Call::Open, Call::Close]);
    }

    #[test]
    fn test_failed_open_stays_closed() {
        let backend = Scripted::default();
        backend.0.lock().unwrap().fail_open = true;
        let uart = UartChannel::new(backend.clone());

        assert_eq!(uart.open(), Err(Error::HardwareError));
        assert!(!uart.is_opened());
    }

    #[test]
    fn test_empty_write_skips_backend() {
        let (backend, uart) = opened();

        assert_eq!(uart.write(&[]), Ok(()));
        uart.write(b"abc").unwrap();
        assert_eq!(backend.calls(), [Call::Open, Call::Write(b"abc".to_vec())]);
    }

    #[test]
    fn test_short_read_succeeds() {
        let (backend, uart) = opened();
        backend.feed(&[1, 2, 3]);

        assert_eq!(uart.read(8, TIMEOUT), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_full_read() {
        let (backend, uart) = opened();
        backend.feed(&[9, 8, 7, 6, 5]);

        let mut buf = [0u8; 4];
        assert_eq!(uart.read_into(&mut buf, TIMEOUT), Ok(4));
        assert_eq!(buf, [9, 8, 7, 6]);
        assert_eq!(uart.read(4, TIMEOUT), Ok(vec![5]));
    }

    #[test]
    fn test_nothing_received_is_timeout() {
        let (_, uart) = opened();
        assert_eq!(uart.read(4, TIMEOUT), Err(Error::Timeout));
    }

    #[test]
    fn test_zero_size_read_skips_backend() {
        let (backend, uart) = opened();

        assert_eq!(uart.read(0, TIMEOUT), Ok(Vec::new()));
        assert_eq!(backend.calls(), [Call::Open]);
    }

    #[test]
    fn test_oversized_read_rejected() {
        let (backend, uart) = opened();

        assert_eq!(uart.read(usize::MAX, TIMEOUT), Err(Error::InvalidArgument));
        assert_eq!(backend.calls(), [Call::Open]);

        // Closed channel is reported before any allocation
        uart.close().unwrap();
        assert_eq!(uart.read(usize::MAX, TIMEOUT), Err(Error::NotOpened));
    }

    #[test]
    fn test_configure_in_order() {
        let (backend, uart) = opened();
        let config = UartConfig {
            baudrate: Baudrate::B9600,
            mode: Mode::SevenEvenOne,
            flow_control: FlowControl::RtsCts,
        };

        uart.configure(&config).unwrap();
        assert_eq!(
            backend.calls()[1..],
            [
                Call::Baudrate(Baudrate::B9600),
                Call::Mode(Mode::SevenEvenOne),
                Call::FlowControl(FlowControl::RtsCts),
            ]
        );
    }

    #[test]
    fn test_configure_stops_at_first_failure() {
        let (backend, uart) = opened();
        backend.0.lock().unwrap().refuse_mode = true;

        assert_eq!(uart.configure(&UartConfig::default()), Err(Error::NotSupported));
        assert_eq!(
            backend.calls()[1..],
            [Call::Baudrate(Baudrate::B115200), Call::Mode(Mode::EightNoneOne)]
        );
    }

    #[test]
    fn test_drop_closes_open_channel() {
        let (backend, uart) = opened();
        drop(uart);
        assert_eq!(backend.calls(), [Call::Open, Call::Close]);

        let closed = Scripted::default();
        drop(UartChannel::new(closed.clone()));
        assert!(closed.calls().is_empty());
    }

    #[test]
    fn test_embedded_io_adapters() {
        use embedded_io::{Read, Write};

        let (backend, uart) = opened();
        (&uart).write_all(b"ping").unwrap();
        assert_eq!(backend.calls()[1], Call::Write(b"ping".to_vec()));

        backend.feed(b"pong");
        let mut reader = uart.reader(TIMEOUT);
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
        assert_eq!(reader.read(&mut buf), Err(Error::Timeout));
    }

    #[test]
    fn test_baudrate_conversions() {
        assert_eq!(Baudrate::try_from(115_200), Ok(Baudrate::B115200));
        assert_eq!(Baudrate::try_from(14_400), Err(Error::InvalidArgument));
        assert_eq!(u32::from(Baudrate::B921600), 921_600);
        assert_eq!(Baudrate::default(), Baudrate::B115200);

        for baudrate in Baudrate::ALL {
            assert_eq!(Baudrate::try_from(baudrate.as_u32()), Ok(baudrate));
        }
    }

    #[test]
    fn test_mode_frame_format() {
        assert_eq!(Mode::EightNoneOne.data_bits(), DataBits::Eight);
        assert_eq!(Mode::EightNoneOne.parity(), Parity::None);
        assert_eq!(Mode::EightNoneOne.stop_bits(), StopBits::One);

        assert_eq!(Mode::SevenOddOne.data_bits(), DataBits::Seven);
        assert_eq!(Mode::SevenOddOne.parity(), Parity::Odd);
        assert_eq!(Mode::EightNoneTwo.stop_bits(), StopBits::Two);
        assert_eq!(Mode::EightEvenOne.as_str(), "8E1");
    }
}

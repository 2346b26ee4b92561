//! Simulated UART transport
//!
//! Bytes written by the channel collect in a transmit buffer; bytes fed in
//! by the test (or echoed back in loopback mode) wait in a receive queue.
//! Reads block on a condition variable until the requested count arrived
//! or the timeout expired.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use embassy_time::Duration;
use portico_hal::uart::{Baudrate, FlowControl, Mode, UartBackend, UartConfig};
use portico_hal::{Error, Result};

#[derive(Debug, Default)]
struct Line {
    running: bool,
    loopback: bool,
    config: UartConfig,
    unsupported_flow_control: Option<FlowControl>,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

#[derive(Debug, Default)]
struct Shared {
    line: Mutex<Line>,
    received: Condvar,
}

/// Simulated UART; clones share the same line
#[derive(Debug, Clone, Default)]
pub struct SimUart {
    shared: Arc<Shared>,
}

impl SimUart {
    pub fn new() -> Self {
        Self::default()
    }

    /// UART whose transmitted bytes are also received
    pub fn loopback() -> Self {
        let uart = Self::new();
        uart.lock().loopback = true;
        uart
    }

    fn lock(&self) -> MutexGuard<'_, Line> {
        self.shared.line.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes as if they arrived on the wire
    pub fn feed(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes);
        self.shared.received.notify_all();
    }

    /// Drain everything transmitted so far
    pub fn take_transmitted(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().tx)
    }

    /// Line settings last applied through the backend
    pub fn config(&self) -> UartConfig {
        self.lock().config
    }

    /// Check if the transport was opened and not closed since
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Refuse `flow_control` with [`Error::NotSupported`], like hardware
    /// lacking the required lines
    pub fn refuse_flow_control(&self, flow_control: FlowControl) {
        self.lock().unsupported_flow_control = Some(flow_control);
    }
}

impl UartBackend for SimUart {
    fn open(&self) -> Result<()> {
        let mut line = self.lock();
        line.running = true;
        line.rx.clear();
        log::debug!("Sim UART started at {} {}", line.config.baudrate.as_u32(), line.config.mode.as_str());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.lock().running = false;
        // Blocked readers must observe the close instead of their timeout
        self.shared.received.notify_all();
        Ok(())
    }

    fn set_baudrate(&self, baudrate: Baudrate) -> Result<()> {
        self.lock().config.baudrate = baudrate;
        Ok(())
    }

    fn set_mode(&self, mode: Mode) -> Result<()> {
        self.lock().config.mode = mode;
        Ok(())
    }

    fn set_flow_control(&self, flow_control: FlowControl) -> Result<()> {
        let mut line = self.lock();
        if line.unsupported_flow_control == Some(flow_control) {
            return Err(Error::NotSupported);
        }
        line.config.flow_control = flow_control;
        Ok(())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut line = self.lock();
        if !line.running {
            return Err(Error::HardwareError);
        }

        line.tx.extend_from_slice(bytes);
        if line.loopback {
            line.rx.extend(bytes);
            self.shared.received.notify_all();
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let timeout = std::time::Duration::from_micros(timeout.as_micros());
        let wanted = buf.len();

        let (mut line, _) = self
            .shared
            .received
            .wait_timeout_while(self.lock(), timeout, |line| line.running && line.rx.len() < wanted)
            .unwrap_or_else(PoisonError::into_inner);

        if !line.running {
            return Err(Error::HardwareError);
        }

        let count = wanted.min(line.rx.len());
        for (slot, byte) in buf.iter_mut().zip(line.rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_hal::{Device, UartChannel};
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_loopback_round_trip() {
        let uart = UartChannel::new(SimUart::loopback());
        uart.open().unwrap();

        uart.write(b"hello").unwrap();
        assert_eq!(uart.read(5, Duration::from_millis(50)), Ok(b"hello".to_vec()));
    }

    #[test]
    fn test_short_read_after_timeout() {
        let sim = SimUart::new();
        let uart = UartChannel::new(sim.clone());
        uart.open().unwrap();
        sim.feed(b"ab");

        let started = Instant::now();
        assert_eq!(uart.read(4, Duration::from_millis(30)), Ok(b"ab".to_vec()));
        assert!(started.elapsed() >= std::time::Duration::from_millis(30));
    }

    #[test]
    fn test_timeout_when_silent() {
        let uart = UartChannel::new(SimUart::new());
        uart.open().unwrap();

        assert_eq!(uart.read(1, Duration::from_millis(10)), Err(Error::Timeout));
    }

    #[test]
    fn test_read_wakes_on_arrival() {
        let sim = SimUart::new();
        let uart = UartChannel::new(sim.clone());
        uart.open().unwrap();

        let feeder = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            sim.feed(b"xyz");
        });

        assert_eq!(uart.read(3, Duration::from_secs(5)), Ok(b"xyz".to_vec()));
        feeder.join().unwrap();
    }

    #[test]
    fn test_close_wakes_blocked_read() {
        let sim = SimUart::new();
        sim.open().unwrap();

        let reader = {
            let sim = sim.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 4];
                let started = Instant::now();
                let result = sim.read(&mut buf, Duration::from_secs(10));
                (result, started.elapsed())
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        sim.close().unwrap();

        let (result, elapsed) = reader.join().unwrap();
        assert_eq!(result, Err(Error::HardwareError));
        assert!(elapsed < std::time::Duration::from_secs(5), "woke after {elapsed:?}");
    }

    #[test]
    fn test_transmitted_bytes_and_config() {
        let sim = SimUart::new();
        let uart = UartChannel::new(sim.clone());
        sim.refuse_flow_control(FlowControl::XonXoff);

        uart.set_baudrate(Baudrate::B57600).unwrap();
        assert_eq!(uart.set_flow_control(FlowControl::XonXoff), Err(Error::NotSupported));
        assert_eq!(sim.config().baudrate, Baudrate::B57600);
        assert_eq!(sim.config().flow_control, FlowControl::None);

        uart.open().unwrap();
        uart.write(b"AT\r\n").unwrap();
        assert_eq!(sim.take_transmitted(), b"AT\r\n");
        assert!(sim.take_transmitted().is_empty());

        drop(uart);
        assert!(!sim.is_running());
    }
}

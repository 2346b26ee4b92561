//! Board bring-up from a TOML description
//!
//! ```toml
//! [[port]]
//! name = "gpioa"
//! width = 32
//!
//! [[pin_output]]
//! name = "led"
//! port = "gpioa"
//! pin = 5
//!
//! [[uart]]
//! name = "console"
//! baudrate = 115200
//! mode = "8N1"
//!
//! [[rtc]]
//! name = "clock"
//! ```
//!
//! The whole description is validated before the first device is
//! registered, so a rejected board leaves the registry untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use portico_hal::gpio::{max_pin_for_bytes, GpioPort, PinInput, PinOutput, PortWidth};
use portico_hal::registry::{DeviceHandle, DeviceRegistry, PortHandle};
use portico_hal::uart::{Baudrate, FlowControl, Mode, UartConfig};
use portico_hal::{RtcClock, SharingPolicy, UartChannel};
use serde::Deserialize;
use thiserror::Error;

use crate::gpio::{sim_port, SimRegister};
use crate::rtc::SimRtc;
use crate::uart::SimUart;

/// Board bring-up errors
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("invalid board description: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("port '{port}': unsupported width {width}, expected 8, 16, 32 or 64")]
    UnsupportedWidth { port: String, width: u8 },

    #[error("port '{port}': {field} {value:#x} does not fit in {width} bits")]
    ValueOutOfRange {
        port: String,
        field: &'static str,
        value: u64,
        width: u8,
    },

    #[error("pin '{pin}': unknown port '{port}'")]
    UnknownPort { pin: String, port: String },

    #[error("pin '{pin}': index {index} exceeds port '{port}' maximum {max}")]
    PinOutOfRange {
        pin: String,
        port: String,
        index: u8,
        max: u8,
    },

    #[error("duplicate device name '{0}'")]
    DuplicateName(String),

    #[error("device '{name}': {source}")]
    Device {
        name: String,
        #[source]
        source: portico_hal::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortConfig {
    pub name: String,
    /// Width in bits
    pub width: u8,
    /// Initial direction, set bit = input
    #[serde(default)]
    pub direction: u64,
    /// Initial output latch
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinConfig {
    pub name: String,
    pub port: String,
    pub pin: u8,
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub sharing: SharingPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UartEntry {
    pub name: String,
    #[serde(default)]
    pub baudrate: Baudrate,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub flow_control: FlowControl,
    /// Echo transmitted bytes back to the receiver
    #[serde(default)]
    pub loopback: bool,
}

impl UartEntry {
    pub fn config(&self) -> UartConfig {
        UartConfig {
            baudrate: self.baudrate,
            mode: self.mode,
            flow_control: self.flow_control,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RtcEntry {
    pub name: String,
}

/// Parsed board description
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    #[serde(default, rename = "port")]
    pub ports: Vec<PortConfig>,
    #[serde(default, rename = "pin_output")]
    pub pin_outputs: Vec<PinConfig>,
    #[serde(default, rename = "pin_input")]
    pub pin_inputs: Vec<PinConfig>,
    #[serde(default, rename = "uart")]
    pub uarts: Vec<UartEntry>,
    #[serde(default, rename = "rtc")]
    pub rtcs: Vec<RtcEntry>,
}

fn fits(value: u64, width: u8) -> bool {
    width >= 64 || value >> width == 0
}

impl BoardConfig {
    pub fn from_toml(text: &str) -> Result<Self, BoardError> {
        Ok(toml::from_str(text)?)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.ports
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.pin_outputs.iter().map(|p| p.name.as_str()))
            .chain(self.pin_inputs.iter().map(|p| p.name.as_str()))
            .chain(self.uarts.iter().map(|u| u.name.as_str()))
            .chain(self.rtcs.iter().map(|r| r.name.as_str()))
    }

    /// Check the description against itself and against names already
    /// taken in `registry`
    pub fn validate(&self, registry: &DeviceRegistry) -> Result<(), BoardError> {
        let mut seen = BTreeSet::new();
        for name in self.names() {
            if !seen.insert(name) || registry.contains(name) {
                return Err(BoardError::DuplicateName(name.to_string()));
            }
        }

        let mut widths = BTreeMap::new();
        for port in &self.ports {
            let bytes = match port.width {
                8 | 16 | 32 | 64 => usize::from(port.width / 8),
                width => {
                    return Err(BoardError::UnsupportedWidth {
                        port: port.name.clone(),
                        width,
                    })
                }
            };

            for (field, value) in [("direction", port.direction), ("value", port.value)] {
                if !fits(value, port.width) {
                    return Err(BoardError::ValueOutOfRange {
                        port: port.name.clone(),
                        field,
                        value,
                        width: port.width,
                    });
                }
            }

            widths.insert(port.name.as_str(), max_pin_for_bytes(bytes));
        }

        for pin in self.pin_outputs.iter().chain(&self.pin_inputs) {
            let Some(&max) = widths.get(pin.port.as_str()) else {
                return Err(BoardError::UnknownPort {
                    pin: pin.name.clone(),
                    port: pin.port.clone(),
                });
            };
            if pin.pin > max {
                return Err(BoardError::PinOutOfRange {
                    pin: pin.name.clone(),
                    port: pin.port.clone(),
                    index: pin.pin,
                    max,
                });
            }
        }

        Ok(())
    }
}

/// Register handle of a simulated port, any width
#[derive(Debug, Clone)]
pub enum SimPortRegister {
    U8(SimRegister<u8>),
    U16(SimRegister<u16>),
    U32(SimRegister<u32>),
    U64(SimRegister<u64>),
}

impl SimPortRegister {
    /// Output latch widened to 64 bits
    pub fn latch(&self) -> u64 {
        match self {
            SimPortRegister::U8(r) => r.latch().to_u64(),
            SimPortRegister::U16(r) => r.latch().to_u64(),
            SimPortRegister::U32(r) => r.latch().to_u64(),
            SimPortRegister::U64(r) => r.latch(),
        }
    }

    /// Drive external levels; bits beyond the port width are ignored
    pub fn drive(&self, levels: u64) {
        match self {
            SimPortRegister::U8(r) => r.drive(levels as u8),
            SimPortRegister::U16(r) => r.drive(levels as u16),
            SimPortRegister::U32(r) => r.drive(levels as u32),
            SimPortRegister::U64(r) => r.drive(levels),
        }
    }
}

/// A brought-up simulated board
///
/// Holds the simulation side of every device; the devices themselves live
/// in the registry.
#[derive(Debug, Default)]
pub struct Board {
    ports: BTreeMap<String, SimPortRegister>,
    uarts: BTreeMap<String, SimUart>,
    rtcs: BTreeMap<String, SimRtc>,
}

fn device_error(name: &str) -> impl FnOnce(portico_hal::Error) -> BoardError + '_ {
    move |source| BoardError::Device {
        name: name.to_string(),
        source,
    }
}

fn build_port<W: PortWidth>(
    config: &PortConfig,
    direction: W,
    value: W,
) -> Result<(SimRegister<W>, Arc<dyn GpioPort<W>>), BoardError> {
    let (register, port) = sim_port(direction, value).map_err(device_error(&config.name))?;
    let port: Arc<dyn GpioPort<W>> = port;
    Ok((register, port))
}

fn build_pin(port: &PortHandle, config: &PinConfig, output: bool) -> Result<DeviceHandle, BoardError> {
    fn make<W: PortWidth>(
        port: &Arc<dyn GpioPort<W>>,
        config: &PinConfig,
        output: bool,
    ) -> portico_hal::Result<DeviceHandle> {
        let port = port.clone();
        Ok(if output {
            DeviceHandle::PinOutput(Arc::new(PinOutput::with_policy(
                port,
                config.pin,
                config.negated,
                config.sharing,
            )?))
        } else {
            DeviceHandle::PinInput(Arc::new(PinInput::with_policy(
                port,
                config.pin,
                config.negated,
                config.sharing,
            )?))
        })
    }

    let pin = match port {
        PortHandle::U8(port) => make(port, config, output),
        PortHandle::U16(port) => make(port, config, output),
        PortHandle::U32(port) => make(port, config, output),
        PortHandle::U64(port) => make(port, config, output),
    };
    pin.map_err(device_error(&config.name))
}

impl Board {
    /// Build every described device and register it in `registry`
    ///
    /// Nothing is registered if the description is invalid. If a
    /// registration still fails, the devices registered so far are removed
    /// again.
    pub fn bring_up(config: &BoardConfig, registry: &DeviceRegistry) -> Result<Self, BoardError> {
        config.validate(registry)?;

        let mut board = Board::default();
        let mut devices = Vec::new();
        let mut ports = BTreeMap::new();

        for port in &config.ports {
            // Narrowing casts are lossless, validated above
            let (register, handle) = match port.width {
                8 => {
                    let (r, p) = build_port(port, port.direction as u8, port.value as u8)?;
                    (SimPortRegister::U8(r), PortHandle::U8(p))
                }
                16 => {
                    let (r, p) = build_port(port, port.direction as u16, port.value as u16)?;
                    (SimPortRegister::U16(r), PortHandle::U16(p))
                }
                32 => {
                    let (r, p) = build_port(port, port.direction as u32, port.value as u32)?;
                    (SimPortRegister::U32(r), PortHandle::U32(p))
                }
                _ => {
                    let (r, p) = build_port(port, port.direction, port.value)?;
                    (SimPortRegister::U64(r), PortHandle::U64(p))
                }
            };

            board.ports.insert(port.name.clone(), register);
            ports.insert(port.name.as_str(), handle.clone());
            devices.push((port.name.as_str(), DeviceHandle::Port(handle)));
        }

        for (pins, output) in [(&config.pin_outputs, true), (&config.pin_inputs, false)] {
            for pin in pins {
                let port = ports.get(pin.port.as_str()).ok_or_else(|| BoardError::UnknownPort {
                    pin: pin.name.clone(),
                    port: pin.port.clone(),
                })?;
                devices.push((pin.name.as_str(), build_pin(port, pin, output)?));
            }
        }

        for entry in &config.uarts {
            let sim = if entry.loopback { SimUart::loopback() } else { SimUart::new() };
            let uart = UartChannel::new(sim.clone());
            uart.configure(&entry.config()).map_err(device_error(&entry.name))?;

            board.uarts.insert(entry.name.clone(), sim);
            devices.push((entry.name.as_str(), DeviceHandle::Uart(Arc::new(uart))));
        }

        for entry in &config.rtcs {
            let sim = SimRtc::new();
            board.rtcs.insert(entry.name.clone(), sim.clone());
            devices.push((entry.name.as_str(), DeviceHandle::Rtc(Arc::new(RtcClock::new(sim)))));
        }

        let mut registered = Vec::new();
        for (name, device) in devices {
            if let Err(e) = registry.register(name, device) {
                log::error!("Failed to register '{}': {}; rolling back", name, e);
                for name in registered {
                    let _ = registry.unregister(name);
                }
                return Err(device_error(name)(e));
            }
            registered.push(name);
        }

        log::info!("Board up with {} devices", registered.len());
        Ok(board)
    }

    /// Register handle of the port named `name`
    pub fn port(&self, name: &str) -> Option<&SimPortRegister> {
        self.ports.get(name)
    }

    /// Simulation side of the UART named `name`
    pub fn uart(&self, name: &str) -> Option<&SimUart> {
        self.uarts.get(name)
    }

    /// Simulation side of the RTC named `name`
    pub fn rtc(&self, name: &str) -> Option<&SimRtc> {
        self.rtcs.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Duration;
    use portico_hal::rtc::CalendarTime;
    use portico_hal::{Device, InputPin, OutputPin};

    const BOARD: &str = r#"
        [[port]]
        name = "gpioa"
        width = 16
        direction = 0x00F0

        [[port]]
        name = "gpiob"
        width = 8
        value = 0x81

        [[pin_output]]
        name = "led"
        port = "gpioa"
        pin = 2

        [[pin_output]]
        name = "relay"
        port = "gpiob"
        pin = 7
        negated = true

        [[pin_input]]
        name = "button"
        port = "gpioa"
        pin = 12
        sharing = "shared"

        [[uart]]
        name = "console"
        baudrate = 9600
        mode = "7E1"
        flow_control = "rts-cts"
        loopback = true

        [[rtc]]
        name = "clock"
    "#;

    fn bring_up(text: &str) -> (DeviceRegistry, Result<Board, BoardError>) {
        let registry = DeviceRegistry::new();
        let board = BoardConfig::from_toml(text).and_then(|config| Board::bring_up(&config, &registry));
        (registry, board)
    }

    #[test]
    fn test_full_board() {
        let (registry, board) = bring_up(BOARD);
        let board = board.unwrap();

        assert_eq!(
            registry.names(),
            ["button", "clock", "console", "gpioa", "gpiob", "led", "relay"]
        );
        assert_eq!(board.port("gpiob").unwrap().latch(), 0x81);

        registry.pin_output("led").unwrap().set_high().unwrap();
        assert_eq!(board.port("gpioa").unwrap().latch(), 0x0004);

        // Active-low relay: logical high clears the pin
        registry.pin_output("relay").unwrap().set_high().unwrap();
        assert_eq!(board.port("gpiob").unwrap().latch(), 0x01);

        let button = registry.pin_input("button").unwrap();
        button.open().unwrap();
        board.port("gpioa").unwrap().drive(1 << 12);
        assert_eq!(button.get(), Ok(true));
    }

    #[test]
    fn test_uart_and_rtc_devices() {
        let (registry, board) = bring_up(BOARD);
        let board = board.unwrap();

        let console = registry.uart("console").unwrap();
        assert_eq!(
            board.uart("console").unwrap().config(),
            UartConfig {
                baudrate: Baudrate::B9600,
                mode: Mode::SevenEvenOne,
                flow_control: FlowControl::RtsCts,
            }
        );

        console.open().unwrap();
        console.write(b"ok").unwrap();
        assert_eq!(console.read(2, Duration::from_millis(50)), Ok(b"ok".to_vec()));

        let clock = registry.rtc("clock").unwrap();
        clock.set_time(&CalendarTime::new(2024, 2, 29, 23, 59, 0)).unwrap();
        assert!(clock.is_initialized());
        assert!(board.rtc("clock").is_some());
    }

    #[test]
    fn test_port_width_typed_lookup() {
        let (registry, board) = bring_up(BOARD);
        board.unwrap();

        assert!(registry.port::<u16>("gpioa").is_ok());
        assert!(registry.port::<u8>("gpiob").is_ok());
        assert!(matches!(
            registry.port::<u32>("gpioa"),
            Err(portico_hal::Error::WrongDeviceType)
        ));
    }

    #[test]
    fn test_rejections_register_nothing() {
        let cases = [
            (
                "[[port]]\nname = \"p\"\nwidth = 24\n",
                "unsupported width",
            ),
            (
                "[[port]]\nname = \"p\"\nwidth = 8\nvalue = 256\n",
                "does not fit",
            ),
            (
                "[[port]]\nname = \"p\"\nwidth = 8\n[[pin_output]]\nname = \"x\"\nport = \"q\"\npin = 0\n",
                "unknown port",
            ),
            (
                "[[port]]\nname = \"p\"\nwidth = 8\n[[pin_input]]\nname = \"x\"\nport = \"p\"\npin = 8\n",
                "exceeds port",
            ),
            (
                "[[port]]\nname = \"p\"\nwidth = 8\n[[rtc]]\nname = \"p\"\n",
                "duplicate device name",
            ),
        ];

        for (text, expected) in cases {
            let (registry, board) = bring_up(text);
            let message = board.unwrap_err().to_string();
            assert!(message.contains(expected), "{message}");
            assert!(registry.is_empty());
        }
    }

    #[test]
    fn test_name_taken_in_registry() {
        let registry = DeviceRegistry::new();
        registry
            .register("clock", DeviceHandle::new_rtc(SimRtc::new()))
            .unwrap();

        let config = BoardConfig::from_toml(BOARD).unwrap();
        assert!(matches!(
            Board::bring_up(&config, &registry),
            Err(BoardError::DuplicateName(name)) if name == "clock"
        ));
        assert_eq!(registry.names(), ["clock"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            BoardConfig::from_toml("[[uart]]\nname = \"u\"\nbaudrate = 14400\n"),
            Err(BoardError::Parse(_))
        ));
        assert!(matches!(
            BoardConfig::from_toml("[[rtc]]\nname = \"r\"\ncolor = \"red\"\n"),
            Err(BoardError::Parse(_))
        ));
    }

    #[test]
    fn test_uart_defaults() {
        let config = BoardConfig::from_toml("[[uart]]\nname = \"u\"\n").unwrap();
        assert_eq!(config.uarts[0].config(), UartConfig::default());
    }
}

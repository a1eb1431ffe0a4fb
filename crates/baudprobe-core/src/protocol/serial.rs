//! Serial port handling
//!
//! Provides the [`Transport`] implementation over a real serial device.

use serialport::{ClearBuffer, SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use super::{ProtocolError, Transport};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }

    pub fn kind(&self) -> PortKind {
        PortKind::classify(&self.name).0
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Where a port sits on the board, as far as its device name tells
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortKind {
    /// USB CDC-ACM device (ttyACM*), the usual master side
    UsbAcm,
    /// USB-serial adapter (ttyUSB*)
    UsbSerial,
    /// SoC UART (ttyTHS*, ttyAMA*), the usual slave side
    Onboard,
    /// Legacy 8250/16550 UART (ttyS*)
    Legacy,
    Other,
}

impl PortKind {
    const PREFIXES: [(&'static str, PortKind); 5] = [
        ("ttyACM", PortKind::UsbAcm),
        ("ttyUSB", PortKind::UsbSerial),
        ("ttyTHS", PortKind::Onboard),
        ("ttyAMA", PortKind::Onboard),
        ("ttyS", PortKind::Legacy),
    ];

    /// Classify a device name, returning the kind and its trailing index
    fn classify(name: &str) -> (PortKind, Option<usize>) {
        let basename = name.rsplit('/').next().unwrap_or(name);
        for (prefix, kind) in Self::PREFIXES {
            if let Some(rest) = basename.strip_prefix(prefix) {
                if let Ok(num) = rest.parse::<usize>() {
                    return (kind, Some(num));
                }
            }
        }
        (PortKind::Other, None)
    }

    pub fn label(self) -> &'static str {
        match self {
            PortKind::UsbAcm => "usb-acm",
            PortKind::UsbSerial => "usb-serial",
            PortKind::Onboard => "onboard",
            PortKind::Legacy => "legacy",
            PortKind::Other => "other",
        }
    }
}

/// Sort key: USB ports, then onboard UARTs, numerically within each kind
fn port_sort_key(name: &str) -> (PortKind, usize, String) {
    let (kind, num) = PortKind::classify(name);
    (kind, num.unwrap_or(usize::MAX), name.to_string())
}

/// List available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let port = PortInfo::from(info);
        ports.entry(port.name.clone()).or_insert(port);
    }

    // SoC UARTs are often missed by enumeration. Legacy ttyS* nodes exist
    // whether or not hardware is behind them, so they are not probed here.
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            let path = format!("/dev/{}", entry.file_name().to_string_lossy());
            if matches!(
                PortKind::classify(&path).0,
                PortKind::UsbAcm | PortKind::UsbSerial | PortKind::Onboard
            ) {
                ports
                    .entry(path.clone())
                    .or_insert_with(|| PortInfo::bare(path));
            }
        }
    }

    let mut ports: Vec<PortInfo> = ports.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Serial device transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    baud: u32,
    timeout: Duration,
}

impl SerialTransport {
    /// Open `name` at `baud`, configured 8N1 without flow control
    pub fn open(name: &str, baud: u32) -> Result<Self, ProtocolError> {
        let timeout = Duration::from_millis(20);
        let mut port = serialport::new(name, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()?;
        port.clear(ClearBuffer::All)?;

        tracing::debug!(port = name, baud, "serial port opened");
        Ok(Self {
            port,
            baud,
            timeout,
        })
    }
}

impl Transport for SerialTransport {
    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), ProtocolError> {
        self.port.set_baud_rate(baud)?;
        self.port.clear(ClearBuffer::All)?;
        self.baud = baud;
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
        if timeout != self.timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }

        let mut buf = vec![0u8; max_bytes];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(Vec::new())
            }
            Err(e) => Err(ProtocolError::IoError(e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        self.port.flush()?;
        Ok(())
    }
}

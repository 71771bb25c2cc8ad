use std::io::Read;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ByteChannel, SerialLine, drain_backlog};
use crate::codec::SerialConfig;
use crate::constants::{SERIAL_TIMEOUT_MS, SERIAL_TX_WINDOW};
use crate::error::{GatewayError, GatewayResult};

pub type ComPort = String;

/// Serial line backed by the host's serial driver. Bytes the driver does not
/// take within the write timeout wait in `backlog` and count against the
/// write window, including across a reopen.
pub struct SerialPortLine {
    path: ComPort,
    serial_port: Option<Box<dyn serialport::SerialPort>>,
    backlog: Vec<u8>,
}

impl SerialPortLine {
    /// Create a closed line; `reopen` opens it.
    pub fn new(path: ComPort) -> SerialPortLine {
        SerialPortLine {
            path,
            serial_port: None,
            backlog: Vec::new(),
        }
    }

    /// Drop the port after a hard I/O error. Traffic stalls until the next
    /// reopen.
    fn fail(&mut self, what: &str, e: impl std::fmt::Debug) -> GatewayError {
        warn!("Serial {} on {} failed, closing port: {:?}", what, self.path, e);
        self.serial_port = None;
        GatewayError::Communication(format!("Serial {} failed: {:?}", what, e))
    }
}

impl ByteChannel for SerialPortLine {
    fn available(&mut self) -> GatewayResult<usize> {
        let Some(port) = self.serial_port.as_ref() else {
            return Ok(0);
        };
        match port.bytes_to_read() {
            Ok(n) => Ok(n as usize),
            Err(e) => Err(self.fail("status read", e)),
        }
    }

    fn available_for_write(&mut self) -> GatewayResult<usize> {
        let Some(port) = self.serial_port.as_mut() else {
            return Ok(0);
        };
        if let Err(e) = drain_backlog(port, &mut self.backlog) {
            return Err(self.fail("write", e));
        }
        if !self.backlog.is_empty() {
            return Ok(0);
        }
        match port.bytes_to_write() {
            Ok(queued) => Ok(SERIAL_TX_WINDOW.saturating_sub(queued as usize)),
            Err(e) => Err(self.fail("status read", e)),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> GatewayResult<usize> {
        let Some(port) = self.serial_port.as_mut() else {
            return Ok(0);
        };
        match port.read(buf) {
            Ok(n) => Ok(n),
            // Timeout error is fine, nothing arrived
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(self.fail("read", e)),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> GatewayResult<()> {
        let Some(port) = self.serial_port.as_mut() else {
            return Ok(());
        };
        self.backlog.extend_from_slice(bytes);
        match drain_backlog(port, &mut self.backlog) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail("write", e)),
        }
    }
}

impl SerialLine for SerialPortLine {
    fn reopen(&mut self, baudrate: i32, config: SerialConfig) -> GatewayResult<()> {
        // Close first so the driver releases the device before we claim it again
        if self.serial_port.take().is_some() {
            debug!("Closed serial port {}", self.path);
        }

        let baud = u32::try_from(baudrate)
            .ok()
            .filter(|b| *b > 0)
            .ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "Cannot open {} at baudrate {}",
                    self.path, baudrate
                ))
            })?;

        let serial_port = serialport::new(self.path.as_str(), baud)
            .data_bits(config.data_bits())
            .parity(config.parity())
            .stop_bits(config.stop_bits())
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()
            .map_err(|e| {
                GatewayError::Communication(format!("Failed to open {}: {:?}", self.path, e))
            })?;

        info!(
            "Opened serial port {} at {} baud, config 0x{:02x}",
            self.path,
            baud,
            config.bits()
        );
        self.serial_port = Some(serial_port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.serial_port.is_some()
    }
}

/// Pick the first USB serial adapter when no port was given
pub fn first_usb_serial_port() -> GatewayResult<ComPort> {
    let ports = serialport::available_ports().map_err(|e| {
        GatewayError::Configuration(format!("Could not get available ports. Err {:?}", e))
    })?;

    ports
        .into_iter()
        .find(|port| matches!(port.port_type, serialport::SerialPortType::UsbPort(_)))
        .map(|port| port.port_name)
        .ok_or_else(|| {
            GatewayError::Configuration(
                "Looked at all available serial ports; none is a USB serial adapter. \
                 Try specifying a serial port?"
                    .to_string(),
            )
        })
}

use std::io;

use tokio_serial::{SerialPortType, UsbPortInfo};
use tracing::debug;

/// Hardware identifiers used to locate a device among the enumerated serial
/// ports. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct DeviceQuery {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub serial_number: Option<String>,
}

impl DeviceQuery {
    pub fn with_serial_number(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: Some(serial_number.into()),
            ..Self::default()
        }
    }

    fn matches(&self, info: &UsbPortInfo) -> bool {
        if self.vendor_id.is_some_and(|vid| info.vid != vid) {
            return false;
        }
        if self.product_id.is_some_and(|pid| info.pid != pid) {
            return false;
        }
        if let Some(serial) = &self.serial_number {
            if info.serial_number.as_deref() != Some(serial.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Returns the name of the first USB serial port matching the query.
pub fn find_port(query: &DeviceQuery) -> io::Result<String> {
    let ports = tokio_serial::available_ports().map_err(io::Error::other)?;

    for port in ports {
        if let SerialPortType::UsbPort(info) = &port.port_type {
            if query.matches(info) {
                debug!("Matched device on {}", port.port_name);
                return Ok(port.port_name);
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "Cannot find a matching port",
    ))
}

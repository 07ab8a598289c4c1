use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, SerialPort, SerialPortType, StopBits};
use tokio::time::timeout;

use super::{AvailablePort, Parity, Result, SerialConfig, SerialError};

/// An open serial device as seen by the connection manager.
///
/// Every call must return promptly: waiting for data is done by the caller polling
/// [`ScaleLink::bytes_to_read`], so the handle can be shared between the reader and the
/// poller behind a plain mutex. Dropping the handle closes the device.
pub trait ScaleLink: Send {
    /// Number of received bytes waiting to be read
    fn bytes_to_read(&mut self) -> Result<u32>;

    /// Read whatever is available into `buf`
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `data` and flush
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

/// Factory for [`ScaleLink`] handles and host port enumeration
#[async_trait]
pub trait PortOpener: Send + Sync {
    /// Open the device with exactly these line settings
    async fn open(&self, config: &SerialConfig) -> Result<Box<dyn ScaleLink>>;

    /// Serial devices currently visible to the host
    fn available_ports(&self) -> Result<Vec<AvailablePort>>;
}

/// [`ScaleLink`] over a real serial device
pub struct NativeLink {
    port: Box<dyn SerialPort>,
}

impl NativeLink {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl ScaleLink for NativeLink {
    fn bytes_to_read(&mut self) -> Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(SerialError::IoError(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }
}

/// Opens host serial devices through the `serialport` crate
#[derive(Debug, Clone)]
pub struct SystemPorts {
    read_timeout: Duration,
    open_timeout: Duration,
}

impl SystemPorts {
    pub fn new(read_timeout: Duration, open_timeout: Duration) -> Self {
        Self {
            read_timeout,
            open_timeout,
        }
    }
}

impl Default for SystemPorts {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(2000))
    }
}

#[async_trait]
impl PortOpener for SystemPorts {
    async fn open(&self, config: &SerialConfig) -> Result<Box<dyn ScaleLink>> {
        let config = config.clone();
        let read_timeout = self.read_timeout;
        let open_task = tokio::task::spawn_blocking(move || open_native(&config, read_timeout));

        let port = timeout(self.open_timeout, open_task)
            .await
            .map_err(|_| SerialError::Timeout)?
            .map_err(|e| SerialError::ConnectionFailed(format!("open task failed: {}", e)))??;

        Ok(Box::new(NativeLink::new(port)))
    }

    fn available_ports(&self) -> Result<Vec<AvailablePort>> {
        list_available_ports()
    }
}

fn open_native(config: &SerialConfig, read_timeout: Duration) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(config.port.as_str(), config.baudrate)
        .data_bits(to_serialport_data_bits(config.bytesize)?)
        .stop_bits(to_serialport_stop_bits(config.stopbits)?)
        .parity(to_serialport_parity(config.parity)?)
        .timeout(read_timeout)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => SerialError::PortNotFound(config.port.clone()),
            _ => SerialError::ConnectionFailed(e.to_string()),
        })?;

    Ok(port)
}

/// Enumerate host serial devices with a human description and hardware id
pub fn list_available_ports() -> Result<Vec<AvailablePort>> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (description, hwid) = describe_port_type(&p.port_type);
            AvailablePort {
                port: p.port_name,
                description,
                hwid,
            }
        })
        .collect())
}

fn describe_port_type(port_type: &SerialPortType) -> (String, String) {
    match port_type {
        SerialPortType::UsbPort(usb_info) => {
            let description = usb_info
                .product
                .clone()
                .or_else(|| usb_info.manufacturer.clone())
                .unwrap_or_else(|| "USB Serial Device".to_string());
            let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb_info.vid, usb_info.pid);
            if let Some(serial) = &usb_info.serial_number {
                hwid.push_str(&format!(" SER={}", serial));
            }
            (description, hwid)
        }
        SerialPortType::PciPort => ("PCI Serial Port".to_string(), "PCI".to_string()),
        SerialPortType::BluetoothPort => ("Bluetooth Serial Port".to_string(), "BLUETOOTH".to_string()),
        SerialPortType::Unknown => ("n/a".to_string(), "n/a".to_string()),
    }
}

fn to_serialport_data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(SerialError::ConnectionFailed(format!("invalid byte size {}", other))),
    }
}

fn to_serialport_stop_bits(bits: u8) -> Result<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(SerialError::ConnectionFailed(format!("invalid stop bits {}", other))),
    }
}

// serialport has no mark/space parity; such candidates fail like any other unopenable config.
fn to_serialport_parity(parity: Parity) -> Result<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Mark | Parity::Space => Err(SerialError::UnsupportedParity(parity)),
    }
}

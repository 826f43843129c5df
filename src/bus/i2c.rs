use super::{I2cTransport, TransportError};
use async_trait::async_trait;
#[cfg(target_os = "linux")]
use i2cdev::core::I2CDevice;
#[cfg(target_os = "linux")]
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
#[cfg(target_os = "linux")]
use tracing::info;

#[cfg(target_os = "linux")]
const ENXIO: i32 = 6;
#[cfg(target_os = "linux")]
const EAGAIN: i32 = 11;
#[cfg(target_os = "linux")]
const EBUSY: i32 = 16;
#[cfg(target_os = "linux")]
const ETIMEDOUT: i32 = 110;
#[cfg(target_os = "linux")]
const EREMOTEIO: i32 = 121;

/// Map a Linux i2c-dev failure onto the transport taxonomy
#[cfg(target_os = "linux")]
fn map_linux_error(address: u8, err: LinuxI2CError) -> TransportError {
    let err: std::io::Error = err.into();
    match err.raw_os_error() {
        Some(ENXIO) | Some(EREMOTEIO) => TransportError::AddressNack { address },
        Some(EAGAIN) | Some(EBUSY) | Some(ETIMEDOUT) => TransportError::Busy,
        _ => TransportError::Io(err.to_string()),
    }
}

/// I2C bus backed by a Linux `/dev/i2c-N` character device
#[cfg(target_os = "linux")]
pub struct LinuxI2cBus {
    path: String,
    device: LinuxI2CDevice,
}

#[cfg(not(target_os = "linux"))]
pub struct LinuxI2cBus {
    path: String,
}

impl LinuxI2cBus {
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(target_os = "linux")]
impl LinuxI2cBus {
    pub fn new(path: &str) -> Result<Self, TransportError> {
        let device = LinuxI2CDevice::new(path, 0)
            .map_err(|e| TransportError::Io(format!("{}: {}", path, e)))?;
        Ok(Self { path: path.to_string(), device })
    }

    fn select(&mut self, address: u8) -> Result<(), TransportError> {
        self.device
            .set_slave_address(address as u16)
            .map_err(|e| map_linux_error(address, e))
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl I2cTransport for LinuxI2cBus {
    async fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportError> {
        self.select(address)?;
        let result = if bytes.is_empty() {
            // i2c-dev cannot issue a zero-length plain write, SMBus quick does the same on the wire
            self.device.smbus_write_quick(false)
        } else {
            self.device.write(bytes)
        };
        result.map_err(|e| map_linux_error(address, e))
    }

    async fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        self.select(address)?;
        self.device.read(buf).map_err(|e| map_linux_error(address, e))
    }

    async fn reset(&mut self) -> Result<(), TransportError> {
        info!("[bus] reopening {}", self.path);
        self.device = LinuxI2CDevice::new(&self.path, 0)
            .map_err(|e| TransportError::Io(format!("{}: {}", self.path, e)))?;
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl LinuxI2cBus {
    pub fn new(path: &str) -> Result<Self, TransportError> {
        tracing::warn!("[bus] {} unavailable: I2C is only supported on Linux", path);
        Err(TransportError::Unsupported)
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl I2cTransport for LinuxI2cBus {
    async fn write(&mut self, _address: u8, _bytes: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    async fn read(&mut self, _address: u8, _buf: &mut [u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    async fn reset(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }
}

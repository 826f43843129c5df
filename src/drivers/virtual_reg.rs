//! Virtual register access shared by the AS726x and AS7265x families.
//!
//! These parts expose three physical registers. Every real (virtual)
//! register is reached through a TX_VALID/RX_VALID handshake on them.

use crate::bus::I2cTransport;
use crate::errors::{DriverError, DriverResult, TransportError};
use std::time::Duration;
use tokio::time::sleep;

const STATUS_REG: u8 = 0x00;
const WRITE_REG: u8 = 0x01;
const READ_REG: u8 = 0x02;

const TX_VALID: u8 = 0x02;
const RX_VALID: u8 = 0x01;

const WRITE_FLAG: u8 = 0x80;

/// Handshake and data-ready polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub interval: Duration,
    pub handshake_polls: u32,
    pub measurement_polls: u32,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5),
            handshake_polls: 200,
            measurement_polls: 600,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VirtualRegisters {
    address: u8,
    device: &'static str,
    timing: PollTiming,
}

impl VirtualRegisters {
    pub fn new(address: u8, device: &'static str, timing: PollTiming) -> Self {
        Self { address, device, timing }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn device(&self) -> &'static str {
        self.device
    }

    pub fn timing(&self) -> PollTiming {
        self.timing
    }

    fn transport(&self, source: TransportError) -> DriverError {
        DriverError::Transport { device: self.device, source }
    }

    async fn status(&self, bus: &mut dyn I2cTransport) -> DriverResult<u8> {
        bus.read_register(self.address, STATUS_REG)
            .await
            .map_err(|e| self.transport(e))
    }

    async fn wait_status(
        &self,
        bus: &mut dyn I2cTransport,
        bit: u8,
        want_set: bool,
        what: &'static str,
    ) -> DriverResult<()> {
        for _ in 0..self.timing.handshake_polls {
            let status = self.status(bus).await?;
            if (status & bit != 0) == want_set {
                return Ok(());
            }
            sleep(self.timing.interval).await;
        }
        Err(DriverError::Timeout { device: self.device, what })
    }

    pub async fn read(&self, bus: &mut dyn I2cTransport, reg: u8) -> DriverResult<u8> {
        // Drop a stale byte left in the read register
        if self.status(bus).await? & RX_VALID != 0 {
            bus.read_register(self.address, READ_REG)
                .await
                .map_err(|e| self.transport(e))?;
        }

        self.wait_status(bus, TX_VALID, false, "write buffer").await?;
        bus.write_register(self.address, WRITE_REG, reg)
            .await
            .map_err(|e| self.transport(e))?;

        self.wait_status(bus, RX_VALID, true, "read data").await?;
        bus.read_register(self.address, READ_REG)
            .await
            .map_err(|e| self.transport(e))
    }

    pub async fn write(&self, bus: &mut dyn I2cTransport, reg: u8, value: u8) -> DriverResult<()> {
        self.wait_status(bus, TX_VALID, false, "write buffer").await?;
        bus.write_register(self.address, WRITE_REG, reg | WRITE_FLAG)
            .await
            .map_err(|e| self.transport(e))?;

        self.wait_status(bus, TX_VALID, false, "write buffer").await?;
        bus.write_register(self.address, WRITE_REG, value)
            .await
            .map_err(|e| self.transport(e))
    }

    /// Read-modify-write: clear `clear`, then set `set`
    pub async fn modify(&self, bus: &mut dyn I2cTransport, reg: u8, clear: u8, set: u8) -> DriverResult<()> {
        let value = self.read(bus, reg).await?;
        self.write(bus, reg, (value & !clear) | set).await
    }

    /// Big-endian IEEE-754 value spread over four virtual registers
    pub async fn read_f32(&self, bus: &mut dyn I2cTransport, reg: u8) -> DriverResult<f32> {
        let mut bytes = [0u8; 4];
        for (offset, byte) in bytes.iter_mut().enumerate() {
            *byte = self.read(bus, reg + offset as u8).await?;
        }
        Ok(f32::from_be_bytes(bytes))
    }

    /// Poll `reg` until `bit` is set, using the measurement budget
    pub async fn wait_for_bit(
        &self,
        bus: &mut dyn I2cTransport,
        reg: u8,
        bit: u8,
        what: &'static str,
    ) -> DriverResult<()> {
        for _ in 0..self.timing.measurement_polls {
            if self.read(bus, reg).await? & bit != 0 {
                return Ok(());
            }
            sleep(self.timing.interval).await;
        }
        Err(DriverError::Timeout { device: self.device, what })
    }
}

pub mod gate;
pub mod i2c;
pub mod serial;

use async_trait::async_trait;

pub use crate::errors::TransportError;
pub use gate::probe_address;

/// Byte-level I2C transport used by every other layer.
///
/// Implementations block until the transaction finishes or the underlying
/// controller gives up; callers never interleave two transactions.
#[async_trait]
pub trait I2cTransport: Send {
    /// Write `bytes` to `address`. An empty slice is the zero-length probe.
    async fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read `buf.len()` bytes from `address`.
    async fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Tear the transport down and bring it back up.
    async fn reset(&mut self) -> Result<(), TransportError>;

    async fn write_register(&mut self, address: u8, reg: u8, value: u8) -> Result<(), TransportError> {
        self.write(address, &[reg, value]).await
    }

    async fn write_register_block(
        &mut self,
        address: u8,
        reg: u8,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(bytes);
        self.write(address, &frame).await
    }

    async fn read_register(&mut self, address: u8, reg: u8) -> Result<u8, TransportError> {
        let mut buf = [0u8; 1];
        self.read_register_block(address, reg, &mut buf).await?;
        Ok(buf[0])
    }

    async fn read_register_block(
        &mut self,
        address: u8,
        reg: u8,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        self.write(address, &[reg]).await?;
        self.read(address, buf).await
    }
}

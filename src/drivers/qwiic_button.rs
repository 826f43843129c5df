use super::ButtonAccessory;
use crate::bus::{probe_address, I2cTransport};
use crate::errors::{DriverError, DriverResult, TransportError};
use async_trait::async_trait;

pub const BUTTON_ADDR: u8 = 0x6F;
pub const BUTTON_DEV_ID: u8 = 0x5D;

// Register addresses
const ID: u8 = 0x00;
const BUTTON_STATUS: u8 = 0x03;
const BUTTON_DEBOUNCE_TIME: u8 = 0x05;
const LED_BRIGHTNESS: u8 = 0x19;
const LED_PULSE_GRANULARITY: u8 = 0x1A;
const LED_PULSE_CYCLE_TIME: u8 = 0x1B;
const LED_PULSE_OFF_TIME: u8 = 0x1D;

// BUTTON_STATUS bits
const EVENT_AVAILABLE: u8 = 1 << 0;
const HAS_BEEN_CLICKED: u8 = 1 << 1;
const IS_PRESSED: u8 = 1 << 2;

/// Qwiic push button with a dimmable LED
pub struct QwiicButton {
    address: u8,
}

impl QwiicButton {
    pub fn new(address: u8) -> Self {
        Self { address }
    }

    fn transport(source: TransportError) -> DriverError {
        DriverError::Transport { device: "QwiicButton", source }
    }

    async fn led_config(
        &mut self,
        bus: &mut dyn I2cTransport,
        brightness: u8,
        cycle_time: u16,
        off_time: u16,
    ) -> DriverResult<()> {
        bus.write_register(self.address, LED_BRIGHTNESS, brightness).await.map_err(Self::transport)?;
        bus.write_register(self.address, LED_PULSE_GRANULARITY, 1).await.map_err(Self::transport)?;
        bus.write_register_block(self.address, LED_PULSE_CYCLE_TIME, &cycle_time.to_le_bytes())
            .await
            .map_err(Self::transport)?;
        bus.write_register_block(self.address, LED_PULSE_OFF_TIME, &off_time.to_le_bytes())
            .await
            .map_err(Self::transport)
    }
}

#[async_trait]
impl ButtonAccessory for QwiicButton {
    async fn is_connected(&mut self, bus: &mut dyn I2cTransport) -> bool {
        if !probe_address(bus, self.address).await {
            return false;
        }
        matches!(bus.read_register(self.address, ID).await, Ok(BUTTON_DEV_ID))
    }

    async fn has_been_clicked(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<bool> {
        let status = bus.read_register(self.address, BUTTON_STATUS).await.map_err(Self::transport)?;
        Ok(status & HAS_BEEN_CLICKED != 0)
    }

    async fn clear_event_bits(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        let status = bus.read_register(self.address, BUTTON_STATUS).await.map_err(Self::transport)?;
        let cleared = status & !(EVENT_AVAILABLE | HAS_BEEN_CLICKED | IS_PRESSED);
        bus.write_register(self.address, BUTTON_STATUS, cleared).await.map_err(Self::transport)
    }

    async fn set_debounce_time(&mut self, bus: &mut dyn I2cTransport, ms: u16) -> DriverResult<()> {
        bus.write_register_block(self.address, BUTTON_DEBOUNCE_TIME, &ms.to_le_bytes())
            .await
            .map_err(Self::transport)
    }

    async fn led_on(&mut self, bus: &mut dyn I2cTransport, level: u8) -> DriverResult<()> {
        self.led_config(bus, level, 0, 0).await
    }

    async fn led_off(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        self.led_config(bus, 0, 0, 0).await
    }
}

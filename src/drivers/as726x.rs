use super::virtual_reg::{PollTiming, VirtualRegisters};
use super::SpectralSensor;
use crate::bus::I2cTransport;
use crate::errors::{DriverError, DriverResult};
use crate::topology::{AS7262_CODE, AS7263_CODE};
use async_trait::async_trait;
use tracing::debug;

pub const AS726X_ADDR: u8 = 0x49;

// Virtual register addresses
const HW_VERSION: u8 = 0x00;
const CONTROL_SETUP: u8 = 0x04;
const INT_T: u8 = 0x05;
const LED_CONTROL: u8 = 0x07;
const CAL_START: u8 = 0x14;

const DATA_RDY: u8 = 1 << 1;
const MODE_MASK: u8 = 0b0000_1100;
const GAIN_MASK: u8 = 0b0011_0000;
const BULB_ENABLE: u8 = 1 << 3;
const BULB_CURRENT_MASK: u8 = 0b0011_0000;
const INDICATOR_ENABLE: u8 = 1 << 0;

/// One-shot conversion of all six bands
pub const MODE_ONE_SHOT_ALL: u8 = 3;

/// (band letter, wavelength nm) in register order
pub const AS7262_BANDS: [(char, u16); 6] = [
    ('V', 450),
    ('B', 500),
    ('G', 550),
    ('Y', 570),
    ('O', 600),
    ('R', 650),
];

pub const AS7263_BANDS: [(char, u16); 6] = [
    ('R', 610),
    ('S', 680),
    ('T', 730),
    ('U', 760),
    ('V', 810),
    ('W', 860),
];

/// AS7262 / AS7263 six-band spectral sensor
pub struct As726x {
    regs: VirtualRegisters,
}

impl As726x {
    pub fn new(address: u8, timing: PollTiming) -> Self {
        Self {
            regs: VirtualRegisters::new(address, "AS726x", timing),
        }
    }

    pub async fn set_gain(&mut self, bus: &mut dyn I2cTransport, gain: u8) -> DriverResult<()> {
        self.regs
            .modify(bus, CONTROL_SETUP, GAIN_MASK, (gain & 0b11) << 4)
            .await
    }

    pub async fn disable_indicator(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        self.regs.modify(bus, LED_CONTROL, INDICATOR_ENABLE, 0).await
    }
}

#[async_trait]
impl SpectralSensor for As726x {
    async fn begin(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        let version = self.version_id(bus).await?;
        if version != AS7262_CODE && version != AS7263_CODE {
            return Err(DriverError::NotDetected { device: self.regs.device(), version });
        }

        self.set_bulb_current(bus, 0).await?;
        self.disable_bulb(bus).await?;
        self.disable_indicator(bus).await?;
        self.set_integration_time(bus, 50).await?;
        self.set_gain(bus, 3).await?;
        self.set_measurement_mode(bus, MODE_ONE_SHOT_ALL).await?;
        debug!("[AS726x] begin ok, version {:#04x}", version);
        Ok(())
    }

    async fn version_id(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<u8> {
        self.regs.read(bus, HW_VERSION).await
    }

    async fn set_integration_time(&mut self, bus: &mut dyn I2cTransport, value: u8) -> DriverResult<()> {
        self.regs.write(bus, INT_T, value).await
    }

    async fn set_measurement_mode(&mut self, bus: &mut dyn I2cTransport, mode: u8) -> DriverResult<()> {
        self.regs
            .modify(bus, CONTROL_SETUP, MODE_MASK, (mode & 0b11) << 2)
            .await
    }

    async fn set_bulb_current(&mut self, bus: &mut dyn I2cTransport, level: u8) -> DriverResult<()> {
        self.regs
            .modify(bus, LED_CONTROL, BULB_CURRENT_MASK, (level & 0b11) << 4)
            .await
    }

    async fn enable_bulb(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        self.regs.modify(bus, LED_CONTROL, 0, BULB_ENABLE).await
    }

    async fn disable_bulb(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        self.regs.modify(bus, LED_CONTROL, BULB_ENABLE, 0).await
    }

    async fn take_measurement(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        self.regs.modify(bus, CONTROL_SETUP, DATA_RDY, 0).await?;
        self.set_measurement_mode(bus, MODE_ONE_SHOT_ALL).await?;
        self.regs
            .wait_for_bit(bus, CONTROL_SETUP, DATA_RDY, "data ready")
            .await
    }

    async fn calibrated_channels(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<[f32; 6]> {
        let mut values = [0f32; 6];
        for (i, value) in values.iter_mut().enumerate() {
            *value = self.regs.read_f32(bus, CAL_START + 4 * i as u8).await?;
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBus, SimSpectral};

    fn bus_with(sensor: SimSpectral) -> SimBus {
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, sensor);
        bus
    }

    #[tokio::test]
    async fn test_begin_accepts_six_band_parts() {
        for sensor in [SimSpectral::as7262(), SimSpectral::as7263()] {
            let mut bus = bus_with(sensor);
            let mut driver = As726x::new(AS726X_ADDR, PollTiming::default());
            driver.begin(&mut bus).await.unwrap();

            let sim = bus.spectral(None, AS726X_ADDR).unwrap();
            assert_eq!(sim.register(0, INT_T), 50);
            assert_eq!(sim.register(0, LED_CONTROL) & BULB_ENABLE, 0);
        }
    }

    #[tokio::test]
    async fn test_begin_rejects_triad_but_version_still_readable() {
        let mut bus = bus_with(SimSpectral::as7265x());
        let mut driver = As726x::new(AS726X_ADDR, PollTiming::default());

        assert_eq!(
            driver.begin(&mut bus).await,
            Err(DriverError::NotDetected { device: "AS726x", version: 0x41 })
        );
        assert_eq!(driver.version_id(&mut bus).await.unwrap(), 0x41);
    }

    #[tokio::test]
    async fn test_bulb_and_current_bits() {
        let mut bus = bus_with(SimSpectral::as7262());
        let mut driver = As726x::new(AS726X_ADDR, PollTiming::default());

        driver.set_bulb_current(&mut bus, 0b11).await.unwrap();
        driver.enable_bulb(&mut bus).await.unwrap();
        let led = bus.spectral(None, AS726X_ADDR).unwrap().register(0, LED_CONTROL);
        assert_eq!(led & BULB_ENABLE, BULB_ENABLE);
        assert_eq!(led & BULB_CURRENT_MASK, 0b0011_0000);

        driver.disable_bulb(&mut bus).await.unwrap();
        let led = bus.spectral(None, AS726X_ADDR).unwrap().register(0, LED_CONTROL);
        assert_eq!(led & BULB_ENABLE, 0);
    }

    #[tokio::test]
    async fn test_measurement_reads_calibrated_values() {
        let mut sensor = SimSpectral::as7262();
        for i in 0..6 {
            sensor.set_calibrated(0, i, 100.0 + i as f32);
        }
        let mut bus = bus_with(sensor);
        let mut driver = As726x::new(AS726X_ADDR, PollTiming::default());

        driver.take_measurement(&mut bus).await.unwrap();
        let values = driver.calibrated_channels(&mut bus).await.unwrap();
        assert_eq!(values, [100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
    }
}

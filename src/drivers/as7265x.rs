use super::virtual_reg::{PollTiming, VirtualRegisters};
use super::TriadSpectralSensor;
use crate::bus::I2cTransport;
use crate::errors::{DriverError, DriverResult};
use crate::topology::Bulb;
use async_trait::async_trait;
use tracing::debug;

// Virtual register addresses
const HW_VERSION_HIGH: u8 = 0x00;
const CONFIG: u8 = 0x04;
const INTEGRATION_TIME: u8 = 0x05;
const LED_CONFIG: u8 = 0x07;
const DEV_SELECT_CONTROL: u8 = 0x4F;

const DATA_RDY: u8 = 1 << 1;
const MODE_MASK: u8 = 0b0000_1100;
const GAIN_MASK: u8 = 0b0011_0000;
const BULB_ENABLE: u8 = 1 << 3;
const BULB_CURRENT_MASK: u8 = 0b0011_0000;
const INDICATOR_ENABLE: u8 = 1 << 0;
const SLAVES_PRESENT: u8 = 0b0011_0000;

const MODE_6CHAN_CONTINUOUS: u8 = 2;
const MODE_6CHAN_ONE_SHOT: u8 = 3;
const GAIN_64X: u8 = 0b11;

/// Lowest bulb current limit code. Codes 1-3 double it each step up to 100 mA.
pub const LED_CURRENT_LIMIT_12_5MA: u8 = 0b00;

/// The three dies of the chipset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Device {
    Nir = 0,
    Visible = 1,
    Uv = 2,
}

impl Device {
    /// The die each bulb is wired to
    pub fn for_bulb(bulb: Bulb) -> Self {
        match bulb {
            Bulb::White => Device::Nir,
            Bulb::Ir => Device::Visible,
            Bulb::Uv => Device::Uv,
        }
    }
}

/// (band letter, wavelength nm, die, calibrated register), sorted by wavelength
pub const AS7265X_BANDS: [(char, u16, Device, u8); 18] = [
    ('A', 410, Device::Uv, 0x14),
    ('B', 435, Device::Uv, 0x18),
    ('C', 460, Device::Uv, 0x1C),
    ('D', 485, Device::Uv, 0x20),
    ('E', 510, Device::Uv, 0x24),
    ('F', 535, Device::Uv, 0x28),
    ('G', 560, Device::Visible, 0x14),
    ('H', 585, Device::Visible, 0x18),
    ('R', 610, Device::Nir, 0x14),
    ('I', 645, Device::Visible, 0x1C),
    ('S', 680, Device::Nir, 0x18),
    ('J', 705, Device::Visible, 0x20),
    ('T', 730, Device::Nir, 0x1C),
    ('U', 760, Device::Nir, 0x20),
    ('V', 810, Device::Nir, 0x24),
    ('W', 860, Device::Nir, 0x28),
    ('K', 900, Device::Visible, 0x24),
    ('L', 940, Device::Visible, 0x28),
];

/// AS7265x triad: NIR master with visible and UV slaves behind one address
pub struct As7265x {
    regs: VirtualRegisters,
}

impl As7265x {
    pub fn new(address: u8, timing: PollTiming) -> Self {
        Self {
            regs: VirtualRegisters::new(address, "AS7265x", timing),
        }
    }

    async fn select_device(&mut self, bus: &mut dyn I2cTransport, device: Device) -> DriverResult<()> {
        self.regs.write(bus, DEV_SELECT_CONTROL, device as u8).await
    }

    async fn set_measurement_mode(&mut self, bus: &mut dyn I2cTransport, mode: u8) -> DriverResult<()> {
        self.regs.modify(bus, CONFIG, MODE_MASK, (mode & 0b11) << 2).await
    }
}

#[async_trait]
impl TriadSpectralSensor for As7265x {
    async fn begin(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        let select = self.regs.read(bus, DEV_SELECT_CONTROL).await?;
        if select & SLAVES_PRESENT != SLAVES_PRESENT {
            return Err(DriverError::NotDetected { device: self.regs.device(), version: select });
        }

        for bulb in Bulb::ALL {
            self.set_bulb_current_limit(bus, LED_CURRENT_LIMIT_12_5MA, bulb).await?;
            self.disable_bulb(bus, bulb).await?;
        }
        self.disable_indicator(bus).await?;
        self.set_integration_cycles(bus, 49).await?;
        self.regs.modify(bus, CONFIG, GAIN_MASK, GAIN_64X << 4).await?;
        self.set_measurement_mode(bus, MODE_6CHAN_CONTINUOUS).await?;
        debug!("[AS7265x] begin ok, slaves {:#04x}", select & SLAVES_PRESENT);
        Ok(())
    }

    async fn version_id(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<u8> {
        self.regs.read(bus, HW_VERSION_HIGH).await
    }

    async fn set_bulb_current_limit(&mut self, bus: &mut dyn I2cTransport, level: u8, bulb: Bulb) -> DriverResult<()> {
        self.select_device(bus, Device::for_bulb(bulb)).await?;
        self.regs
            .modify(bus, LED_CONFIG, BULB_CURRENT_MASK, (level & 0b11) << 4)
            .await
    }

    async fn disable_indicator(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        self.select_device(bus, Device::Nir).await?;
        self.regs.modify(bus, LED_CONFIG, INDICATOR_ENABLE, 0).await
    }

    async fn set_integration_cycles(&mut self, bus: &mut dyn I2cTransport, cycles: u8) -> DriverResult<()> {
        self.regs.write(bus, INTEGRATION_TIME, cycles).await
    }

    async fn enable_bulb(&mut self, bus: &mut dyn I2cTransport, bulb: Bulb) -> DriverResult<()> {
        self.select_device(bus, Device::for_bulb(bulb)).await?;
        self.regs.modify(bus, LED_CONFIG, 0, BULB_ENABLE).await
    }

    async fn disable_bulb(&mut self, bus: &mut dyn I2cTransport, bulb: Bulb) -> DriverResult<()> {
        self.select_device(bus, Device::for_bulb(bulb)).await?;
        self.regs.modify(bus, LED_CONFIG, BULB_ENABLE, 0).await
    }

    async fn take_measurement(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()> {
        self.regs.modify(bus, CONFIG, DATA_RDY, 0).await?;
        self.set_measurement_mode(bus, MODE_6CHAN_ONE_SHOT).await?;
        self.regs.wait_for_bit(bus, CONFIG, DATA_RDY, "data ready").await
    }

    async fn calibrated_channels(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<[f32; 18]> {
        let mut values = [0f32; 18];
        let mut selected = None;
        for (value, (_, _, device, reg)) in values.iter_mut().zip(AS7265X_BANDS.iter()) {
            if selected != Some(*device) {
                self.select_device(bus, *device).await?;
                selected = Some(*device);
            }
            *value = self.regs.read_f32(bus, *reg).await?;
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::as726x::AS726X_ADDR;
    use crate::sim::{SimBus, SimSpectral};

    fn triad_bus() -> SimBus {
        let mut sensor = SimSpectral::as7265x();
        for (bank, base) in [(0usize, 600.0f32), (1, 500.0), (2, 400.0)] {
            for i in 0..6 {
                sensor.set_calibrated(bank, i, base + i as f32);
            }
        }
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, sensor);
        bus
    }

    #[tokio::test]
    async fn test_begin_and_version() {
        let mut bus = triad_bus();
        let mut driver = As7265x::new(AS726X_ADDR, PollTiming::default());

        driver.begin(&mut bus).await.unwrap();
        assert_eq!(driver.version_id(&mut bus).await.unwrap(), 0x41);
        assert_eq!(bus.spectral(None, AS726X_ADDR).unwrap().register(0, INTEGRATION_TIME), 49);
    }

    #[tokio::test]
    async fn test_begin_fails_on_six_band_part() {
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, SimSpectral::as7262());
        let mut driver = As7265x::new(AS726X_ADDR, PollTiming::default());

        assert!(matches!(
            driver.begin(&mut bus).await,
            Err(DriverError::NotDetected { device: "AS7265x", .. })
        ));
    }

    #[tokio::test]
    async fn test_begin_requires_both_slaves() {
        for bits in [0b0000_0000u8, 0b0001_0000, 0b0010_0000] {
            let mut sensor = SimSpectral::as7265x();
            sensor.set_slaves_present(bits);
            let mut bus = SimBus::direct();
            bus.attach_direct(AS726X_ADDR, sensor);
            let mut driver = As7265x::new(AS726X_ADDR, PollTiming::default());

            assert!(
                matches!(driver.begin(&mut bus).await, Err(DriverError::NotDetected { .. })),
                "slave bits {:#04x} accepted",
                bits
            );
        }
    }

    #[tokio::test]
    async fn test_bulbs_land_on_their_die() {
        let mut bus = triad_bus();
        let mut driver = As7265x::new(AS726X_ADDR, PollTiming::default());

        driver.enable_bulb(&mut bus, Bulb::Uv).await.unwrap();
        driver.set_bulb_current_limit(&mut bus, 0b10, Bulb::Ir).await.unwrap();

        let sim = bus.spectral(None, AS726X_ADDR).unwrap();
        assert_eq!(sim.register(Device::Uv as usize, LED_CONFIG) & BULB_ENABLE, BULB_ENABLE);
        assert_eq!(sim.register(Device::Nir as usize, LED_CONFIG) & BULB_ENABLE, 0);
        assert_eq!(sim.register(Device::Visible as usize, LED_CONFIG) & BULB_CURRENT_MASK, 0b0010_0000);
    }

    #[tokio::test]
    async fn test_channels_sorted_by_wavelength() {
        let mut bus = triad_bus();
        let mut driver = As7265x::new(AS726X_ADDR, PollTiming::default());

        driver.take_measurement(&mut bus).await.unwrap();
        let values = driver.calibrated_channels(&mut bus).await.unwrap();

        // A..F from the UV die, then G, H, and R from visible/NIR
        assert_eq!(&values[..6], &[400.0, 401.0, 402.0, 403.0, 404.0, 405.0]);
        assert_eq!(values[6], 500.0);
        assert_eq!(values[8], 600.0);
        assert_eq!(values[17], 505.0);
        assert!(AS7265X_BANDS.windows(2).all(|w| w[0].1 < w[1].1));
    }
}

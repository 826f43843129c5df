pub mod as7265x;
pub mod as726x;
pub mod qwiic_button;
pub mod virtual_reg;

use crate::bus::I2cTransport;
use crate::errors::DriverResult;
use crate::topology::Bulb;
use async_trait::async_trait;

pub use as7265x::As7265x;
pub use as726x::As726x;
pub use qwiic_button::QwiicButton;
pub use virtual_reg::PollTiming;

/// Six-band spectral sensor (AS7262 / AS7263)
///
/// One instance is shared by every channel; the caller selects the mux port
/// before each call and hands in the bus.
#[async_trait]
pub trait SpectralSensor: Send {
    /// Bring the sensor to a known state. May fail on hardware that still
    /// answers [`SpectralSensor::version_id`].
    async fn begin(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
    async fn version_id(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<u8>;
    async fn set_integration_time(&mut self, bus: &mut dyn I2cTransport, value: u8) -> DriverResult<()>;
    async fn set_measurement_mode(&mut self, bus: &mut dyn I2cTransport, mode: u8) -> DriverResult<()>;
    async fn set_bulb_current(&mut self, bus: &mut dyn I2cTransport, level: u8) -> DriverResult<()>;
    async fn enable_bulb(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
    async fn disable_bulb(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
    /// Start a one-shot conversion and wait for the result
    async fn take_measurement(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
    /// Calibrated values in register order (shortest wavelength first)
    async fn calibrated_channels(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<[f32; 6]>;
}

/// Eighteen-band triad spectral sensor (AS7265x)
#[async_trait]
pub trait TriadSpectralSensor: Send {
    async fn begin(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
    async fn version_id(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<u8>;
    async fn set_bulb_current_limit(&mut self, bus: &mut dyn I2cTransport, level: u8, bulb: Bulb) -> DriverResult<()>;
    async fn disable_indicator(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
    async fn set_integration_cycles(&mut self, bus: &mut dyn I2cTransport, cycles: u8) -> DriverResult<()>;
    async fn enable_bulb(&mut self, bus: &mut dyn I2cTransport, bulb: Bulb) -> DriverResult<()>;
    async fn disable_bulb(&mut self, bus: &mut dyn I2cTransport, bulb: Bulb) -> DriverResult<()>;
    async fn take_measurement(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
    /// Calibrated values sorted by wavelength, 410 nm to 940 nm
    async fn calibrated_channels(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<[f32; 18]>;
}

/// Push button accessory with an indicator LED
#[async_trait]
pub trait ButtonAccessory: Send {
    async fn is_connected(&mut self, bus: &mut dyn I2cTransport) -> bool;
    async fn has_been_clicked(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<bool>;
    async fn clear_event_bits(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
    async fn set_debounce_time(&mut self, bus: &mut dyn I2cTransport, ms: u16) -> DriverResult<()>;
    async fn led_on(&mut self, bus: &mut dyn I2cTransport, level: u8) -> DriverResult<()>;
    async fn led_off(&mut self, bus: &mut dyn I2cTransport) -> DriverResult<()>;
}

/// The shared driver instances the hub talks through
pub struct Peripherals {
    pub spectral: Box<dyn SpectralSensor>,
    pub triad: Box<dyn TriadSpectralSensor>,
    pub button: Box<dyn ButtonAccessory>,
}

impl Peripherals {
    /// Register-level drivers at the given sensor and button addresses
    pub fn new(sensor_address: u8, button_address: u8, timing: PollTiming) -> Self {
        Self {
            spectral: Box::new(As726x::new(sensor_address, timing)),
            triad: Box::new(As7265x::new(sensor_address, timing)),
            button: Box::new(QwiicButton::new(button_address)),
        }
    }
}

impl Default for Peripherals {
    fn default() -> Self {
        Self::new(as726x::AS726X_ADDR, qwiic_button::BUTTON_ADDR, PollTiming::default())
    }
}
